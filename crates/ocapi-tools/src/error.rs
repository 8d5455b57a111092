//! Error types for `sfcc-ocapi-tools`.

use thiserror::Error;

/// Main error type for the OCAPI tool engine.
#[derive(Error, Debug)]
pub enum OcapiToolsError {
    /// Configuration errors (missing credentials, unreadable endpoint catalog).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed tool arguments.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The upstream authorization server rejected a client-credentials request.
    #[error("Authentication error: {}", authentication_message(.status, .message))]
    Authentication { status: Option<u16>, message: String },

    /// Unknown or malformed session token.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Authorization code is unknown, expired or already redeemed.
    #[error("Authorization error: invalid_grant")]
    InvalidGrant,

    #[error("Authorization error: unsupported_grant_type")]
    UnsupportedGrantType,

    /// Non-2xx response from the commerce API itself.
    #[error("SFCC API request failed: {}", upstream_message(.status, .reason, .body))]
    Upstream {
        status: u16,
        reason: String,
        body: String,
    },

    /// Session storage read/write failures.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Transport-level HTTP failures (connect, timeout, body read).
    #[error("Request error: {0}")]
    Request(String),

    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OcapiToolsError {
    /// OAuth 2.0 `error` code for token endpoint responses, if this error maps to one.
    #[must_use]
    pub fn oauth_error_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidGrant => Some("invalid_grant"),
            Self::UnsupportedGrantType => Some("unsupported_grant_type"),
            Self::Validation(_) => Some("invalid_request"),
            _ => None,
        }
    }

    /// Upstream HTTP status, when the failure came from an HTTP response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Authentication { status, .. } => *status,
            _ => None,
        }
    }
}

fn authentication_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("failed to obtain access token ({code}): {message}"),
        None => format!("failed to obtain access token: {message}"),
    }
}

fn upstream_message(status: &u16, reason: &str, body: &str) -> String {
    let hint = match *status {
        401 => " (credential problem: check the API client id and secret)",
        403 => " (permission problem: the API client lacks the resource or scope in OCAPI settings)",
        404 => " (missing resource: check the path parameters)",
        _ => "",
    };
    if body.is_empty() {
        format!("{status} {reason}{hint}")
    } else {
        format!("{status} {reason}{hint}: {body}")
    }
}

/// Result type alias for OCAPI tooling operations.
pub type Result<T> = std::result::Result<T, OcapiToolsError>;
