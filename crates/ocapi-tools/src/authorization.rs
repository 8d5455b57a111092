//! Authorization-code handshake for remote callers.
//!
//! A caller submits OCAPI API-client credentials, which are checked with one client-credentials
//! request. Valid credentials become a *user session* and a short-lived auth code; the code is
//! exchanged for an opaque access token of the form `sfcc_{session}_{random}_{millis}`. Bearer
//! tokens on later requests resolve back to the session's credentials.
//!
//! `code_verifier` is accepted and not checked. Access tokens carry the session id in plaintext
//! and their `expires_in` is advisory: a token stays usable while its session exists.

use crate::config::Credentials;
use crate::error::{OcapiToolsError, Result};
use crate::session::{SessionStore, UserCredentials};
use crate::token::TokenCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const ACCESS_TOKEN_PREFIX: &str = "sfcc";
pub const AUTH_CODE_PREFIX: &str = "auth";
pub const ACCESS_TOKEN_EXPIRES_IN: u64 = 3600;
pub const ACCESS_TOKEN_SCOPE: &str = "sfcc:read sfcc:write";
pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

const RANDOM_SEGMENT_LEN: usize = 13;

/// Credentials posted by the authorization form.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubmission {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub api_base: String,
    #[serde(default, alias = "ocapiVersion")]
    pub api_version: Option<String>,
}

impl fmt::Debug for CredentialSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSubmission")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl CredentialSubmission {
    fn into_credentials(self) -> Credentials {
        Credentials::new(
            self.client_id.trim(),
            self.client_secret.trim(),
            self.api_base.trim().trim_end_matches('/'),
        )
        .with_api_version(self.api_version)
    }
}

/// Body of a token endpoint request (`application/json` or form encoded).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenExchangeRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
}

#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenCache>,
}

impl AuthorizationFlow {
    #[must_use]
    pub fn new(sessions: Arc<SessionStore>, tokens: Arc<TokenCache>) -> Self {
        Self { sessions, tokens }
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Check `submission` against the token endpoint and mint a session plus auth code.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Validation`] if a field is blank or the credentials are
    /// rejected. No session state is created on failure.
    pub async fn validate_credentials(&self, submission: CredentialSubmission) -> Result<String> {
        let credentials = submission.into_credentials();
        if !credentials.is_complete() {
            return Err(OcapiToolsError::Validation(
                "All fields are required".to_string(),
            ));
        }

        if let Err(e) = self.tokens.request_token(&credentials).await {
            tracing::warn!(
                client_id = %credentials.client_id,
                error = %e,
                "credential validation failed"
            );
            let message = match e {
                OcapiToolsError::Authentication {
                    status: Some(_), ..
                } => "Invalid SFCC credentials. Please check your Client ID and Secret.",
                _ => "Error connecting to SFCC. Please check your API Base URL.",
            };
            return Err(OcapiToolsError::Validation(message.to_string()));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let code = format!(
            "{AUTH_CODE_PREFIX}_{}_{}",
            random_segment(),
            chrono::Utc::now().timestamp_millis()
        );

        self.sessions.insert_user_credentials(UserCredentials {
            credentials,
            session_id: session_id.clone(),
        });
        self.sessions.insert_auth_code(&code, &session_id);
        self.schedule_code_expiry(code.clone());

        tracing::info!(session_id = %session_id, "credentials validated; auth code issued");
        Ok(code)
    }

    fn schedule_code_expiry(&self, code: String) {
        let sessions = Arc::clone(&self.sessions);
        let ttl = sessions.auth_code_ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if sessions.remove_auth_code(&code) {
                tracing::debug!("unredeemed auth code expired");
            }
        });
    }

    /// Redeem an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// - [`OcapiToolsError::UnsupportedGrantType`] for any grant other than `authorization_code`
    /// - [`OcapiToolsError::InvalidGrant`] for a missing, unknown, expired or used code, or a code
    ///   whose session has no credentials
    pub fn exchange_code(&self, request: &TokenExchangeRequest) -> Result<AccessTokenGrant> {
        if request.grant_type != AUTHORIZATION_CODE_GRANT {
            return Err(OcapiToolsError::UnsupportedGrantType);
        }
        let code = request
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(OcapiToolsError::InvalidGrant)?;

        let session_id = self
            .sessions
            .take_auth_code(code)
            .ok_or(OcapiToolsError::InvalidGrant)?;
        if self.sessions.user_credentials(&session_id).is_none() {
            return Err(OcapiToolsError::InvalidGrant);
        }

        tracing::info!(session_id = %session_id, "auth code exchanged for access token");
        Ok(AccessTokenGrant {
            access_token: format!(
                "{ACCESS_TOKEN_PREFIX}_{session_id}_{}_{}",
                random_segment(),
                chrono::Utc::now().timestamp_millis()
            ),
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_EXPIRES_IN,
            scope: ACCESS_TOKEN_SCOPE.to_string(),
        })
    }

    /// Resolve a bearer token to the credentials of its session.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Authorization`] if the token is malformed or its session is
    /// unknown.
    pub fn resolve_access_token(&self, token: &str) -> Result<UserCredentials> {
        let session_id = session_id_from_token(token)
            .ok_or_else(|| OcapiToolsError::Authorization("Invalid token format".to_string()))?;
        self.sessions.user_credentials(session_id).ok_or_else(|| {
            OcapiToolsError::Authorization("Invalid or expired token".to_string())
        })
    }
}

/// Session id embedded in an access token, if the token is well-formed.
#[must_use]
pub fn session_id_from_token(token: &str) -> Option<&str> {
    let mut parts = token.split('_');
    if parts.next() != Some(ACCESS_TOKEN_PREFIX) {
        return None;
    }
    let session_id = parts.next().filter(|s| !s.is_empty())?;
    // random + timestamp
    (parts.count() >= 2).then_some(session_id)
}

fn random_segment() -> String {
    let mut s = uuid::Uuid::new_v4().simple().to_string();
    s.truncate(RANDOM_SEGMENT_LEN);
    s
}
