//! OAuth2 client-credentials token cache.
//!
//! Tokens are keyed per session id, or [`DEFAULT_TOKEN_KEY`] for the process credentials. An
//! entry is served while `now < fetched_at + expires_in - EXPIRY_BUFFER`; after that the next
//! caller fetches a fresh one. Two callers refreshing the same key at once both fetch and the
//! later write wins.

use crate::config::Credentials;
use crate::error::{OcapiToolsError, Result};
use crate::safety::sanitize_reqwest_error;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Cache key used for calls made with the process default credentials.
pub const DEFAULT_TOKEN_KEY: &str = "default";

/// Tokens are treated as expired this long before the server says they are.
pub const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

const DEFAULT_EXPIRES_IN_SECS: u64 = 1800;

#[derive(Debug, Clone)]
struct CachedToken {
    bearer: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Successful client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

#[derive(Debug)]
pub struct TokenCache {
    client: reqwest::Client,
    auth_url: String,
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(client: reqwest::Client, auth_url: impl Into<String>) -> Self {
        Self {
            client,
            auth_url: auth_url.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Bearer token for `key`, fetched with `credentials` if nothing valid is cached.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Authentication`] if the token endpoint can't be reached or
    /// rejects the credentials. Failures leave the cache untouched.
    pub async fn get_token(&self, key: &str, credentials: &Credentials) -> Result<String> {
        if let Some(bearer) = self.cached(key) {
            tracing::debug!(key, "using cached access token");
            return Ok(bearer);
        }

        let issued = self.request_token(credentials).await?;
        let ttl = Duration::from_secs(issued.expires_in).saturating_sub(EXPIRY_BUFFER);
        self.entries.write().insert(
            key.to_string(),
            CachedToken {
                bearer: issued.access_token.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        tracing::debug!(key, expires_in = issued.expires_in, "cached new access token");
        Ok(issued.access_token)
    }

    /// Perform one client-credentials request without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Authentication`] on transport failure, a non-2xx response, or a
    /// response without an `access_token`.
    pub async fn request_token(&self, credentials: &Credentials) -> Result<IssuedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| OcapiToolsError::Authentication {
                status: None,
                message: sanitize_reqwest_error(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                client_id = %credentials.client_id,
                "token request rejected"
            );
            return Err(OcapiToolsError::Authentication {
                status: Some(status.as_u16()),
                message: if text.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown").to_string()
                } else {
                    text
                },
            });
        }

        response
            .json::<IssuedToken>()
            .await
            .map_err(|e| OcapiToolsError::Authentication {
                status: Some(status.as_u16()),
                message: format!("unexpected token response: {}", sanitize_reqwest_error(&e)),
            })
    }

    /// Drop the entry for `key`, or every entry when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.write();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    /// Whether a still-valid token is cached for `key`.
    #[must_use]
    pub fn has_valid_token(&self, key: &str) -> bool {
        self.cached(key).is_some()
    }

    fn cached(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|t| t.is_valid(now))
            .map(|t| t.bearer.clone())
    }
}
