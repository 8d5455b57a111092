use crate::error::{OcapiToolsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account Manager token endpoint used for OCAPI client-credentials grants.
pub const DEFAULT_AUTH_URL: &str = "https://account.demandware.com/dwsso/oauth2/access_token";

/// OCAPI Data API version used when neither the session nor the process config names one.
pub const DEFAULT_API_VERSION: &str = "v24_5";

/// Path prefix of the OCAPI Data API under the instance host.
pub const DATA_API_PREFIX: &str = "s/-/dw/data";

pub const DEFAULT_USER_AGENT: &str = "sfcc-mcp-server/1.0";

/// One set of OCAPI API-client credentials plus the instance they target.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    /// Per-session OCAPI version override (`v24_5`, ...).
    #[serde(
        default,
        rename = "ocapiVersion",
        alias = "apiVersion",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_version: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: api_base.into(),
            api_version: None,
        }
    }

    #[must_use]
    pub fn with_api_version(mut self, version: Option<String>) -> Self {
        self.api_version = version.filter(|v| !v.trim().is_empty());
        self
    }

    /// True when every required field is non-blank.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
            && !self.api_base.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Process-wide configuration for talking to SFCC.
#[derive(Debug, Clone)]
pub struct SfccConfig {
    /// Default credentials, used whenever a call carries no known session.
    pub credentials: Credentials,
    /// Client-credentials token endpoint.
    pub auth_url: String,
    /// OCAPI version used when the credentials don't override it.
    pub api_version: String,
    pub user_agent: String,
}

impl SfccConfig {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[must_use]
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Check that the default credentials and endpoints are usable.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Config`] if the client id, secret or API base is missing, or if
    /// the API base / auth URL is not an absolute `http(s)` URL.
    pub fn validate(&self) -> Result<()> {
        if !self.credentials.is_complete() {
            return Err(OcapiToolsError::Config(
                "missing required SFCC configuration: SFCC_ADMIN_CLIENT_ID, \
                 SFCC_ADMIN_CLIENT_SECRET and SFCC_API_BASE must be set"
                    .to_string(),
            ));
        }
        require_http_url("SFCC_API_BASE", &self.credentials.api_base)?;
        require_http_url("SFCC_AUTH_URL", &self.auth_url)?;
        if self.api_version.trim().is_empty() {
            return Err(OcapiToolsError::Config(
                "OCAPI version must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// OCAPI version for a call made with `credentials`.
    #[must_use]
    pub fn version_for<'a>(&'a self, credentials: &'a Credentials) -> &'a str {
        credentials
            .api_version
            .as_deref()
            .unwrap_or(self.api_version.as_str())
    }
}

fn require_http_url(name: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value)
        .map_err(|e| OcapiToolsError::Config(format!("{name} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(OcapiToolsError::Config(format!(
            "{name} must use http or https, got '{other}'"
        ))),
    }
}
