//! Command-line and environment configuration for the server binary.

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use sfcc_ocapi_tools::config::{Credentials, DEFAULT_API_VERSION, DEFAULT_AUTH_URL, SfccConfig};
use sfcc_ocapi_tools::persistence::DEFAULT_SESSION_DIR;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Serve MCP over stdin/stdout with the default credentials.
    #[default]
    Stdio,
    /// Serve MCP over streamable HTTP with the authorization-code handshake.
    Remote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "sfcc-mcp-server",
    version,
    about = "Expose SFCC OCAPI Data API endpoints as MCP tools"
)]
pub struct Cli {
    /// API client id used when a call carries no session credentials.
    #[arg(long, env = "SFCC_ADMIN_CLIENT_ID", default_value = "")]
    pub client_id: String,

    #[arg(
        long,
        env = "SFCC_ADMIN_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub client_secret: String,

    /// Instance base URL, e.g. `https://my-instance.dx.commercecloud.salesforce.com`.
    #[arg(long, env = "SFCC_API_BASE", default_value = "")]
    pub api_base: String,

    #[arg(long, env = "OCAPI_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Client-credentials token endpoint.
    #[arg(long, env = "SFCC_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// Endpoint catalog (JSON, or YAML for `.yaml`/`.yml`). Built-in endpoints when unset.
    #[arg(long, env = "SFCC_ENDPOINTS_FILE")]
    pub endpoints_file: Option<PathBuf>,

    /// Directory holding the persisted session snapshot.
    #[arg(long, env = "SESSION_STORAGE_DIR", default_value = DEFAULT_SESSION_DIR)]
    pub session_dir: PathBuf,

    #[arg(long, env = "MCP_MODE", value_enum, default_value_t = Mode::Stdio)]
    pub mode: Mode,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Default SFCC configuration, checked for completeness.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are incomplete or a URL is malformed.
    pub fn sfcc_config(&self) -> anyhow::Result<SfccConfig> {
        let config = SfccConfig::new(Credentials::new(
            self.client_id.trim(),
            self.client_secret.trim(),
            self.api_base.trim(),
        ))
        .with_auth_url(self.auth_url.trim())
        .with_api_version(self.api_version.trim());
        config.validate()?;
        Ok(config)
    }

    /// Listen address for remote mode. `HOST` may be an IP literal or a host name.
    ///
    /// # Errors
    ///
    /// Returns an error if `HOST` does not resolve to any address.
    pub async fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let host = self.host.trim();
        tokio::net::lookup_host((host, self.port))
            .await
            .with_context(|| format!("invalid listen host '{host}'"))?
            .next()
            .with_context(|| format!("listen host '{host}' resolved to no addresses"))
    }
}
