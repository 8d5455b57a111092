//! SFCC MCP server: composition root for the OCAPI tool engine.
//!
//! - [`config`]: CLI flags and environment
//! - [`server`]: the rmcp `ServerHandler`
//! - [`http`], [`oauth`] and [`session_manager`]: remote mode (streamable HTTP, bearer auth and
//!   the authorization-code handshake)
//! - [`background`]: periodic session snapshots

pub mod background;
pub mod config;
pub mod http;
pub mod oauth;
pub mod server;
pub mod session_manager;

use server::SfccMcpServer;
use sfcc_ocapi_tools::authorization::AuthorizationFlow;
use sfcc_ocapi_tools::catalog::EndpointCatalog;
use sfcc_ocapi_tools::config::SfccConfig;
use sfcc_ocapi_tools::dispatch::RequestDispatcher;
use sfcc_ocapi_tools::handlers::HandlerRegistry;
use sfcc_ocapi_tools::session::SessionStore;
use sfcc_ocapi_tools::token::TokenCache;
use sfcc_ocapi_tools::tools::OcapiToolSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared services, constructed once at startup.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<SfccConfig>,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenCache>,
    pub flow: Arc<AuthorizationFlow>,
    pub tools: OcapiToolSource,
}

impl Services {
    #[must_use]
    pub fn build(config: SfccConfig, catalog: &EndpointCatalog, sessions: SessionStore) -> Self {
        let client = reqwest::Client::new();
        let config = Arc::new(config);
        let sessions = Arc::new(sessions);
        let tokens = Arc::new(TokenCache::new(client.clone(), config.auth_url.clone()));
        let flow = Arc::new(AuthorizationFlow::new(
            Arc::clone(&sessions),
            Arc::clone(&tokens),
        ));
        let dispatcher = RequestDispatcher::new(
            client,
            Arc::clone(&config),
            Arc::clone(&sessions),
            Arc::clone(&tokens),
        );
        let tools = OcapiToolSource::build(catalog, &HandlerRegistry::default(), dispatcher);

        Self {
            config,
            sessions,
            tokens,
            flow,
            tools,
        }
    }

    #[must_use]
    pub fn mcp_server(&self) -> SfccMcpServer {
        SfccMcpServer::new(self.tools.clone())
    }

    /// Remote-mode router. Streamable HTTP sessions end when `shutdown` is cancelled.
    #[must_use]
    pub fn router(&self, shutdown: &CancellationToken) -> axum::Router {
        http::router(
            self.mcp_server(),
            Arc::clone(&self.flow),
            Arc::clone(&self.tokens),
            shutdown,
        )
    }
}
