//! Session manager wrapper for rmcp's streamable HTTP transport.
//!
//! Most behavior is delegated to rmcp's `LocalSessionManager`. Closing a transport session also
//! drops the dispatch credentials and cached bearer token of the auth session bound to it.

use futures::Stream;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::common::server_side_http::ServerSseMessage;
use rmcp::transport::streamable_http_server::session::SessionId;
use rmcp::transport::streamable_http_server::session::SessionManager;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use sfcc_ocapi_tools::session::SessionStore;
use sfcc_ocapi_tools::token::TokenCache;
use std::future::Future;
use std::sync::Arc;

pub struct SfccSessionManager {
    inner: LocalSessionManager,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenCache>,
}

impl SfccSessionManager {
    pub fn new(sessions: Arc<SessionStore>, tokens: Arc<TokenCache>) -> Self {
        Self {
            inner: LocalSessionManager::default(),
            sessions,
            tokens,
        }
    }

    async fn close_session_impl(
        &self,
        id: &SessionId,
    ) -> Result<(), <LocalSessionManager as SessionManager>::Error> {
        let result = self.inner.close_session(id).await;

        if let Some(session_id) = self.sessions.unbind_transport_session(id.as_ref()) {
            self.sessions.clear_session_credentials(&session_id);
            self.tokens.clear(Some(&session_id));
            tracing::info!(
                transport_session = %id,
                session_id = %session_id,
                "mcp session closed; credentials cleared"
            );
        }

        result
    }
}

impl SessionManager for SfccSessionManager {
    type Error = <LocalSessionManager as SessionManager>::Error;
    type Transport = <LocalSessionManager as SessionManager>::Transport;

    fn create_session(
        &self,
    ) -> impl Future<Output = Result<(SessionId, Self::Transport), Self::Error>> + Send {
        self.inner.create_session()
    }

    fn initialize_session(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<ServerJsonRpcMessage, Self::Error>> + Send {
        self.inner.initialize_session(id, message)
    }

    fn has_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        self.inner.has_session(id)
    }

    fn close_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.close_session_impl(id)
    }

    fn create_stream(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_stream(id, message)
    }

    fn accept_message(
        &self,
        id: &SessionId,
        message: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.inner.accept_message(id, message)
    }

    fn create_standalone_stream(
        &self,
        id: &SessionId,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.create_standalone_stream(id)
    }

    fn resume(
        &self,
        id: &SessionId,
        last_event_id: String,
    ) -> impl Future<
        Output = Result<impl Stream<Item = ServerSseMessage> + Send + Sync + 'static, Self::Error>,
    > + Send {
        self.inner.resume(id, last_event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfcc_ocapi_tools::config::Credentials;

    #[tokio::test]
    async fn closing_a_bound_session_clears_its_credentials() {
        let sessions = Arc::new(SessionStore::in_memory());
        let tokens = Arc::new(TokenCache::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/token",
        ));
        let manager = SfccSessionManager::new(Arc::clone(&sessions), Arc::clone(&tokens));

        let (id, _transport) = manager.create_session().await.expect("create");
        sessions.set_session_credentials(
            "auth-1",
            Credentials::new("id", "secret", "https://example.test"),
        );
        sessions.bind_transport_session(id.as_ref(), "auth-1");

        let _ = manager.close_session(&id).await;
        assert!(sessions.get_session_credentials("auth-1").is_none());
        assert!(sessions.transport_session(id.as_ref()).is_none());
        assert!(!manager.has_session(&id).await.unwrap_or(false));
    }
}
