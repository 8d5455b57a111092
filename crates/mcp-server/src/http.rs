//! Remote mode: the handshake routes plus the bearer-guarded streamable HTTP `/mcp` endpoint.

use crate::oauth::{self, base_url};
use crate::server::{AuthenticatedSession, SfccMcpServer};
use crate::session_manager::SfccSessionManager;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde_json::{Value, json};
use sfcc_ocapi_tools::authorization::AuthorizationFlow;
use sfcc_ocapi_tools::error::OcapiToolsError;
use sfcc_ocapi_tools::session::SessionStore;
use sfcc_ocapi_tools::token::TokenCache;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Upper bound for reading a rejected request body to recover its JSON-RPC `id`.
const MAX_REJECTED_BODY_BYTES: usize = 1024 * 1024;

const JSONRPC_MISSING_TOKEN: i64 = -32000;
const JSONRPC_INVALID_TOKEN: i64 = -32001;

#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthorizationFlow>,
}

impl AppState {
    fn sessions(&self) -> &Arc<SessionStore> {
        self.flow.sessions()
    }
}

/// Build the remote-mode router: handshake routes, `/mcp` and CORS.
pub fn router(
    mcp: SfccMcpServer,
    flow: Arc<AuthorizationFlow>,
    tokens: Arc<TokenCache>,
    shutdown: &CancellationToken,
) -> Router {
    let state = AppState { flow };
    let session_manager = Arc::new(SfccSessionManager::new(
        Arc::clone(state.sessions()),
        tokens,
    ));

    let service: StreamableHttpService<SfccMcpServer, SfccSessionManager> =
        StreamableHttpService::new(
            move || Ok(mcp.clone()),
            session_manager,
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: None,
                cancellation_token: shutdown.child_token(),
                ..Default::default()
            },
        );

    let mcp_routes = Router::new()
        .nest_service("/mcp", service)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(oauth::routes().with_state(state))
        .merge(mcp_routes)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(MCP_SESSION_ID_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(MCP_SESSION_ID_HEADER),
            header::WWW_AUTHENTICATE,
        ])
}

/// Resolve the bearer token to an auth session before rmcp sees the request.
///
/// On success the session's credentials become its dispatch credentials, the session is attached
/// as an [`AuthenticatedSession`] extension, and the MCP transport session (from the request or
/// the `initialize` response) is bound to it.
async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .unwrap_or_default()
        .to_string();

    if token.is_empty() {
        let base = base_url(request.headers());
        let rpc_id = rpc_id(request).await;
        let challenge = format!(
            "Bearer realm=\"SFCC MCP Server\", resource_metadata_uri=\"{base}/.well-known/oauth-protected-resource\""
        );
        let mut response = jsonrpc_error(
            StatusCode::UNAUTHORIZED,
            JSONRPC_MISSING_TOKEN,
            "Missing Bearer token",
            rpc_id,
        );
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        return response;
    }

    let user = match state.flow.resolve_access_token(&token) {
        Ok(user) => user,
        Err(e) => {
            let message = match e {
                OcapiToolsError::Authorization(message) => message,
                other => other.to_string(),
            };
            tracing::info!(error = %message, "mcp request rejected");
            let rpc_id = rpc_id(request).await;
            return jsonrpc_error(
                StatusCode::FORBIDDEN,
                JSONRPC_INVALID_TOKEN,
                &message,
                rpc_id,
            );
        }
    };

    let session_id = user.session_id.clone();
    state
        .sessions()
        .set_session_credentials(&session_id, user.credentials);

    let transport_session = transport_session_id(request.headers());
    if let Some(transport) = &transport_session {
        state.sessions().bind_transport_session(transport, &session_id);
    }
    request
        .extensions_mut()
        .insert(AuthenticatedSession(session_id.clone()));

    let response = next.run(request).await;

    if transport_session.is_none()
        && let Some(transport) = transport_session_id(response.headers())
    {
        tracing::debug!(
            transport_session = %transport,
            session_id = %session_id,
            "mcp session bound"
        );
        state.sessions().bind_transport_session(&transport, &session_id);
    }
    response
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    if let Some(scheme) = value.get(..6)
        && scheme.eq_ignore_ascii_case("bearer")
    {
        let rest = &value[6..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return rest.trim();
        }
    }
    value
}

fn transport_session_id(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// JSON-RPC `id` of a rejected request, or `null`.
async fn rpc_id(request: Request) -> Value {
    let Ok(bytes) = axum::body::to_bytes(request.into_body(), MAX_REJECTED_BODY_BYTES).await else {
        return Value::Null;
    };
    serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|body| body.get("id").cloned())
        .unwrap_or(Value::Null)
}

fn jsonrpc_error(status: StatusCode, code: i64, message: &str, id: Value) -> Response {
    let body = json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": id,
    });
    (status, axum::Json(body)).into_response()
}

/// Serve `router` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
}
