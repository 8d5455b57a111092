//! In-process stand-in for the SFCC account manager and the OCAPI Data API.
//!
//! - `POST /dwsso/oauth2/access_token` accepts [`MOCK_CLIENT_ID`] / [`MOCK_CLIENT_SECRET`] and
//!   answers `401` for anything else.
//! - `/s/-/dw/data/{version}/...` echoes the request as JSON. Paths starting with `missing`
//!   answer `404` with an OCAPI fault; `plain` answers a `text/plain` body.

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const MOCK_CLIENT_ID: &str = "mock-client";
pub const MOCK_CLIENT_SECRET: &str = "mock-secret";
pub const MOCK_TOKEN_PATH: &str = "/dwsso/oauth2/access_token";

const MOCK_TOKEN_PREFIX: &str = "mock-token-";

#[derive(Clone)]
struct MockState {
    token_requests: Arc<AtomicUsize>,
    data_requests: Arc<AtomicUsize>,
    expires_in: u64,
}

pub struct MockUpstream {
    pub base_url: String,
    state: MockState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    /// Start with tokens valid for 30 minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_token_ttl(1800).await
    }

    /// Start with a custom `expires_in` for issued tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start_with_token_ttl(expires_in: u64) -> anyhow::Result<Self> {
        let state = MockState {
            token_requests: Arc::new(AtomicUsize::new(0)),
            data_requests: Arc::new(AtomicUsize::new(0)),
            expires_in,
        };
        let app = Router::new()
            .route(MOCK_TOKEN_PATH, post(token_handler))
            .route("/s/-/dw/data/{version}/{*rest}", any(data_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock upstream")?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown: Some(shutdown_tx),
        })
    }

    #[must_use]
    pub fn auth_url(&self) -> String {
        format!("{}{MOCK_TOKEN_PATH}", self.base_url)
    }

    /// Number of token endpoint hits so far.
    #[must_use]
    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    /// Number of Data API hits so far.
    #[must_use]
    pub fn data_requests(&self) -> usize {
        self.state.data_requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn token_handler(
    State(state): State<MockState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;

    if form.get("grant_type").map(String::as_str) != Some("client_credentials") {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response();
    }
    let id_ok = form.get("client_id").map(String::as_str) == Some(MOCK_CLIENT_ID);
    let secret_ok = form.get("client_secret").map(String::as_str) == Some(MOCK_CLIENT_SECRET);
    if !(id_ok && secret_ok) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed"
            })),
        )
            .into_response();
    }

    axum::Json(json!({
        "access_token": format!("{MOCK_TOKEN_PREFIX}{n}"),
        "token_type": "BearerToken",
        "expires_in": state.expires_in,
        "scope": "mail tenantFilter profile"
    }))
    .into_response()
}

async fn data_handler(
    State(state): State<MockState>,
    method: Method,
    Path((version, rest)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.data_requests.fetch_add(1, Ordering::SeqCst);

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let authorization = header("authorization").unwrap_or_default();
    if !authorization.starts_with(&format!("Bearer {MOCK_TOKEN_PREFIX}")) {
        return fault(
            StatusCode::UNAUTHORIZED,
            "InvalidAccessTokenException",
            "The request is unauthorized, the access token is invalid.",
        );
    }

    if rest.starts_with("missing") {
        return fault(
            StatusCode::NOT_FOUND,
            "NotFoundException",
            "No resource matches the path.",
        );
    }
    if rest == "plain" {
        return (StatusCode::OK, "pong").into_response();
    }

    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };

    axum::Json(json!({
        "method": method.as_str(),
        "version": version,
        "path": rest,
        "raw_path": uri.path(),
        "query": uri.query().unwrap_or(""),
        "authorization": authorization,
        "client_id": header("x-dw-client-id"),
        "user_agent": header("user-agent"),
        "body": body,
    }))
    .into_response()
}

fn fault(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        axum::Json(json!({
            "_v": "24.5",
            "fault": { "type": kind, "message": message }
        })),
    )
        .into_response()
}
