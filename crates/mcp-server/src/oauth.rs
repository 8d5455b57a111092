//! OAuth 2.1 authorization-code handshake routes.
//!
//! The "authorization server" here only collects SFCC API client credentials: `/authorize`
//! serves a form, `/validate-credentials` checks them against the token endpoint and mints an
//! auth code, and `/token` redeems the code for a session-scoped bearer token.

use crate::http::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sfcc_ocapi_tools::authorization::{
    ACCESS_TOKEN_SCOPE, CredentialSubmission, TokenExchangeRequest,
};
use sfcc_ocapi_tools::error::OcapiToolsError;

const AUTHORIZE_PAGE: &str = include_str!("authorize.html");

pub const SERVICE_NAME: &str = "sfcc-services";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_metadata),
        )
        .route("/authorize", get(authorize_page))
        .route("/callback", get(callback))
        .route("/token", post(token))
        .route("/register", post(register))
        .route("/validate-credentials", post(validate_credentials))
        .route("/health", get(health))
}

/// Public base URL of this server as seen by the client, honoring reverse-proxy headers.
#[must_use]
pub fn base_url(headers: &HeaderMap) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let proto = header_value("x-forwarded-proto").unwrap_or("http");
    let host = header_value("x-forwarded-host")
        .or_else(|| header_value(header::HOST.as_str()))
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

async fn protected_resource_metadata(headers: HeaderMap) -> Json<Value> {
    let base = base_url(&headers);
    Json(json!({
        "authorization_servers": [{
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
        }]
    }))
}

async fn authorization_server_metadata(headers: HeaderMap) -> Json<Value> {
    let base = base_url(&headers);
    let scopes: Vec<&str> = ACCESS_TOKEN_SCOPE.split(' ').collect();
    Json(json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "registration_endpoint": format!("{base}/register"),
        "token_endpoint_auth_methods_supported": ["none"],
        "scopes_supported": scopes,
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": ["authorization_code"],
        "code_challenge_methods_supported": ["S256"],
    }))
}

async fn authorize_page() -> Html<&'static str> {
    Html(AUTHORIZE_PAGE)
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    redirect_uri: Option<String>,
}

async fn callback(Query(params): Query<CallbackParams>) -> Response {
    let Some(redirect_uri) = params.redirect_uri.as_deref() else {
        return Json(json!({ "code": params.code, "state": params.state })).into_response();
    };

    let mut target = match url::Url::parse(redirect_uri) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "callback with malformed redirect_uri");
            return oauth_error(StatusCode::BAD_REQUEST, "invalid_request");
        }
    };

    let kept: Vec<(String, String)> = target
        .query_pairs()
        .filter(|(k, _)| {
            !((k == "code" && params.code.is_some()) || (k == "state" && params.state.is_some()))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut query = target.query_pairs_mut();
        query.clear();
        query.extend_pairs(kept);
        if let Some(code) = &params.code {
            query.append_pair("code", code);
        }
        if let Some(state) = &params.state {
            query.append_pair("state", state);
        }
    }
    if target.query() == Some("") {
        target.set_query(None);
    }

    (StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response()
}

async fn token(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(request) = parse_body::<TokenExchangeRequest>(&headers, &body) else {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_request");
    };

    match state.flow.exchange_code(&request) {
        Ok(grant) => Json(grant).into_response(),
        Err(e) => {
            let code = e.oauth_error_code().unwrap_or("invalid_grant");
            tracing::info!(error = code, "token request rejected");
            oauth_error(StatusCode::BAD_REQUEST, code)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegistrationRequest {
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

async fn register(headers: HeaderMap, body: Bytes) -> Response {
    let request = parse_body::<RegistrationRequest>(&headers, &body).unwrap_or_default();
    let client_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        client_id = %client_id,
        client_name = request.client_name.as_deref().unwrap_or("-"),
        "client registered"
    );
    (
        StatusCode::CREATED,
        Json(json!({
            "client_id": client_id,
            "token_endpoint_auth_method": "none",
            "redirect_uris": request.redirect_uris,
        })),
    )
        .into_response()
}

async fn validate_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let submission = parse_body::<CredentialSubmission>(&headers, &body).unwrap_or_default();
    match state.flow.validate_credentials(submission).await {
        Ok(code) => Json(json!({ "success": true, "authCode": code })),
        Err(e) => {
            let message = match e {
                OcapiToolsError::Validation(message) => message,
                other => other.to_string(),
            };
            Json(json!({ "success": false, "error": message }))
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

fn oauth_error(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

/// Decode a JSON or `application/x-www-form-urlencoded` body.
fn parse_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Option<T> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let fields: serde_json::Map<String, Value> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        return serde_json::from_value(Value::Object(fields)).ok();
    }
    if body.is_empty() {
        return serde_json::from_value(json!({})).ok();
    }
    serde_json::from_slice(body).ok()
}
