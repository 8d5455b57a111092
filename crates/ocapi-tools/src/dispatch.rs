//! Authenticated calls against the OCAPI Data API.

use crate::catalog::{EndpointDescriptor, placeholders};
use crate::config::{Credentials, DATA_API_PREFIX, SfccConfig};
use crate::error::{OcapiToolsError, Result};
use crate::handlers::{Arguments, PreparedCall};
use crate::safety::{redact_url, sanitize_reqwest_error};
use crate::session::SessionStore;
use crate::token::{DEFAULT_TOKEN_KEY, TokenCache};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Argument carrying an explicit JSON body (object or JSON string).
pub const REQUEST_BODY_ARG: &str = "requestBody";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    client: reqwest::Client,
    config: Arc<SfccConfig>,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenCache>,
    timeout: Duration,
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        config: Arc<SfccConfig>,
        sessions: Arc<SessionStore>,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            client,
            config,
            sessions,
            tokens,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Credentials and token cache key for a call on behalf of `session_id`.
    ///
    /// Sessions without installed credentials fall back to the process defaults.
    #[must_use]
    pub fn resolve_credentials(&self, session_id: Option<&str>) -> (Credentials, String) {
        if let Some(id) = session_id
            && let Some(credentials) = self.sessions.get_session_credentials(id)
        {
            return (credentials, id.to_string());
        }
        (
            self.config.credentials.clone(),
            DEFAULT_TOKEN_KEY.to_string(),
        )
    }

    /// Call `endpoint` and return the upstream JSON.
    ///
    /// # Errors
    ///
    /// - [`OcapiToolsError::Authentication`] if no token can be obtained
    /// - [`OcapiToolsError::Validation`] for a missing path parameter or a malformed `requestBody`
    /// - [`OcapiToolsError::Request`] on transport failure
    /// - [`OcapiToolsError::Upstream`] on a non-2xx response
    pub async fn dispatch(
        &self,
        endpoint: &EndpointDescriptor,
        call: PreparedCall,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let (credentials, cache_key) = self.resolve_credentials(session_id);
        let bearer = self.tokens.get_token(&cache_key, &credentials).await?;

        let version = self.config.version_for(&credentials);
        let (mut url, consumed) =
            build_url(&credentials.api_base, version, &endpoint.path, &call.arguments)?;

        let body = if endpoint.method.sends_body() {
            request_body(endpoint, call.body, &call.arguments)?
        } else {
            append_query(&mut url, &call.arguments, &consumed);
            None
        };

        tracing::info!(
            method = ?endpoint.method,
            path = %endpoint.path,
            url = %redact_url(&url),
            session = cache_key.as_str(),
            "calling OCAPI"
        );

        let mut request = self
            .client
            .request(endpoint.method.as_reqwest(), url)
            .bearer_auth(bearer)
            .header("x-dw-client-id", &credentials.client_id)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .timeout(self.timeout);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OcapiToolsError::Request(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OcapiToolsError::Request(sanitize_reqwest_error(&e)))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                path = %endpoint.path,
                "OCAPI request failed"
            );
            return Err(OcapiToolsError::Upstream {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// `{api_base}/s/-/dw/data/{version}/{path}` with placeholders substituted.
///
/// Returns the URL and the names of the arguments consumed as path parameters.
fn build_url(
    api_base: &str,
    version: &str,
    template: &str,
    args: &Arguments,
) -> Result<(Url, HashSet<String>)> {
    let root = format!(
        "{}/{DATA_API_PREFIX}/{version}/",
        api_base.trim_end_matches('/')
    );
    let mut url = Url::parse(&root)
        .map_err(|e| OcapiToolsError::Config(format!("invalid API base '{api_base}': {e}")))?;

    let mut consumed = HashSet::new();
    let mut segments = Vec::new();
    for segment in template.split('/').filter(|s| !s.is_empty()) {
        let mut rendered = segment.to_string();
        for name in placeholders(segment) {
            let value = args
                .get(name)
                .and_then(param_value)
                .ok_or_else(|| {
                    OcapiToolsError::Validation(format!("missing required path parameter '{name}'"))
                })?;
            rendered = rendered.replace(&format!("{{{name}}}"), &value);
            consumed.insert(name.to_string());
        }
        segments.push(rendered);
    }

    url.path_segments_mut()
        .map_err(|()| {
            OcapiToolsError::Config(format!("API base '{api_base}' cannot be a base URL"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok((url, consumed))
}

fn append_query(url: &mut Url, args: &Arguments, consumed: &HashSet<String>) {
    let pairs: Vec<(&String, String)> = args
        .iter()
        .filter(|(k, _)| !consumed.contains(*k) && k.as_str() != REQUEST_BODY_ARG)
        .filter_map(|(k, v)| param_value(v).map(|v| (k, v)))
        .collect();
    if pairs.is_empty() {
        return;
    }
    let mut query = url.query_pairs_mut();
    for (k, v) in pairs {
        query.append_pair(k, &v);
    }
}

/// Body precedence: handler-built body, then `requestBody`, then the endpoint default.
fn request_body(
    endpoint: &EndpointDescriptor,
    built: Option<Value>,
    args: &Arguments,
) -> Result<Option<Value>> {
    if built.is_some() {
        return Ok(built);
    }
    match args.get(REQUEST_BODY_ARG) {
        Some(Value::String(raw)) => serde_json::from_str(raw).map(Some).map_err(|e| {
            OcapiToolsError::Validation(format!("Invalid request body format: {e}"))
        }),
        Some(Value::Null) | None => Ok(endpoint.default_body.clone()),
        Some(other) => Ok(Some(other.clone())),
    }
}

/// Render an argument for a path segment or query parameter.
fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(param_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}
