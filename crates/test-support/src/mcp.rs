use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::json;
use std::time::Duration;
use tokio::io::AsyncBufReadExt as _;
use tokio_util::io::StreamReader;

/// Minimal MCP client for the server's streamable HTTP endpoint (`/mcp`), authenticated with an
/// optional bearer token.
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
    session_id: String,
}

impl McpStreamableHttpSession {
    /// Run `initialize` + `notifications/initialized`.
    ///
    /// # Errors
    ///
    /// Returns an error if either request fails or the server omits `Mcp-Session-Id`.
    pub async fn connect(base_url: &str, bearer: Option<&str>) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let init_resp = post_mcp(
            &client,
            &base_url,
            bearer,
            None,
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "sfcc-mcp-server-integration-tests", "version": "0" }
                }
            }),
        )
        .await?
        .error_for_status()
        .context("POST /mcp initialize status")?;

        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_first_event_stream_json_message(init_resp).await?;
        anyhow::ensure!(init_msg.get("id") == Some(&json!(0)), "unexpected init id");

        let initialized_resp = post_mcp(
            &client,
            &base_url,
            bearer,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;

        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "POST /mcp notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(Self {
            client,
            base_url,
            bearer: bearer.map(str::to_string),
            session_id,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send one JSON-RPC request and return the first message of the response stream.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-2xx status, a timeout, or an unparseable stream.
    pub async fn request(
        &self,
        id: u64,
        method: &str,
        params: serde_json::Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = post_mcp(
            &self.client,
            &self.base_url,
            self.bearer.as_deref(),
            Some(&self.session_id),
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }),
        )
        .await?
        .error_for_status()
        .context("POST /mcp status")?;

        let msg = tokio::time::timeout(timeout_dur, read_first_event_stream_json_message(resp))
            .await
            .context("timeout waiting for event-stream response")??;

        Ok(msg)
    }

    /// `DELETE /mcp` for this session; returns the HTTP status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request can't be sent.
    pub async fn close(self) -> anyhow::Result<u16> {
        let mut req = self
            .client
            .delete(format!("{}/mcp", self.base_url))
            .header("Mcp-Session-Id", &self.session_id);
        if let Some(bearer) = &self.bearer {
            req = req.bearer_auth(bearer);
        }
        let resp = req.send().await.context("DELETE /mcp")?;
        Ok(resp.status().as_u16())
    }
}

/// POST a JSON-RPC message to `/mcp` without checking the status.
///
/// # Errors
///
/// Returns an error if the request can't be sent.
pub async fn post_mcp(
    client: &reqwest::Client,
    base_url: &str,
    bearer: Option<&str>,
    session_id: Option<&str>,
    body: serde_json::Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(format!("{}/mcp", base_url.trim_end_matches('/')))
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(bearer) = bearer {
        req = req.bearer_auth(bearer);
    }
    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }

    req.send().await.context("POST /mcp")
}

/// Read the first `data:` JSON message from an event-stream response.
///
/// # Errors
///
/// Returns an error if the stream ends first or the data isn't JSON.
pub async fn read_first_event_stream_json_message(
    resp: reqwest::Response,
) -> anyhow::Result<serde_json::Value> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader = StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    let mut data_lines: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();

        if line.is_empty() {
            if data_lines.is_empty() {
                continue;
            }
            let data = data_lines.join("\n");
            data_lines.clear();
            // Priming events carry an id but no payload.
            if data.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&data).context("parse event-stream data as JSON");
        }

        if let Some(v) = line.strip_prefix("data:") {
            data_lines.push(v.trim().to_string());
        }
    }

    anyhow::bail!("event-stream ended without a JSON message")
}
