use anyhow::Context as _;
use serde_json::{Value, json};
use sfcc_ocapi_tools::persistence::SessionPersistence;
use sfcc_test_support::{
    KillOnDrop, MOCK_CLIENT_ID, MOCK_CLIENT_SECRET, McpStreamableHttpSession, MockUpstream,
    pick_unused_port, wait_http_ok,
};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const BIN: &str = env!("CARGO_BIN_EXE_sfcc-mcp-server");

/// Snapshot writes happen off the request path; wait for the redeemed session to hit disk.
async fn wait_for_snapshot(dir: &Path, timeout: Duration) -> anyhow::Result<()> {
    let persistence = SessionPersistence::new(dir);
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(Some(data)) = persistence.load()
            && !data.user_credentials.is_empty()
            && data.auth_codes.is_empty()
        {
            return Ok(());
        }
        anyhow::ensure!(Instant::now() < deadline, "session snapshot never written");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn spawn_remote(
    upstream: &MockUpstream,
    session_dir: &Path,
    port: u16,
) -> anyhow::Result<KillOnDrop> {
    let child = Command::new(BIN)
        .env("SFCC_ADMIN_CLIENT_ID", MOCK_CLIENT_ID)
        .env("SFCC_ADMIN_CLIENT_SECRET", MOCK_CLIENT_SECRET)
        .env("SFCC_API_BASE", &upstream.base_url)
        .env("SFCC_AUTH_URL", upstream.auth_url())
        .env("SESSION_STORAGE_DIR", session_dir)
        .env("MCP_MODE", "remote")
        .env("HOST", "127.0.0.1")
        .env("PORT", port.to_string())
        .env("RUST_LOG", "warn")
        .env_remove("SFCC_ENDPOINTS_FILE")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn sfcc-mcp-server")?;
    Ok(KillOnDrop(child))
}

#[test]
fn missing_credentials_fail_fast() -> anyhow::Result<()> {
    let output = Command::new(BIN)
        .env_remove("SFCC_ADMIN_CLIENT_ID")
        .env_remove("SFCC_ADMIN_CLIENT_SECRET")
        .env_remove("SFCC_API_BASE")
        .env("MCP_MODE", "stdio")
        .stdin(Stdio::null())
        .output()
        .context("run sfcc-mcp-server")?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SFCC_ADMIN_CLIENT_ID"), "{stderr}");
    Ok(())
}

#[tokio::test]
async fn sessions_survive_a_restart() -> anyhow::Result<()> {
    let upstream = MockUpstream::start().await?;
    let dir = tempfile::tempdir().context("create temp dir")?;
    let port = pick_unused_port()?;
    let base_url = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();

    let server = spawn_remote(&upstream, dir.path(), port)?;
    wait_http_ok(&format!("{base_url}/health"), Duration::from_secs(20)).await?;

    let validated: Value = client
        .post(format!("{base_url}/validate-credentials"))
        .json(&json!({
            "clientId": MOCK_CLIENT_ID,
            "clientSecret": MOCK_CLIENT_SECRET,
            "apiBase": upstream.base_url,
        }))
        .send()
        .await?
        .json()
        .await?;
    let code = validated["authCode"].as_str().context("authCode")?;
    let grant: Value = client
        .post(format!("{base_url}/token"))
        .json(&json!({ "grant_type": "authorization_code", "code": code }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let token = grant["access_token"].as_str().context("access_token")?.to_string();
    wait_for_snapshot(dir.path(), Duration::from_secs(10)).await?;

    drop(server);
    let port = pick_unused_port()?;
    let base_url = format!("http://127.0.0.1:{port}");
    let _server = spawn_remote(&upstream, dir.path(), port)?;
    wait_http_ok(&format!("{base_url}/health"), Duration::from_secs(20)).await?;

    let session = McpStreamableHttpSession::connect(&base_url, Some(&token)).await?;
    let listed = session
        .request(1, "tools/list", json!({}), Duration::from_secs(10))
        .await?;
    let tools = listed["result"]["tools"].as_array().context("tools")?;
    assert!(!tools.is_empty());
    Ok(())
}
