use anyhow::Context as _;
use clap::Parser as _;
use rmcp::ServiceExt as _;
use sfcc_mcp_server::Services;
use sfcc_mcp_server::background::{PERSIST_INTERVAL, spawn_persistence_timer};
use sfcc_mcp_server::config::{Cli, LogFormat, Mode};
use sfcc_ocapi_tools::catalog::EndpointCatalog;
use sfcc_ocapi_tools::persistence::SessionPersistence;
use sfcc_ocapi_tools::session::SessionStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli.sfcc_config().context("invalid configuration")?;
    let catalog =
        EndpointCatalog::load(cli.endpoints_file.as_deref()).context("load endpoint catalog")?;

    let sessions = SessionStore::new(Some(SessionPersistence::new(&cli.session_dir)));
    sessions.restore();

    let services = Services::build(config, &catalog, sessions);
    tracing::info!(
        tools = services.tools.len(),
        mode = ?cli.mode,
        api_version = %services.config.api_version,
        "sfcc mcp server starting"
    );

    let shutdown = CancellationToken::new();
    let timer = spawn_persistence_timer(
        std::sync::Arc::clone(&services.sessions),
        PERSIST_INTERVAL,
        shutdown.clone(),
    );

    let result = match cli.mode {
        Mode::Stdio => run_stdio(&services).await,
        Mode::Remote => run_remote(&cli, &services, &shutdown).await,
    };

    shutdown.cancel();
    if let Err(e) = timer.await {
        tracing::warn!(error = %e, "persistence task failed");
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run_stdio(services: &Services) -> anyhow::Result<()> {
    let service = services
        .mcp_server()
        .serve(rmcp::transport::stdio())
        .await
        .context("start stdio MCP server")?;

    tokio::select! {
        res = service.waiting() => {
            let reason = res.context("stdio MCP server")?;
            tracing::info!(?reason, "stdio session ended");
        }
        () = shutdown_signal() => {}
    }
    Ok(())
}

async fn run_remote(
    cli: &Cli,
    services: &Services,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let addr = cli.bind_addr().await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    let local = listener.local_addr().context("read local address")?;

    tracing::warn!(
        "PKCE code_verifier is not checked and access tokens embed the session id in plain \
         text; deploy behind TLS and a trusted proxy"
    );
    tracing::info!(%local, "listening; MCP endpoint at /mcp, OAuth metadata under /.well-known/");

    let router = services.router(shutdown);
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    sfcc_mcp_server::http::serve(listener, router, shutdown.clone())
        .await
        .context("http server")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
