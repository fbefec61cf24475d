//! xiaohongshu-mcp - MCP server for Xiaohongshu browser automation
//!
//! Serves the MCP streamable HTTP endpoint on `/mcp`, the REST mirror on
//! `/api/v1` and a liveness check on `/health`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use xiaohongshu_mcp::browser::ChromeSessionFactory;
use xiaohongshu_mcp::config::{BrowserConfig, CallPolicy, Config, DEFAULT_LISTEN};
use xiaohongshu_mcp::server::{SERVER_NAME, SERVER_VERSION};
use xiaohongshu_mcp::xiaohongshu::XiaohongshuSite;
use xiaohongshu_mcp::{ActionOrchestrator, AppState, McpServer, ToolRegistry};

/// MCP server for Xiaohongshu browser automation.
#[derive(Parser, Debug)]
#[command(name = "xiaohongshu-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run the browser without a window.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    headless: bool,

    /// Browser binary; Chrome/Chromium is looked up on PATH when omitted.
    #[arg(long = "bin", env = "XHS_BROWSER_BIN")]
    bin: Option<PathBuf>,

    /// Cookie file written by the login flow.
    #[arg(long, env = "XHS_COOKIES_PATH", default_value = "cookies.json")]
    cookies: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Upper bound for one tool call, in seconds.
    #[arg(long, default_value_t = 120)]
    call_timeout_secs: u64,

    /// How long to wait for the browser to come up, in seconds.
    #[arg(long, default_value_t = 20)]
    launch_timeout_secs: u64,

    /// Drain window for in-flight calls on shutdown, in seconds.
    #[arg(long, default_value_t = 10)]
    shutdown_timeout_secs: u64,

    /// Run at most one tool call at a time.
    #[arg(long)]
    serialize_calls: bool,

    /// JSON-RPC method answered as an event stream when the client accepts one.
    #[arg(long = "stream-method")]
    stream_methods: Vec<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            listen: self.listen,
            browser: BrowserConfig {
                headless: self.headless,
                binary: self.bin,
                cookies_path: Some(self.cookies),
                launch_timeout: Duration::from_secs(self.launch_timeout_secs),
            },
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            call_policy: if self.serialize_calls {
                CallPolicy::Serialized
            } else {
                CallPolicy::Concurrent
            },
            streamable_methods: self.stream_methods,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!("Starting {} v{}", SERVER_NAME, SERVER_VERSION);

    match run(args.into_config()).await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    tracing::info!(
        listen = %config.listen,
        headless = config.browser.headless,
        policy = ?config.call_policy,
        streamable = ?config.streamable_methods,
        "configuration loaded"
    );

    let orchestrator = ActionOrchestrator::new(
        Arc::new(ToolRegistry::new()),
        Arc::new(ChromeSessionFactory::new(config.browser.clone())),
        Arc::new(XiaohongshuSite::new(config.account.clone())),
        &config,
    );
    let state = Arc::new(AppState::new(
        McpServer::new(Arc::new(orchestrator)),
        config.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!("MCP endpoint at http://{}/mcp", config.listen);

    xiaohongshu_mcp::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
