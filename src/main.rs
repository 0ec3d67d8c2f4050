//! Reader Proxy - HTTP server that shows any page in reader mode.
//!
//! `GET /<percent-encoded URL>` fetches the page, makes its links absolute,
//! adds proxy re-entry links and serves the extracted main content.

use std::path::PathBuf;

use axum::http::Request;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::Level;

use reader_proxy::{router, setup_logging, Config, ProxyService};

/// Reader Proxy - reader-mode view of any web page.
#[derive(Parser, Debug)]
#[command(name = "reader-proxy")]
#[command(about = "Reader-mode proxy with link rewriting", long_about = None)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// Bind address, overriding READER_PROXY_BIND_ADDR.
    #[arg(long)]
    bind: Option<String>,

    /// Log directory, overriding READER_PROXY_LOG_DIR.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    let mut config = Config::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(log_dir) = args.log_dir {
        config.log_dir = Some(log_dir);
    }

    setup_logging(config.log_config())?;

    let service = ProxyService::new_with_config(config.service_config()?)?;

    let app = router(service).layer(TraceLayer::new_for_http().make_span_with(
        |request: &Request<_>| {
            tracing::span!(
                Level::INFO,
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        },
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        metadata_api = %config.metadata_api,
        allow_private_hosts = config.allow_private_hosts,
        "starting reader proxy"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
