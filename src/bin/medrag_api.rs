use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use medrag::{build_provider, router, AppState, Pipeline, PipelineArgs, DEFAULT_LOG_FILTER};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "medrag-api",
    about = "HTTP API answering medical questions with retrieved literature and clinical calculations"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "MEDRAG_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = ApiCli::parse();
    let settings = cli.pipeline.build_settings();
    let rules = cli.pipeline.load_rules()?;
    let source = Arc::new(cli.pipeline.build_literature_client()?);
    let provider = build_provider(&cli.pipeline.build_provider_settings());
    let pipeline = Arc::new(Pipeline::new(settings, source, provider, &rules));
    if !pipeline.has_model() {
        warn!("no language model API key configured; queries will be rejected with 500");
    }
    let app = router(AppState::new(pipeline));

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, "medrag-api listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}
