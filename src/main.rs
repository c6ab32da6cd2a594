use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use queue_dashboard::config;
use queue_dashboard::proxy::{self, ProxyState};
use queue_dashboard::upstream::UpstreamClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Credential-injecting proxy for the queue dashboard")]
struct Args {
    /// Path to YAML config file (defaults to ./dashboard.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides config and DASHBOARD_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        cfg.server.bind = bind;
    }
    let addr = cfg.bind_addr()?;
    let base_url = cfg.base_url()?;

    if cfg.upstream.service_token.is_none() {
        warn!(
            "{} is not set; every proxied request will fail with 500",
            config::ENV_SERVICE_TOKEN
        );
    }

    let upstream = UpstreamClient::new(base_url)?;
    info!(upstream = %upstream.base_url(), "upstream configured");
    let state = ProxyState::new(cfg.upstream.service_token.clone(), Arc::new(upstream));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "starting dashboard proxy");
    proxy::serve(listener, state).await?;
    Ok(())
}
