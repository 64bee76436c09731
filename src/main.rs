use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::{info, warn};

use flowtv_proxy::{AppConfig, EdgeApplicationServer, EdgeServices, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards are kept alive to flush logs and keep sentry connected
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!("logger and env prepped...");

    if config.trusted_domains.iter().all(|d| d.trim().is_empty()) {
        warn!("no trusted domains configured, every proxy request will be refused");
    }

    let services = EdgeServices::new(config.clone())
        .await
        .context("failed to build services")?;

    info!("services ok, starting edge server...");

    EdgeApplicationServer::serve(config, services)
        .await
        .context("edge server failed to start")?;

    Ok(())
}
