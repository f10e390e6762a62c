use anyhow::Result;
use emotia_classifier::{serve, spawn_cache_sweeper};
use emotia_core::Config;
use std::sync::Arc;
use tokio::io::BufReader;

use super::helpers::build_gateway;

/// Answer JSON-line requests from stdin until it closes
pub async fn worker_command(config: &Config) -> Result<()> {
    let gateway = Arc::new(build_gateway(config)?);
    let sweeper = spawn_cache_sweeper(Arc::clone(gateway.cache()), config.cache.sweep_interval());
    log::info!("Classification worker ready");

    let result = serve(
        gateway,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    sweeper.abort();
    log::info!("Classification worker stopped");
    result
}
