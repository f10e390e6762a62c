/// Configuration management command handlers
use anyhow::Result;
use emotia_core::{Config, CredentialProvider};
use std::path::Path;

use super::helpers::mask_secret;

pub fn handle_config_show(config: &Config) -> Result<()> {
    println!("[classifier]");
    println!("  endpoint = {}", config.classifier.endpoint);
    println!("  model = {}", config.classifier.model);
    match config.credential() {
        Some(key) => println!("  api_key = {}", mask_secret(&key)),
        None => println!("  api_key is not set"),
    }
    println!("  max_retries = {}", config.classifier.max_retries);
    println!("  base_backoff_ms = {}", config.classifier.base_backoff_ms);
    match config.classifier.max_throttle_retries {
        Some(cap) => println!("  max_throttle_retries = {cap}"),
        None => println!("  max_throttle_retries = unbounded"),
    }

    println!("\n[rate_limit]");
    println!("  max_requests = {}", config.rate_limit.max_requests);
    println!("  window_ms = {}", config.rate_limit.window_ms);

    println!("\n[cache]");
    println!("  ttl_secs = {}", config.cache.ttl_secs);
    println!("  sweep_interval_secs = {}", config.cache.sweep_interval_secs);
    println!("  path = {}", config.cache_db_path()?.display());

    println!("\n[session]");
    println!("  server_url = {}", config.session.server_url);
    println!("  reconnect_base_ms = {}", config.session.reconnect_base_ms);
    println!("  reconnect_cap_ms = {}", config.session.reconnect_cap_ms);
    println!("  keepalive_ms = {}", config.session.keepalive_ms);
    println!("  typing_timeout_ms = {}", config.session.typing_timeout_ms);
    Ok(())
}

pub fn handle_config_set_key(path: &Path, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        anyhow::bail!("API key must not be empty");
    }
    let mut config = Config::load(path)?;
    config.classifier.api_key = Some(key.trim().to_string());
    config.save(path)?;
    println!("Saved API key to {}", path.display());
    Ok(())
}
