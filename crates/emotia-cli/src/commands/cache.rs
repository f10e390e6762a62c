/// Response cache maintenance command handlers
use anyhow::Result;
use emotia_classifier::ResponseCache;
use emotia_core::Config;

use super::helpers::open_cache_store;

fn open_cache(config: &Config) -> Result<ResponseCache> {
    Ok(ResponseCache::new(open_cache_store(config)?, config.cache.ttl()))
}

pub fn handle_cache_clear(config: &Config) -> Result<()> {
    let removed = open_cache(config)?.clear()?;
    println!("Removed {removed} cached classifications");
    Ok(())
}

pub fn handle_cache_sweep(config: &Config) -> Result<()> {
    let removed = open_cache(config)?.sweep_expired()?;
    println!("Removed {removed} expired classifications");
    Ok(())
}
