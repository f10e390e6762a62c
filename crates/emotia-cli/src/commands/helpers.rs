//! Helper utility functions for CLI commands

use anyhow::Result;
use emotia_classifier::{CacheStore, ClassificationGateway};
use emotia_core::Config;
use emotia_storage::Database;
use std::sync::Arc;

/// Open the SQLite cache configured for this user
pub fn open_cache_store(config: &Config) -> Result<Arc<dyn CacheStore>> {
    Ok(Arc::new(Database::new(Some(config.cache_db_path()?))?))
}

pub fn build_gateway(config: &Config) -> Result<ClassificationGateway> {
    ClassificationGateway::from_config(config, open_cache_store(config)?)
}

/// Show only the first few characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    if secret.chars().count() > 6 {
        format!("{visible}***")
    } else {
        "***".to_string()
    }
}

/// Render a score as a percentage with one decimal
pub fn format_score(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}
