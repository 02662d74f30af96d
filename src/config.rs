use dotenvy::dotenv;
use eyre::Result;
use serde::Deserialize;
use std::env;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cohort_marker: String,
    pub db_path: String,
    pub port: u16,
    pub records_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cohort_marker: "cohort".to_string(),
            db_path: "wallet_dedup.db".to_string(),
            port: 8080,
            records_path: None,
        }
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // .env is optional

    let defaults = Config::default();

    // Account-tag substring selecting in-scope rows (case-insensitive)
    let cohort_marker = env::var("COHORT_MARKER")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(defaults.cohort_marker);

    let db_path = env::var("DATABASE_URL").unwrap_or(defaults.db_path);

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults.port);

    // Ledger export to preload at startup (JSON rows)
    let records_path = env::var("RECORDS_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let cfg = Config {
        cohort_marker,
        db_path,
        port,
        records_path,
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
