mod aggregator;
mod api;
mod config;
mod db;
mod error;
mod groups;
mod identity;
mod ingest;
mod models;
mod protocol;
mod session;
mod similarity;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::session::Session;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Wallet dedup starting...");

    // Load configuration
    let cfg = config::load()?;
    info!("  Cohort marker: {}", cfg.cohort_marker);
    info!("  DB Path: {}", cfg.db_path);
    info!("  Port: {}", cfg.port);

    let conn = db::connect(&cfg.db_path)?;
    db::run_migrations(&conn)?;

    let mut session = Session::new(cfg.cohort_marker.clone());
    if let Some(path) = &cfg.records_path {
        let records = ingest::load_records(path)?;
        let cohort = session.load_records(records)?;
        if cohort == 0 {
            warn!("No cohort transactions found in {}", path);
        }
    }

    let state = api::AppState::new(session, conn);
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        async move { api::serve(cfg, state).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Wallet dedup stopped.");
    Ok(())
}
