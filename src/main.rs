use reseller_ledger::config::Settings;
use reseller_ledger::observability::{init_logging, init_metrics, LogConfig};
use reseller_ledger::services::{AutoResolutionJob, CommissionEngine};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application))?;
    init_metrics()?;
    info!("Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    let engine = CommissionEngine::initialize(pool.clone(), &settings.commission).await?;
    if !settings.commission.fallback_to_any_active_user {
        info!("Commission fallback payees disabled");
    }
    info!(superadmin = ?engine.superadmin(), "Commission engine ready");

    let sweep = AutoResolutionJob::new(pool.clone(), &settings.auto_resolution).start();
    info!(
        timeout_minutes = settings.auto_resolution.timeout_minutes,
        interval_seconds = settings.auto_resolution.interval_seconds,
        "Auto-resolution sweep started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    sweep.abort();
    pool.close().await;

    Ok(())
}
