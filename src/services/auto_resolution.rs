use crate::config::AutoResolutionSettings;
use crate::error::Result;
use crate::models::WalletTransaction;
use crate::observability::get_metrics;
use crate::repositories::TransactionRepository;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// Periodic sweep that fails ledger entries stuck in pending or processing.
///
/// Only the ledger row changes. Balances are left alone; compensating
/// movements come from gateway reconciliation. Re-running is a no-op for
/// rows already resolved because they no longer match the status filter.
pub struct AutoResolutionJob {
    transaction_repo: TransactionRepository,
    timeout: Duration,
    interval_seconds: u64,
}

impl AutoResolutionJob {
    pub fn new(pool: PgPool, settings: &AutoResolutionSettings) -> Self {
        Self {
            transaction_repo: TransactionRepository::new(pool),
            timeout: Duration::minutes(settings.timeout_minutes),
            interval_seconds: settings.interval_seconds,
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.timeout
    }

    /// Runs the sweep once and returns the entries it failed.
    pub async fn run_once(&self) -> Result<Vec<WalletTransaction>> {
        let now = Utc::now();
        let resolved = self.transaction_repo.fail_stale_open(self.cutoff(now), now).await?;

        let metrics = get_metrics();
        metrics.record_auto_resolved(resolved.len() as u64);
        metrics.set_open_transactions(self.transaction_repo.count_open().await?);

        for entry in &resolved {
            tracing::warn!(
                reference = %entry.reference_number,
                wallet_id = %entry.wallet_id,
                created_at = %entry.created_at,
                "Auto-resolved stale transaction as failed"
            );
        }

        Ok(resolved)
    }

    /// Starts the sweep in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(self.interval_seconds));

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(resolved) => {
                        if !resolved.is_empty() {
                            tracing::info!("Auto-resolved {} stale transactions", resolved.len());
                        }
                    }
                    Err(e) => {
                        tracing::error!("Auto-resolution sweep failed: {}", e);
                    }
                }
            }
        })
    }
}
