use crate::error::{AppError, Result};
use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for wallet and commission activity.
///
/// Stateless: every call goes to the globally installed recorder, and is a
/// no-op until `init_metrics` has run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_debit(&self, category: &str) {
        counter!("wallet_debits_total", "category" => category.to_string()).increment(1);
    }

    pub fn record_credit(&self, category: &str) {
        counter!("wallet_credits_total", "category" => category.to_string()).increment(1);
    }

    pub fn record_debit_rejected(&self, category: &str, reason: &str) {
        counter!("wallet_debits_rejected_total", "category" => category.to_string(), "reason" => reason.to_string()).increment(1);
    }

    pub fn record_ledger_write_latency(&self, duration_ms: f64) {
        histogram!("wallet_ledger_write_duration_ms").record(duration_ms);
    }

    pub fn record_commission_distributed(&self, service_key: &str, recipients: u64) {
        counter!("commission_distributions_total", "service" => service_key.to_string()).increment(1);
        histogram!("commission_recipient_count").record(recipients as f64);
    }

    pub fn record_commission_skipped(&self, reason: &str) {
        counter!("commission_distributions_skipped_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_commission_failed(&self, reason: &str, retryable: bool) {
        counter!(
            "commission_distributions_failed_total",
            "reason" => reason.to_string(),
            "retryable" => retryable.to_string()
        )
        .increment(1);
    }

    pub fn record_commission_fallback(&self, role: &str) {
        counter!("commission_fallback_payees_total", "role" => role.to_string()).increment(1);
    }

    pub fn record_fund_request(&self, outcome: &str) {
        counter!("fund_requests_processed_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_refund(&self, outcome: &str) {
        counter!("refunds_total", "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_gateway_call(&self, outcome: &str, duration_ms: f64) {
        counter!("gateway_calls_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("gateway_call_duration_ms").record(duration_ms);
    }

    pub fn record_auto_resolved(&self, count: u64) {
        counter!("transactions_auto_resolved_total").increment(count);
    }

    pub fn set_open_transactions(&self, count: i64) {
        gauge!("wallet_open_transactions").set(count as f64);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e)))?;
    describe_metrics();

    METRICS.get_or_init(Metrics::new);
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("wallet_debits_total", Unit::Count, "Committed wallet debits");
    describe_counter!("wallet_credits_total", Unit::Count, "Committed wallet credits");
    describe_counter!("wallet_debits_rejected_total", Unit::Count, "Debits rejected before any mutation");
    describe_histogram!("wallet_ledger_write_duration_ms", Unit::Milliseconds, "Lock, balance update and ledger insert latency");

    describe_counter!("commission_distributions_total", Unit::Count, "Committed commission distributions");
    describe_counter!("commission_distributions_skipped_total", Unit::Count, "Distributions skipped as soft failures");
    describe_counter!("commission_distributions_failed_total", Unit::Count, "Distributions that could not be written after retries");
    describe_counter!("commission_fallback_payees_total", Unit::Count, "Payees resolved outside the originator's hierarchy");
    describe_histogram!("commission_recipient_count", Unit::Count, "Recipients credited per distribution");

    describe_counter!("fund_requests_processed_total", Unit::Count, "Fund requests approved or rejected");
    describe_counter!("refunds_total", Unit::Count, "Refund initiations, approvals and rejections");
    describe_counter!("gateway_calls_total", Unit::Count, "Outbound payment gateway calls");
    describe_histogram!("gateway_call_duration_ms", Unit::Milliseconds, "Payment gateway latency");

    describe_counter!("transactions_auto_resolved_total", Unit::Count, "Stale open entries failed by the sweep");
    describe_gauge!("wallet_open_transactions", Unit::Count, "Ledger entries still pending or processing");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = get_metrics();
        metrics.record_debit("bbps");
        metrics.record_commission_failed("database_error", true);
        metrics.record_commission_skipped("no commission configuration");
    }
}
