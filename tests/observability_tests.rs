use reseller_ledger::config::ApplicationSettings;
use reseller_ledger::observability::{
    amount_band, mask_account, mask_reference, mask_wallet_id, LatencyTimer, LogConfig, LogFormat,
    Metrics,
};
use rust_decimal::Decimal;
use uuid::Uuid;

#[test]
fn test_log_config_from_application_settings() {
    let settings = ApplicationSettings {
        log_level: "debug".to_string(),
        log_format: "JSON".to_string(),
        log_source_location: true,
    };
    let config = LogConfig::from(&settings);
    assert_eq!(config.level, "debug");
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.source_location);
    assert!(config.directives().starts_with("debug,"));
}

#[test]
fn test_log_format_falls_back_to_pretty() {
    assert_eq!(LogFormat::from("compact"), LogFormat::Compact);
    assert_eq!(LogFormat::from("verbose"), LogFormat::Pretty);
}

#[test]
fn test_redaction_of_payment_fields() {
    assert_eq!(mask_reference("DMT202610170905031234"), "DMT**************1234");
    assert_eq!(mask_account("50100012345678"), "**********5678");

    let wallet_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
    let masked = mask_wallet_id(&wallet_id);
    assert!(masked.starts_with("550e8400"));
    assert!(!masked.contains("446655440000"));
}

#[test]
fn test_amount_band_is_sign_blind() {
    assert_eq!(amount_band(&Decimal::from(999)), "100-999");
    assert_eq!(amount_band(&Decimal::from(-2_500_000)), "100K+");
}

#[test]
fn test_ledger_metrics() {
    let metrics = Metrics::new();
    metrics.record_debit("bbps");
    metrics.record_credit("commission");
    metrics.record_debit_rejected("dmt_transfer", "insufficient_balance");
    metrics.record_ledger_write_latency(3.5);
    metrics.set_open_transactions(12);
}

#[test]
fn test_workflow_metrics() {
    let metrics = Metrics::new();
    metrics.record_commission_distributed("bbps:electricity", 5);
    metrics.record_commission_skipped("no commission configuration");
    metrics.record_commission_failed("database", true);
    metrics.record_commission_fallback("dealer");
    metrics.record_fund_request("approved");
    metrics.record_refund("initiated");
    metrics.record_gateway_call("success", 120.0);
    metrics.record_auto_resolved(3);
}

#[test]
fn test_latency_timer_is_monotonic() {
    let timer = LatencyTimer::new();
    let first = timer.elapsed_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(timer.elapsed_ms() >= first);
}
