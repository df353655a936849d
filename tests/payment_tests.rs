mod common;

use async_trait::async_trait;
use mockall::mock;
use reseller_ledger::config::CommissionSettings;
use reseller_ledger::error::{AppError, Result};
use reseller_ledger::models::{
    CommissionSplit, CommissionType, RefundStatus, Role, ServiceCommission, TransactionCategory,
    TransactionStatus, TransactionType,
};
use reseller_ledger::services::{
    CommissionEngine, CommissionService, DistributionOutcome, GatewayRequest, GatewayResponse, GatewayStatus,
    PaymentGateway, PaymentOutcome, PaymentRequest, PaymentService, WalletService,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn execute(&self, request: &GatewayRequest) -> Result<GatewayResponse>;
    }
}

/// Answers successfully, but only after `delay`.
struct SlowGateway {
    delay: Duration,
}

#[async_trait]
impl PaymentGateway for SlowGateway {
    async fn execute(&self, _request: &GatewayRequest) -> Result<GatewayResponse> {
        tokio::time::sleep(self.delay).await;
        Ok(GatewayResponse {
            status: GatewayStatus::Success,
            external_reference_id: Some("LATE".to_string()),
            message: "late success".to_string(),
        })
    }
}

fn responding(status: GatewayStatus, message: &'static str) -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_execute().times(1).returning(move |request| {
        Ok(GatewayResponse {
            status,
            external_reference_id: Some(format!("EXT-{}", request.client_reference)),
            message: message.to_string(),
        })
    });
    gateway
}

fn payment_service(pool: &PgPool, gateway: impl PaymentGateway + 'static, superadmin: Option<Uuid>) -> PaymentService {
    let engine = CommissionEngine::with_superadmin(pool.clone(), superadmin, &CommissionSettings::default());
    PaymentService::new(pool.clone(), Arc::new(gateway), Arc::new(engine))
}

fn payment(wallet_id: Uuid, user_id: Uuid, amount: Decimal, category: TransactionCategory, service_key: &str) -> PaymentRequest {
    PaymentRequest {
        wallet_id,
        user_id,
        amount,
        category,
        service_key: service_key.to_string(),
        pin: Some(common::PIN.to_string()),
        recipient: serde_json::json!({ "account": "000111222333", "ifsc": "TEST0000001" }),
    }
}

#[tokio::test]
async fn test_failed_transfer_restores_balance_exactly() {
    let Some(pool) = common::setup_test_db().await else { return };
    common::configure_dmt_charges(&pool).await;
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(1000)).await;

    let service = payment_service(&pool, responding(GatewayStatus::Failed, "beneficiary bank down"), None);
    let result = service
        .process_payment(payment(retailer.wallet.id, retailer.user.id, dec!(500), TransactionCategory::DmtTransfer, "dmt:imps"))
        .await;

    assert!(matches!(result, Err(AppError::Gateway(ref message)) if message == "beneficiary bank down"));
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(1000));

    let history = WalletService::new(pool.clone())
        .history(retailer.wallet.id, 10, 0)
        .await
        .unwrap();
    let debit = history
        .iter()
        .find(|e| e.category == TransactionCategory::DmtTransfer)
        .unwrap();
    assert_eq!(debit.service_charge, dec!(10));
    assert_eq!(debit.status, TransactionStatus::Failed);
    assert_eq!(debit.refund_status, RefundStatus::Refunded);
    assert!(debit.external_reference.as_deref().unwrap().starts_with("EXT-"));

    let refund = history
        .iter()
        .find(|e| e.category == TransactionCategory::Refund)
        .unwrap();
    assert_eq!(refund.transaction_type, TransactionType::Credit);
    assert_eq!(refund.amount, dec!(510));
    assert_eq!(refund.closing_balance, dec!(1000));
    assert_eq!(
        refund.metadata.as_ref().unwrap()["original_transaction_id"],
        serde_json::json!(debit.id)
    );
}

#[tokio::test]
async fn test_successful_payment_settles_and_distributes() {
    let Some(pool) = common::setup_test_db().await else { return };
    let h = common::build_hierarchy(&pool).await;
    common::prepare_wallet(&pool, h.retailer.wallet.id, dec!(1000)).await;

    let commissions = CommissionService::new(pool.clone());
    let plan = commissions.create_plan(&common::unique_name("platinum"), None).await.unwrap();
    commissions.assign_plan(h.retailer.user.id, plan.id, Some(h.superadmin.user.id)).await.unwrap();
    let service_key = common::unique_name("bbps:electricity");
    commissions
        .upsert_service_commission(
            Role::Superadmin,
            ServiceCommission::new(
                &service_key,
                plan.id,
                CommissionType::Fixed,
                dec!(10),
                CommissionSplit {
                    admin: dec!(10),
                    master: dec!(10),
                    dealer: dec!(20),
                    retailer: dec!(40),
                },
            ),
        )
        .await
        .unwrap();

    let service = payment_service(
        &pool,
        responding(GatewayStatus::Success, "bill paid"),
        Some(h.superadmin.user.id),
    );
    let outcome = service
        .process_payment(payment(h.retailer.wallet.id, h.retailer.user.id, dec!(400), TransactionCategory::Bbps, &service_key))
        .await
        .unwrap();

    let PaymentOutcome::Completed { entry, commission } = outcome else {
        panic!("expected completed payment");
    };
    assert_eq!(entry.status, TransactionStatus::Success);
    assert_eq!(entry.external_reference, Some(format!("EXT-{}", entry.reference_number)));
    assert_eq!(entry.metadata.as_ref().unwrap()["gateway_message"], "bill paid");
    assert!(commission.is_distributed());
    assert_eq!(commission.records().len(), 5);

    // 600 left after the payment, plus the retailer's 40% of a flat 10.
    assert_eq!(common::balance_of(&pool, h.retailer.wallet.id).await, dec!(604));
    assert_eq!(common::balance_of(&pool, h.superadmin.wallet.id).await, dec!(2));
}

#[tokio::test]
async fn test_success_without_plan_keeps_payment() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(100)).await;

    let service = payment_service(&pool, responding(GatewayStatus::Success, "ok"), Some(superadmin.user.id));
    let outcome = service
        .process_payment(payment(retailer.wallet.id, retailer.user.id, dec!(60), TransactionCategory::ServicePayment, "operator:jio"))
        .await
        .unwrap();

    match outcome {
        PaymentOutcome::Completed { entry, commission } => {
            assert_eq!(entry.status, TransactionStatus::Success);
            assert!(!commission.is_distributed());
        }
        other => panic!("expected completed payment, got {:?}", other),
    }
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(40));
}

#[tokio::test]
async fn test_pending_payment_stays_open() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(300)).await;

    let service = payment_service(&pool, responding(GatewayStatus::Pending, "queued at bank"), None);
    let outcome = service
        .process_payment(payment(retailer.wallet.id, retailer.user.id, dec!(100), TransactionCategory::MoneyTransfer, "payout:neft"))
        .await
        .unwrap();

    let PaymentOutcome::Pending { entry } = outcome else {
        panic!("expected pending payment");
    };
    assert_eq!(entry.status, TransactionStatus::Processing);
    assert_eq!(entry.refund_status, RefundStatus::NotRefunded);
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(200));
}

#[tokio::test]
async fn test_gateway_error_is_reversed() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(250)).await;

    let mut gateway = MockGateway::new();
    gateway
        .expect_execute()
        .times(1)
        .returning(|_| Err(AppError::Gateway("connection reset".to_string())));

    let service = payment_service(&pool, gateway, None);
    let result = service
        .process_payment(payment(retailer.wallet.id, retailer.user.id, dec!(250), TransactionCategory::Bbps, "bbps:gas"))
        .await;

    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(250));
}

#[tokio::test]
async fn test_gateway_timeout_is_reversed() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(80)).await;

    let service = payment_service(
        &pool,
        SlowGateway {
            delay: Duration::from_secs(2),
        },
        None,
    )
    .with_timeout(Duration::from_millis(50));
    let result = service
        .process_payment(payment(retailer.wallet.id, retailer.user.id, dec!(80), TransactionCategory::Bbps, "bbps:water"))
        .await;

    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(80));
}

#[tokio::test]
async fn test_rejected_debit_never_reaches_gateway() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(10)).await;

    let mut gateway = MockGateway::new();
    gateway.expect_execute().times(0);

    let service = payment_service(&pool, gateway, None);
    let result = service
        .process_payment(payment(retailer.wallet.id, retailer.user.id, dec!(11), TransactionCategory::Bbps, "bbps:dth"))
        .await;

    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(10));
}

#[tokio::test]
async fn test_commission_failure_is_reported_with_settled_payment() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let retailer = common::onboard(&pool, Role::Retailer, Some(superadmin.user.id)).await;
    common::prepare_wallet(&pool, retailer.wallet.id, dec!(200)).await;

    // Attributed to a user who does not own the debited wallet, so the
    // distribution is refused.
    let service = payment_service(&pool, responding(GatewayStatus::Success, "ok"), Some(superadmin.user.id));
    let outcome = service
        .process_payment(payment(retailer.wallet.id, superadmin.user.id, dec!(80), TransactionCategory::Bbps, "bbps:gas"))
        .await
        .unwrap();

    let PaymentOutcome::Completed { entry, commission } = outcome else {
        panic!("expected completed payment");
    };
    assert_eq!(entry.status, TransactionStatus::Success);
    assert!(matches!(commission, DistributionOutcome::Failed { retryable: false, .. }), "got {:?}", commission);
    assert!(commission.records().is_empty());
    assert_eq!(common::balance_of(&pool, retailer.wallet.id).await, dec!(120));
}
