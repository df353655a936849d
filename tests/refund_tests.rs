mod common;

use reseller_ledger::error::AppError;
use reseller_ledger::models::{
    RefundRequestStatus, RefundStatus, Role, TransactionCategory, WalletTransaction,
};
use reseller_ledger::repositories::TransactionRepository;
use reseller_ledger::services::{DebitRequest, OnboardedUser, RefundInitiation, RefundService, WalletService};
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    admin: OnboardedUser,
    retailer: OnboardedUser,
    debit: WalletTransaction,
}

/// Retailer with 500 funded and a successful 200 bill payment.
async fn fixture(pool: &PgPool) -> Fixture {
    let superadmin = common::onboard(pool, Role::Superadmin, None).await;
    let admin = common::onboard(pool, Role::Admin, Some(superadmin.user.id)).await;
    let retailer = common::onboard(pool, Role::Retailer, Some(admin.user.id)).await;
    common::prepare_wallet(pool, retailer.wallet.id, dec!(500)).await;

    let debit = WalletService::new(pool.clone())
        .attempt_debit(DebitRequest::new(
            retailer.wallet.id,
            dec!(200),
            TransactionCategory::BillPayment,
            Some(common::PIN),
        ))
        .await
        .unwrap()
        .entry;

    Fixture { admin, retailer, debit }
}

async fn refund_status(pool: &PgPool, transaction_id: Uuid) -> RefundStatus {
    TransactionRepository::new(pool.clone())
        .find_by_id(transaction_id)
        .await
        .unwrap()
        .unwrap()
        .refund_status
}

#[tokio::test]
async fn test_initiation_is_idempotent() {
    let Some(pool) = common::setup_test_db().await else { return };
    let f = fixture(&pool).await;
    let service = RefundService::new(pool.clone());

    let first = service
        .auto_initiate(
            f.debit.id,
            Some(serde_json::json!({ "status": "FAILURE", "code": "U30" })),
            Some("Operator declined".to_string()),
        )
        .await
        .unwrap();
    let request = first.request().cloned().unwrap();
    assert_eq!(request.refund_amount, dec!(200));
    assert_eq!(request.status, RefundRequestStatus::Initiated);
    assert_eq!(refund_status(&pool, f.debit.id).await, RefundStatus::RefundInitiated);

    let second = service.auto_initiate(f.debit.id, None, None).await.unwrap();
    assert!(matches!(second, RefundInitiation::NoOp { .. }));

    let stored = service.find_for_transaction(f.debit.id).await.unwrap().unwrap();
    assert_eq!(stored.id, request.id);
    // Initiation alone moves no money.
    assert_eq!(common::balance_of(&pool, f.retailer.wallet.id).await, dec!(300));
}

#[tokio::test]
async fn test_concurrent_initiation_creates_one_request() {
    let Some(pool) = common::setup_test_db().await else { return };
    let f = fixture(&pool).await;
    let service = Arc::new(RefundService::new(pool.clone()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        let original = f.debit.id;
        handles.push(tokio::spawn(async move { service.auto_initiate(original, None, None).await }));
    }

    let mut initiated = 0;
    for handle in handles {
        if let RefundInitiation::Initiated(_) = handle.await.unwrap().unwrap() {
            initiated += 1;
        }
    }
    assert_eq!(initiated, 1);
}

#[tokio::test]
async fn test_approval_credits_wallet() {
    let Some(pool) = common::setup_test_db().await else { return };
    let f = fixture(&pool).await;
    let service = RefundService::new(pool.clone());

    let initiated = service.auto_initiate(f.debit.id, None, None).await.unwrap();
    let request_id = initiated.request().unwrap().id;

    let denied = service.approve(request_id, f.retailer.user.id).await;
    assert!(matches!(denied, Err(AppError::PermissionDenied(_))));

    let approval = service.approve(request_id, f.admin.user.id).await.unwrap();
    assert_eq!(approval.request.status, RefundRequestStatus::Approved);
    assert_eq!(approval.request.refund_transaction_id, Some(approval.posting.entry.id));
    assert_eq!(approval.posting.entry.category, TransactionCategory::Refund);
    assert_eq!(approval.posting.entry.amount, dec!(200));
    assert_eq!(common::balance_of(&pool, f.retailer.wallet.id).await, dec!(500));
    assert_eq!(refund_status(&pool, f.debit.id).await, RefundStatus::Refunded);

    let again = service.approve(request_id, f.admin.user.id).await;
    assert!(matches!(again, Err(AppError::AlreadyProcessed(_))));
    assert_eq!(common::balance_of(&pool, f.retailer.wallet.id).await, dec!(500));

    let after_refund = service.auto_initiate(f.debit.id, None, None).await.unwrap();
    assert!(matches!(after_refund, RefundInitiation::NoOp { .. }));
}

#[tokio::test]
async fn test_rejection_restores_refundable_status() {
    let Some(pool) = common::setup_test_db().await else { return };
    let f = fixture(&pool).await;
    let service = RefundService::new(pool.clone());

    let initiated = service.auto_initiate(f.debit.id, None, None).await.unwrap();
    let rejected = service
        .reject(initiated.request().unwrap().id, f.admin.user.id)
        .await
        .unwrap();

    assert_eq!(rejected.status, RefundRequestStatus::Rejected);
    assert_eq!(rejected.processed_by, Some(f.admin.user.id));
    assert_eq!(refund_status(&pool, f.debit.id).await, RefundStatus::NotRefunded);
    assert_eq!(common::balance_of(&pool, f.retailer.wallet.id).await, dec!(300));

    // The closed request still blocks a second one for the same entry.
    let retry = service.auto_initiate(f.debit.id, None, None).await.unwrap();
    assert!(matches!(retry, RefundInitiation::NoOp { .. }));
}

#[tokio::test]
async fn test_credits_are_not_refundable() {
    let Some(pool) = common::setup_test_db().await else { return };
    let f = fixture(&pool).await;
    let credit = WalletService::new(pool.clone())
        .attempt_credit(f.retailer.wallet.id, dec!(5), TransactionCategory::Cashback, "cashback", None)
        .await
        .unwrap();

    let outcome = RefundService::new(pool.clone())
        .auto_initiate(credit.entry.id, None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, RefundInitiation::NoOp { .. }));
}
