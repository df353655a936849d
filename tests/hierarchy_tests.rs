mod common;

use reseller_ledger::error::AppError;
use reseller_ledger::models::Role;
use reseller_ledger::services::{CommissionEngine, HierarchyService, OnboardUserRequest};
use reseller_ledger::config::CommissionSettings;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_onboarding_creates_user_and_wallet() {
    let Some(pool) = common::setup_test_db().await else { return };
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let admin = common::onboard(&pool, Role::Admin, Some(superadmin.user.id)).await;

    assert_eq!(admin.user.created_by, Some(superadmin.user.id));
    assert!(admin.user.is_active);
    assert_eq!(admin.wallet.user_id, admin.user.id);
    assert_eq!(admin.wallet.balance, dec!(0));
    assert!(!admin.wallet.is_pin_set);
}

#[tokio::test]
async fn test_onboarding_permissions() {
    let Some(pool) = common::setup_test_db().await else { return };
    let service = HierarchyService::new(pool.clone());
    let superadmin = common::onboard(&pool, Role::Superadmin, None).await;
    let master = common::onboard(&pool, Role::Master, Some(superadmin.user.id)).await;

    let orphan = service
        .onboard_user(OnboardUserRequest {
            username: common::unique_name("orphan"),
            role: Role::Retailer,
            created_by: None,
        })
        .await;
    assert!(matches!(orphan, Err(AppError::Validation(_))));

    let sideways = service
        .onboard_user(OnboardUserRequest {
            username: common::unique_name("peer"),
            role: Role::Master,
            created_by: Some(master.user.id),
        })
        .await;
    assert!(matches!(sideways, Err(AppError::PermissionDenied(_))));

    let upward = service
        .onboard_user(OnboardUserRequest {
            username: common::unique_name("boss"),
            role: Role::Admin,
            created_by: Some(master.user.id),
        })
        .await;
    assert!(matches!(upward, Err(AppError::PermissionDenied(_))));

    let short_name = service
        .onboard_user(OnboardUserRequest {
            username: "ab".to_string(),
            role: Role::Dealer,
            created_by: Some(master.user.id),
        })
        .await;
    assert!(matches!(short_name, Err(AppError::Validation(_))));

    let dealer = common::onboard(&pool, Role::Dealer, Some(master.user.id)).await;
    let duplicate = service
        .onboard_user(OnboardUserRequest {
            username: dealer.user.username.clone(),
            role: Role::Retailer,
            created_by: Some(master.user.id),
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Validation(_))));

    service.deactivate(master.user.id).await.unwrap();
    let by_inactive = service
        .onboard_user(OnboardUserRequest {
            username: common::unique_name("late"),
            role: Role::Retailer,
            created_by: Some(master.user.id),
        })
        .await;
    assert!(matches!(by_inactive, Err(AppError::PermissionDenied(_))));
}

#[tokio::test]
async fn test_upline_resolution() {
    let Some(pool) = common::setup_test_db().await else { return };
    let h = common::build_hierarchy(&pool).await;
    let service = HierarchyService::new(pool.clone());

    let chain = service.upline(h.retailer.user.id).await.unwrap();
    let ids: Vec<_> = chain.ancestors().iter().map(|u| u.id).collect();
    assert_eq!(
        ids,
        vec![h.dealer.user.id, h.master.user.id, h.admin.user.id, h.superadmin.user.id]
    );

    assert_eq!(
        service.resolve_upline(h.retailer.user.id, Role::Master).await.unwrap(),
        Some(h.master.user.id)
    );
    assert_eq!(service.resolve_upline(h.admin.user.id, Role::Dealer).await.unwrap(), None);
}

#[tokio::test]
async fn test_recipients_skip_inactive_ancestors() {
    let Some(pool) = common::setup_test_db().await else { return };
    let h = common::build_hierarchy(&pool).await;
    HierarchyService::new(pool.clone())
        .deactivate(h.dealer.user.id)
        .await
        .unwrap();

    let settings = CommissionSettings {
        fallback_to_any_active_user: false,
    };
    let engine = CommissionEngine::with_superadmin(pool.clone(), Some(h.superadmin.user.id), &settings);
    let recipients = engine.resolve_recipients(h.retailer.user.id).await.unwrap();

    assert!(recipients.iter().all(|r| r.user_id != h.dealer.user.id));
    assert!(recipients.iter().any(|r| r.user_id == h.master.user.id && r.role == Role::Master));
    assert!(recipients.iter().any(|r| r.user_id == h.superadmin.user.id && r.role == Role::Superadmin));
}

#[tokio::test]
async fn test_downline_lists_all_descendants() {
    let Some(pool) = common::setup_test_db().await else { return };
    let h = common::build_hierarchy(&pool).await;
    let second_retailer = common::onboard(&pool, Role::Retailer, Some(h.dealer.user.id)).await;
    let service = HierarchyService::new(pool.clone());

    let below_master = service.downline(h.master.user.id).await.unwrap();
    let ids: Vec<_> = below_master.iter().map(|u| u.id).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], h.dealer.user.id);
    assert!(ids.contains(&h.retailer.user.id));
    assert!(ids.contains(&second_retailer.user.id));

    assert!(service.downline(h.retailer.user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reassign_parent_rejects_cycles() {
    let Some(pool) = common::setup_test_db().await else { return };
    let h = common::build_hierarchy(&pool).await;
    let service = HierarchyService::new(pool.clone());
    let other_master = common::onboard(&pool, Role::Master, Some(h.admin.user.id)).await;

    let moved = service
        .reassign_parent(h.dealer.user.id, other_master.user.id)
        .await
        .unwrap();
    assert_eq!(moved.created_by, Some(other_master.user.id));
    assert_eq!(
        service.resolve_upline(h.retailer.user.id, Role::Master).await.unwrap(),
        Some(other_master.user.id)
    );

    let under_child = service.reassign_parent(h.dealer.user.id, h.retailer.user.id).await;
    assert!(matches!(under_child, Err(AppError::PermissionDenied(_))));

    // Superadmins may sit under superadmins, which is where a loop could form.
    let second_root = common::onboard(&pool, Role::Superadmin, Some(h.superadmin.user.id)).await;
    let cycle = service
        .reassign_parent(h.superadmin.user.id, second_root.user.id)
        .await;
    assert!(matches!(cycle, Err(AppError::Validation(_))));

    let onto_self = service.reassign_parent(h.admin.user.id, h.admin.user.id).await;
    assert!(onto_self.is_err());
}

#[tokio::test]
async fn test_concurrent_cross_reassignment_cannot_form_cycle() {
    let Some(pool) = common::setup_test_db().await else { return };
    let first = common::onboard(&pool, Role::Superadmin, None).await;
    let second = common::onboard(&pool, Role::Superadmin, None).await;
    let service = Arc::new(HierarchyService::new(pool.clone()));

    let mut handles = Vec::new();
    for (user, parent) in [(first.user.id, second.user.id), (second.user.id, first.user.id)] {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.reassign_parent(user, parent).await }));
    }

    let mut moved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => moved += 1,
            Err(e) => assert!(matches!(e, AppError::Validation(_)), "unexpected {:?}", e),
        }
    }
    assert_eq!(moved, 1);

    // Both chains still terminate at a root.
    assert!(service.upline(first.user.id).await.is_ok());
    assert!(service.upline(second.user.id).await.is_ok());
}
