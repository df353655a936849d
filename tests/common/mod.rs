#![allow(dead_code)]

use reseller_ledger::models::{ChargeType, Role, ServiceCharge, TransactionCategory};
use reseller_ledger::services::{ChargeCalculator, HierarchyService, OnboardUserRequest, OnboardedUser, WalletService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

pub const PIN: &str = "7392";

/// Connects and migrates, or returns `None` when no database is configured.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

pub async fn onboard(pool: &PgPool, role: Role, created_by: Option<Uuid>) -> OnboardedUser {
    HierarchyService::new(pool.clone())
        .onboard_user(OnboardUserRequest {
            username: unique_name(role.as_str()),
            role,
            created_by,
        })
        .await
        .expect("Failed to onboard user")
}

/// Sets the standard test PIN and credits `balance` as a manual top-up.
pub async fn prepare_wallet(pool: &PgPool, wallet_id: Uuid, balance: Decimal) {
    let service = WalletService::new(pool.clone());
    service.set_pin(wallet_id, PIN).await.expect("Failed to set PIN");
    if balance > Decimal::ZERO {
        service
            .attempt_credit(wallet_id, balance, TransactionCategory::ManualTopup, "Test funding", None)
            .await
            .expect("Failed to fund wallet");
    }
}

/// Money-transfer tiers: a flat 10 up to 1000, then 1% clamped to 15..50.
/// Every test that touches DMT charges uses exactly this table; other
/// categories stay unconfigured so their debits carry no charge.
pub async fn configure_dmt_charges(pool: &PgPool) {
    let calculator = ChargeCalculator::new(pool.clone());
    calculator
        .configure(
            ServiceCharge::new(TransactionCategory::DmtTransfer, ChargeType::Fixed, dec!(10))
                .with_tier(Some(dec!(0)), Some(dec!(1000))),
        )
        .await
        .expect("Failed to configure flat tier");
    calculator
        .configure(
            ServiceCharge::new(TransactionCategory::DmtTransfer, ChargeType::Percentage, dec!(1))
                .with_bounds(Some(dec!(15)), Some(dec!(50)))
                .with_tier(Some(dec!(1000.01)), None),
        )
        .await
        .expect("Failed to configure percentage tier");
}

/// A complete five-level chain with PINs set and empty wallets.
pub struct Hierarchy {
    pub superadmin: OnboardedUser,
    pub admin: OnboardedUser,
    pub master: OnboardedUser,
    pub dealer: OnboardedUser,
    pub retailer: OnboardedUser,
}

pub async fn build_hierarchy(pool: &PgPool) -> Hierarchy {
    let superadmin = onboard(pool, Role::Superadmin, None).await;
    let admin = onboard(pool, Role::Admin, Some(superadmin.user.id)).await;
    let master = onboard(pool, Role::Master, Some(admin.user.id)).await;
    let dealer = onboard(pool, Role::Dealer, Some(master.user.id)).await;
    let retailer = onboard(pool, Role::Retailer, Some(dealer.user.id)).await;

    for member in [&superadmin, &admin, &master, &dealer, &retailer] {
        prepare_wallet(pool, member.wallet.id, Decimal::ZERO).await;
    }

    Hierarchy {
        superadmin,
        admin,
        master,
        dealer,
        retailer,
    }
}

pub async fn balance_of(pool: &PgPool, wallet_id: Uuid) -> Decimal {
    WalletService::new(pool.clone())
        .get_wallet(wallet_id)
        .await
        .expect("Failed to load wallet")
        .balance
}

pub async fn count_entries(pool: &PgPool, wallet_id: Uuid) -> i64 {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM wallet_transactions WHERE wallet_id = $1")
        .bind(wallet_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count entries");
    count.0
}
