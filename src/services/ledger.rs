//! Balance mutation plus its audit row, written as one unit.
//!
//! Every function here takes a connection that is already inside a
//! transaction and a wallet row that the same transaction has locked. The
//! caller commits.

use crate::error::{AppError, Result};
use crate::models::reference::generate_reference;
use crate::models::{LedgerEntryDraft, TransactionType, Wallet, WalletTransaction};
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{TransactionRepository, WalletRepository};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection};

const REFERENCE_CONSTRAINT: &str = "wallet_transactions_reference_number_key";
const MAX_REFERENCE_ATTEMPTS: u32 = 3;

/// Wallet state after a posting together with the entry documenting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPosting {
    pub wallet: Wallet,
    pub entry: WalletTransaction,
}

impl LedgerPosting {
    pub fn reference_number(&self) -> &str {
        &self.entry.reference_number
    }
}

/// Applies `draft` to a locked wallet and records the ledger entry.
///
/// Opening and closing balances come from the locked row, so they reflect
/// the balance immediately before and after this mutation.
pub async fn post_in(conn: &mut PgConnection, wallet: &Wallet, draft: LedgerEntryDraft) -> Result<LedgerPosting> {
    let timer = LatencyTimer::new();
    let movement = match draft.transaction_type {
        TransactionType::Debit => wallet.plan_debit(draft.amount, draft.service_charge)?,
        TransactionType::Credit => wallet.plan_credit(draft.gross())?,
    };

    let transaction_type = draft.transaction_type;
    let category = draft.category;
    let generated_reference = draft.reference_number.is_none();
    let entry = WalletTransaction::from_draft(wallet.id, draft, movement)?;

    // Entry first: if it cannot be written the balance must not move either.
    let entry = insert_entry(&mut *conn, entry, generated_reference).await?;
    let updated = WalletRepository::set_balance_in(&mut *conn, wallet.id, movement.closing_balance).await?;

    let metrics = get_metrics();
    match transaction_type {
        TransactionType::Debit => metrics.record_debit(category.as_str()),
        TransactionType::Credit => metrics.record_credit(category.as_str()),
    }
    metrics.record_ledger_write_latency(timer.elapsed_ms());

    tracing::debug!(
        wallet_id = %wallet.id,
        reference = %entry.reference_number,
        opening = %entry.opening_balance,
        closing = %entry.closing_balance,
        "Posted {} entry",
        transaction_type.as_str()
    );

    Ok(LedgerPosting { wallet: updated, entry })
}

/// Inserts under a savepoint so a generated reference that collides can be
/// replaced without aborting the caller's transaction. Caller-supplied
/// references are never regenerated.
async fn insert_entry(
    conn: &mut PgConnection,
    mut entry: WalletTransaction,
    generated_reference: bool,
) -> Result<WalletTransaction> {
    let mut attempt = 1;
    loop {
        let mut savepoint = conn.begin().await.map_err(AppError::Database)?;
        match TransactionRepository::insert_in(&mut *savepoint, &entry).await {
            Ok(row) => {
                savepoint.commit().await.map_err(AppError::Database)?;
                return Ok(row);
            }
            Err(e)
                if generated_reference
                    && attempt < MAX_REFERENCE_ATTEMPTS
                    && e.is_unique_violation_on(REFERENCE_CONSTRAINT) =>
            {
                savepoint.rollback().await.map_err(AppError::Database)?;
                tracing::warn!(reference = %entry.reference_number, attempt, "Reference number collision, regenerating");
                entry.reference_number = generate_reference(entry.category.reference_prefix());
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Locks the wallet and posts to it in one step.
pub async fn lock_and_post_in(
    conn: &mut PgConnection,
    wallet_id: uuid::Uuid,
    draft: LedgerEntryDraft,
) -> Result<LedgerPosting> {
    let wallet = WalletRepository::lock_in(&mut *conn, wallet_id).await?;
    post_in(conn, &wallet, draft).await
}
