use crate::error::{AppError, Result};
use crate::models::{RefundStatus, TransactionStatus, WalletTransaction};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "id, wallet_id, amount, service_charge, net_amount, transaction_type, category, status, reference_number, opening_balance, closing_balance, refund_status, description, initiated_by, external_reference, metadata, created_at, updated_at";

/// Repository for wallet ledger entries. Rows are inserted once; afterwards
/// only status, refund status, external reference and metadata of an open
/// entry may change.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_in(conn: &mut PgConnection, entry: &WalletTransaction) -> Result<WalletTransaction> {
        let row = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            INSERT INTO wallet_transactions ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        ))
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.amount)
        .bind(entry.service_charge)
        .bind(entry.net_amount)
        .bind(entry.transaction_type)
        .bind(entry.category)
        .bind(entry.status)
        .bind(&entry.reference_number)
        .bind(entry.opening_balance)
        .bind(entry.closing_balance)
        .bind(entry.refund_status)
        .bind(&entry.description)
        .bind(entry.initiated_by)
        .bind(&entry.external_reference)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {} FROM wallet_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_reference(&self, reference_number: &str) -> Result<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {} FROM wallet_transactions WHERE reference_number = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Ledger history of a wallet, newest first.
    pub async fn find_by_wallet(&self, wallet_id: Uuid, limit: i64, offset: i64) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            SELECT {} FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn lock_in(conn: &mut PgConnection, id: Uuid) -> Result<WalletTransaction> {
        let row = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {} FROM wallet_transactions WHERE id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", id)))
    }

    /// Moves an open entry to `status`, merging `metadata` into the stored
    /// object. Returns `None` when the entry is already terminal.
    pub async fn update_status_in(
        conn: &mut PgConnection,
        id: Uuid,
        status: TransactionStatus,
        external_reference: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            UPDATE wallet_transactions
            SET status = $2,
                external_reference = COALESCE($3, external_reference),
                metadata = COALESCE(metadata, '{{}}'::jsonb) || COALESCE($4, '{{}}'::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(external_reference)
        .bind(metadata)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn set_refund_status_in(
        conn: &mut PgConnection,
        id: Uuid,
        refund_status: RefundStatus,
    ) -> Result<WalletTransaction> {
        let row = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            UPDATE wallet_transactions SET refund_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(refund_status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", id)))
    }

    /// Fails every open entry created before `cutoff` that has no refund in
    /// flight. Rows locked by a concurrent writer are left for the next run.
    pub async fn fail_stale_open(&self, cutoff: DateTime<Utc>, resolved_at: DateTime<Utc>) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            UPDATE wallet_transactions
            SET status = 'FAILED',
                metadata = COALESCE(metadata, '{{}}'::jsonb) || jsonb_build_object(
                    'auto_resolved', true,
                    'auto_resolved_at', $2::text,
                    'previous_status', status::text
                ),
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM wallet_transactions
                WHERE status IN ('PENDING', 'PROCESSING')
                  AND refund_status = 'NOT_REFUNDED'
                  AND created_at < $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(cutoff)
        .bind(resolved_at.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn count_open(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM wallet_transactions WHERE status IN ('PENDING', 'PROCESSING')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count.0)
    }
}
