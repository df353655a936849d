use crate::error::{AppError, Result};
use crate::models::{RefundRequest, RefundRequestStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const REFUND_COLUMNS: &str = "id, original_transaction_id, wallet_id, refund_amount, reference_number, status, reason, external_response, processed_by, processed_at, refund_transaction_id, created_at";

pub struct RefundRepository {
    pool: PgPool,
}

impl RefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_in(conn: &mut PgConnection, request: &RefundRequest) -> Result<RefundRequest> {
        let row = sqlx::query_as::<_, RefundRequest>(&format!(
            r#"
            INSERT INTO refund_requests ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {cols}
            "#,
            cols = REFUND_COLUMNS
        ))
        .bind(request.id)
        .bind(request.original_transaction_id)
        .bind(request.wallet_id)
        .bind(request.refund_amount)
        .bind(&request.reference_number)
        .bind(request.status)
        .bind(&request.reason)
        .bind(&request.external_response)
        .bind(request.processed_by)
        .bind(request.processed_at)
        .bind(request.refund_transaction_id)
        .bind(request.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RefundRequest>> {
        let row = sqlx::query_as::<_, RefundRequest>(&format!(
            "SELECT {} FROM refund_requests WHERE id = $1",
            REFUND_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_original(&self, original_transaction_id: Uuid) -> Result<Option<RefundRequest>> {
        let row = sqlx::query_as::<_, RefundRequest>(&format!(
            "SELECT {} FROM refund_requests WHERE original_transaction_id = $1",
            REFUND_COLUMNS
        ))
        .bind(original_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn exists_for_original_in(conn: &mut PgConnection, original_transaction_id: Uuid) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM refund_requests WHERE original_transaction_id = $1)",
        )
        .bind(original_transaction_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(exists.0)
    }

    pub async fn lock_in(conn: &mut PgConnection, id: Uuid) -> Result<RefundRequest> {
        let row = sqlx::query_as::<_, RefundRequest>(&format!(
            "SELECT {} FROM refund_requests WHERE id = $1 FOR UPDATE",
            REFUND_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Refund request '{}' not found", id)))
    }

    pub async fn finalize_in(
        conn: &mut PgConnection,
        id: Uuid,
        status: RefundRequestStatus,
        processed_by: Uuid,
        refund_transaction_id: Option<Uuid>,
    ) -> Result<RefundRequest> {
        let row = sqlx::query_as::<_, RefundRequest>(&format!(
            r#"
            UPDATE refund_requests
            SET status = $2, processed_by = $3, processed_at = NOW(), refund_transaction_id = $4
            WHERE id = $1 AND status = 'INITIATED'
            RETURNING {}
            "#,
            REFUND_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(processed_by)
        .bind(refund_transaction_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::AlreadyProcessed(format!("Refund request '{}' is no longer initiated", id)))
    }
}
