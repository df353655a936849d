use crate::error::{AppError, Result};
use crate::models::{FundRequest, FundRequestStatus};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const FUND_REQUEST_COLUMNS: &str = "id, user_id, amount, reference_number, status, remarks, processed_by, processed_at, service_charge, wallet_credit, admin_notes, created_at, updated_at";

pub struct FundRequestRepository {
    pool: PgPool,
}

impl FundRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &FundRequest) -> Result<FundRequest> {
        let row = sqlx::query_as::<_, FundRequest>(&format!(
            r#"
            INSERT INTO fund_requests ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {cols}
            "#,
            cols = FUND_REQUEST_COLUMNS
        ))
        .bind(request.id)
        .bind(request.user_id)
        .bind(request.amount)
        .bind(&request.reference_number)
        .bind(request.status)
        .bind(&request.remarks)
        .bind(request.processed_by)
        .bind(request.processed_at)
        .bind(request.service_charge)
        .bind(request.wallet_credit)
        .bind(&request.admin_notes)
        .bind(request.created_at)
        .bind(request.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<FundRequest>> {
        let row = sqlx::query_as::<_, FundRequest>(&format!(
            "SELECT {} FROM fund_requests WHERE id = $1",
            FUND_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_pending(&self, limit: i64) -> Result<Vec<FundRequest>> {
        let rows = sqlx::query_as::<_, FundRequest>(&format!(
            r#"
            SELECT {} FROM fund_requests
            WHERE status = 'PENDING'
            ORDER BY created_at
            LIMIT $1
            "#,
            FUND_REQUEST_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn lock_in(conn: &mut PgConnection, id: Uuid) -> Result<FundRequest> {
        let row = sqlx::query_as::<_, FundRequest>(&format!(
            "SELECT {} FROM fund_requests WHERE id = $1 FOR UPDATE",
            FUND_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Fund request '{}' not found", id)))
    }

    /// Stamps the outcome on a locked pending request.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_in(
        conn: &mut PgConnection,
        id: Uuid,
        status: FundRequestStatus,
        processed_by: Uuid,
        service_charge: Option<Decimal>,
        wallet_credit: Option<Decimal>,
        admin_notes: Option<&str>,
    ) -> Result<FundRequest> {
        let row = sqlx::query_as::<_, FundRequest>(&format!(
            r#"
            UPDATE fund_requests
            SET status = $2, processed_by = $3, processed_at = NOW(),
                service_charge = $4, wallet_credit = $5, admin_notes = $6, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING {}
            "#,
            FUND_REQUEST_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(processed_by)
        .bind(service_charge)
        .bind(wallet_credit)
        .bind(admin_notes)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::AlreadyProcessed(format!("Fund request '{}' is no longer pending", id)))
    }
}
