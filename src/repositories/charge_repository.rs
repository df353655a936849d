use crate::error::{AppError, Result};
use crate::models::{ServiceCharge, TransactionCategory};
use sqlx::PgPool;
use uuid::Uuid;

const CHARGE_COLUMNS: &str = "id, category, charge_type, charge_value, min_charge, max_charge, min_amount, max_amount, is_active, created_at, updated_at";

/// Repository for service charge configuration.
pub struct ChargeRepository {
    pool: PgPool,
}

impl ChargeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_active_by_category(&self, category: TransactionCategory) -> Result<Vec<ServiceCharge>> {
        let rows = sqlx::query_as::<_, ServiceCharge>(&format!(
            r#"
            SELECT {} FROM service_charges
            WHERE category = $1 AND is_active
            ORDER BY min_amount DESC NULLS LAST
            "#,
            CHARGE_COLUMNS
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Inserts a tier, replacing the one with the same category and lower
    /// bound if present.
    pub async fn upsert(&self, charge: &ServiceCharge) -> Result<ServiceCharge> {
        let row = sqlx::query_as::<_, ServiceCharge>(&format!(
            r#"
            INSERT INTO service_charges ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (category, COALESCE(min_amount, -1)) DO UPDATE SET
                charge_type = EXCLUDED.charge_type,
                charge_value = EXCLUDED.charge_value,
                min_charge = EXCLUDED.min_charge,
                max_charge = EXCLUDED.max_charge,
                max_amount = EXCLUDED.max_amount,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING {cols}
            "#,
            cols = CHARGE_COLUMNS
        ))
        .bind(charge.id)
        .bind(charge.category)
        .bind(charge.charge_type)
        .bind(charge.charge_value)
        .bind(charge.min_charge)
        .bind(charge.max_charge)
        .bind(charge.min_amount)
        .bind(charge.max_amount)
        .bind(charge.is_active)
        .bind(charge.created_at)
        .bind(charge.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE service_charges SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
