use crate::error::{AppError, Result};
use crate::models::{CommissionPlan, CommissionTransaction, ServiceCommission, UserCommissionPlan};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const SERVICE_COMMISSION_COLUMNS: &str = "id, service_key, plan_id, commission_type, commission_value, admin_commission, master_commission, dealer_commission, retailer_commission, is_active, created_at, updated_at";
const COMMISSION_TX_COLUMNS: &str = "id, originating_transaction_id, ledger_transaction_id, recipient_id, role, commission_amount, original_transaction_amount, retailer_user_id, service_key, resolved_via, reference_number, created_at";

/// Repository for commission plans, per-service terms and payout records.
pub struct CommissionRepository {
    pool: PgPool,
}

impl CommissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_plan(&self, plan: &CommissionPlan) -> Result<CommissionPlan> {
        let row = sqlx::query_as::<_, CommissionPlan>(
            r#"
            INSERT INTO commission_plans (id, name, description, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, is_active, created_at
            "#,
        )
        .bind(plan.id)
        .bind(&plan.name)
        .bind(&plan.description)
        .bind(plan.is_active)
        .bind(plan.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<CommissionPlan>> {
        let row = sqlx::query_as::<_, CommissionPlan>(
            "SELECT id, name, description, is_active, created_at FROM commission_plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_plan_by_name(&self, name: &str) -> Result<Option<CommissionPlan>> {
        let row = sqlx::query_as::<_, CommissionPlan>(
            "SELECT id, name, description, is_active, created_at FROM commission_plans WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Deactivates the user's current plan, if any, and activates `plan_id`.
    pub async fn assign_plan_in(
        conn: &mut PgConnection,
        user_id: Uuid,
        plan_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<UserCommissionPlan> {
        sqlx::query("UPDATE user_commission_plans SET is_active = FALSE WHERE user_id = $1 AND is_active")
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;

        let row = sqlx::query_as::<_, UserCommissionPlan>(
            r#"
            INSERT INTO user_commission_plans (id, user_id, plan_id, is_active, assigned_by, created_at)
            VALUES ($1, $2, $3, TRUE, $4, NOW())
            RETURNING id, user_id, plan_id, is_active, assigned_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(plan_id)
        .bind(assigned_by)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_active_plan_for_user(&self, user_id: Uuid) -> Result<Option<UserCommissionPlan>> {
        let row = sqlx::query_as::<_, UserCommissionPlan>(
            r#"
            SELECT ucp.id, ucp.user_id, ucp.plan_id, ucp.is_active, ucp.assigned_by, ucp.created_at
            FROM user_commission_plans ucp
            JOIN commission_plans p ON p.id = ucp.plan_id
            WHERE ucp.user_id = $1 AND ucp.is_active AND p.is_active
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn upsert_service_commission(&self, commission: &ServiceCommission) -> Result<ServiceCommission> {
        let row = sqlx::query_as::<_, ServiceCommission>(&format!(
            r#"
            INSERT INTO service_commissions ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (service_key, plan_id) DO UPDATE SET
                commission_type = EXCLUDED.commission_type,
                commission_value = EXCLUDED.commission_value,
                admin_commission = EXCLUDED.admin_commission,
                master_commission = EXCLUDED.master_commission,
                dealer_commission = EXCLUDED.dealer_commission,
                retailer_commission = EXCLUDED.retailer_commission,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING {cols}
            "#,
            cols = SERVICE_COMMISSION_COLUMNS
        ))
        .bind(commission.id)
        .bind(&commission.service_key)
        .bind(commission.plan_id)
        .bind(commission.commission_type)
        .bind(commission.commission_value)
        .bind(commission.admin_commission)
        .bind(commission.master_commission)
        .bind(commission.dealer_commission)
        .bind(commission.retailer_commission)
        .bind(commission.is_active)
        .bind(commission.created_at)
        .bind(commission.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_service_commission(
        &self,
        service_key: &str,
        plan_id: Uuid,
    ) -> Result<Option<ServiceCommission>> {
        let row = sqlx::query_as::<_, ServiceCommission>(&format!(
            r#"
            SELECT {} FROM service_commissions
            WHERE service_key = $1 AND plan_id = $2 AND is_active
            "#,
            SERVICE_COMMISSION_COLUMNS
        ))
        .bind(service_key)
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// True once any payout has been recorded for the originating entry.
    pub async fn exists_for_origin_in(conn: &mut PgConnection, originating_transaction_id: Uuid) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM commission_transactions WHERE originating_transaction_id = $1)",
        )
        .bind(originating_transaction_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(exists.0)
    }

    pub async fn insert_transaction_in(
        conn: &mut PgConnection,
        record: &CommissionTransaction,
    ) -> Result<CommissionTransaction> {
        let row = sqlx::query_as::<_, CommissionTransaction>(&format!(
            r#"
            INSERT INTO commission_transactions ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {cols}
            "#,
            cols = COMMISSION_TX_COLUMNS
        ))
        .bind(record.id)
        .bind(record.originating_transaction_id)
        .bind(record.ledger_transaction_id)
        .bind(record.recipient_id)
        .bind(record.role)
        .bind(record.commission_amount)
        .bind(record.original_transaction_amount)
        .bind(record.retailer_user_id)
        .bind(&record.service_key)
        .bind(&record.resolved_via)
        .bind(&record.reference_number)
        .bind(record.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_origin(&self, originating_transaction_id: Uuid) -> Result<Vec<CommissionTransaction>> {
        let rows = sqlx::query_as::<_, CommissionTransaction>(&format!(
            r#"
            SELECT {} FROM commission_transactions
            WHERE originating_transaction_id = $1
            ORDER BY role
            "#,
            COMMISSION_TX_COLUMNS
        ))
        .bind(originating_transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
