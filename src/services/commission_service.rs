use crate::error::{AppError, Result};
use crate::models::commission::{field_access, CommissionField};
use crate::models::{CommissionPlan, Role, ServiceCommission, UserCommissionPlan};
use crate::repositories::{CommissionRepository, UserRepository};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Commission configuration: plans, plan assignment and per-service terms.
pub struct CommissionService {
    pool: PgPool,
    commission_repo: CommissionRepository,
    user_repo: UserRepository,
}

impl CommissionService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            commission_repo: CommissionRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn create_plan(&self, name: &str, description: Option<String>) -> Result<CommissionPlan> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Plan name is required".to_string()));
        }
        if self.commission_repo.find_plan_by_name(name).await?.is_some() {
            return Err(AppError::Validation(format!("Commission plan '{}' already exists", name)));
        }

        let mut plan = CommissionPlan::new(name);
        plan.description = description;
        let plan = self.commission_repo.create_plan(&plan).await?;

        tracing::info!(plan_id = %plan.id, name = %plan.name, "Commission plan created");
        Ok(plan)
    }

    /// Replaces the user's active plan.
    pub async fn assign_plan(&self, user_id: Uuid, plan_id: Uuid, assigned_by: Option<Uuid>) -> Result<UserCommissionPlan> {
        if self.user_repo.find_by_id(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User '{}' not found", user_id)));
        }
        let plan = self
            .commission_repo
            .find_plan_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Commission plan '{}' not found", plan_id)))?;
        if !plan.is_active {
            return Err(AppError::Validation(format!("Commission plan '{}' is inactive", plan.name)));
        }

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let assignment = CommissionRepository::assign_plan_in(&mut *tx, user_id, plan_id, assigned_by).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(user_id = %user_id, plan = %plan.name, "Commission plan assigned");
        Ok(assignment)
    }

    /// Stores service terms on behalf of `editor`. Fields the editor may not
    /// edit must keep their stored value (zero for a new row).
    pub async fn upsert_service_commission(&self, editor: Role, commission: ServiceCommission) -> Result<ServiceCommission> {
        commission.validate().map_err(AppError::Validation)?;

        if self.commission_repo.find_plan_by_id(commission.plan_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Commission plan '{}' not found",
                commission.plan_id
            )));
        }

        let existing = self
            .commission_repo
            .find_service_commission(&commission.service_key, commission.plan_id)
            .await?;
        let access = field_access(editor);
        for field in ALL_FIELDS {
            if access.editable.contains(&field) {
                continue;
            }
            let current = existing
                .as_ref()
                .map(|row| field_value(row, field))
                .unwrap_or(Decimal::ZERO);
            if field_value(&commission, field) != current {
                return Err(AppError::PermissionDenied(format!(
                    "A {} cannot edit {:?}",
                    editor, field
                )));
            }
        }

        let stored = self.commission_repo.upsert_service_commission(&commission).await?;
        tracing::info!(
            service = %stored.service_key,
            plan_id = %stored.plan_id,
            superadmin_share = %stored.split().superadmin(),
            "Service commission stored"
        );
        Ok(stored)
    }

    /// Commission fields of `commission` that `viewer` is allowed to see.
    pub fn visible_fields(&self, viewer: Role, commission: &ServiceCommission) -> Vec<(CommissionField, Decimal)> {
        field_access(viewer)
            .visible
            .iter()
            .map(|field| (*field, field_value(commission, *field)))
            .collect()
    }

    pub async fn active_plan_for(&self, user_id: Uuid) -> Result<Option<UserCommissionPlan>> {
        self.commission_repo.find_active_plan_for_user(user_id).await
    }
}

const ALL_FIELDS: [CommissionField; 4] = [
    CommissionField::AdminCommission,
    CommissionField::MasterCommission,
    CommissionField::DealerCommission,
    CommissionField::RetailerCommission,
];

fn field_value(commission: &ServiceCommission, field: CommissionField) -> Decimal {
    match field {
        CommissionField::AdminCommission => commission.admin_commission,
        CommissionField::MasterCommission => commission.master_commission,
        CommissionField::DealerCommission => commission.dealer_commission,
        CommissionField::RetailerCommission => commission.retailer_commission,
    }
}
