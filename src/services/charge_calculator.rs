use crate::error::{AppError, Result};
use crate::models::service_charge::calculate_charge;
use crate::models::{ServiceCharge, TransactionCategory};
use crate::repositories::ChargeRepository;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Looks up configured service charges. A missing configuration means the
/// operation is free.
pub struct ChargeCalculator {
    charge_repo: ChargeRepository,
}

impl ChargeCalculator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            charge_repo: ChargeRepository::new(pool),
        }
    }

    pub async fn calculate_charge(&self, category: TransactionCategory, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }

        let configs = self.charge_repo.find_active_by_category(category).await?;
        let charge = calculate_charge(&configs, amount);

        if configs.is_empty() {
            tracing::debug!(category = category.as_str(), "No service charge configured");
        }

        Ok(charge)
    }

    /// Stores a charge tier, replacing an existing one with the same lower bound.
    pub async fn configure(&self, charge: ServiceCharge) -> Result<ServiceCharge> {
        charge.validate().map_err(AppError::Validation)?;
        let stored = self.charge_repo.upsert(&charge).await?;

        tracing::info!(
            category = stored.category.as_str(),
            charge_type = ?stored.charge_type,
            value = %stored.charge_value,
            "Service charge configured"
        );

        Ok(stored)
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        if !self.charge_repo.deactivate(id).await? {
            return Err(AppError::NotFound(format!("Service charge '{}' not found", id)));
        }
        Ok(())
    }
}
