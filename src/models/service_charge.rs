use super::transaction::TransactionCategory;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "charge_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Fixed,
    Percentage,
}

/// Fee configuration for a category, optionally limited to an amount tier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceCharge {
    pub id: Uuid,
    pub category: TransactionCategory,
    pub charge_type: ChargeType,
    pub charge_value: Decimal,
    pub min_charge: Option<Decimal>,
    pub max_charge: Option<Decimal>,
    /// Inclusive lower bound of the tier. `None` means unbounded.
    pub min_amount: Option<Decimal>,
    /// Inclusive upper bound of the tier. `None` means unbounded.
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceCharge {
    pub fn new(category: TransactionCategory, charge_type: ChargeType, charge_value: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category,
            charge_type,
            charge_value,
            min_charge: None,
            max_charge: None,
            min_amount: None,
            max_amount: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_bounds(mut self, min_charge: Option<Decimal>, max_charge: Option<Decimal>) -> Self {
        self.min_charge = min_charge;
        self.max_charge = max_charge;
        self
    }

    pub fn with_tier(mut self, min_amount: Option<Decimal>, max_amount: Option<Decimal>) -> Self {
        self.min_amount = min_amount;
        self.max_amount = max_amount;
        self
    }

    pub fn covers(&self, amount: Decimal) -> bool {
        self.min_amount.map_or(true, |min| amount >= min)
            && self.max_amount.map_or(true, |max| amount <= max)
    }

    /// Charge for `amount`, rounded to currency precision and clamped.
    pub fn compute(&self, amount: Decimal) -> Decimal {
        let raw = match self.charge_type {
            ChargeType::Fixed => self.charge_value,
            ChargeType::Percentage => amount * self.charge_value / Decimal::ONE_HUNDRED,
        };
        let mut charge = raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        if let Some(min) = self.min_charge {
            charge = charge.max(min);
        }
        if let Some(max) = self.max_charge {
            charge = charge.min(max);
        }
        charge.max(Decimal::ZERO)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.charge_value < Decimal::ZERO {
            return Err("Charge value cannot be negative".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_charge, self.max_charge) {
            if min > max {
                return Err("Minimum charge cannot exceed maximum charge".to_string());
            }
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err("Tier lower bound cannot exceed upper bound".to_string());
            }
        }
        Ok(())
    }
}

/// Picks the active row covering `amount`, preferring the narrowest tier.
/// No match means the operation is free.
pub fn select_charge(configs: &[ServiceCharge], amount: Decimal) -> Option<&ServiceCharge> {
    configs
        .iter()
        .filter(|c| c.is_active && c.covers(amount))
        .max_by_key(|c| c.min_amount.unwrap_or(Decimal::MIN))
}

pub fn calculate_charge(configs: &[ServiceCharge], amount: Decimal) -> Decimal {
    select_charge(configs, amount)
        .map(|c| c.compute(amount))
        .unwrap_or(Decimal::ZERO)
}
