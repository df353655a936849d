use super::reference::generate_reference;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 0.0001, i.e. one basis point.
pub const DEFAULT_FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 4);
/// 0.01
pub const DEFAULT_MIN_FEE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fund_request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum FundRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl FundRequestStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, FundRequestStatus::Pending)
    }
}

/// Platform fee on an approved fund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rate: Decimal,
    pub min_fee: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rate: DEFAULT_FEE_RATE,
            min_fee: DEFAULT_MIN_FEE,
        }
    }
}

impl FeeSchedule {
    /// `amount * rate` floored to 2 decimals, never below `min_fee`.
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        let fee = (amount * self.rate).round_dp_with_strategy(2, RoundingStrategy::ToNegativeInfinity);
        fee.max(self.min_fee)
    }

    /// Returns `(fee, net)` where `net` is what moves between wallets.
    pub fn split(&self, amount: Decimal) -> Result<(Decimal, Decimal)> {
        let fee = self.fee_for(amount);
        let net = amount - fee;
        if net <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Amount {} does not cover the platform fee {}",
                amount, fee
            )));
        }
        Ok((fee, net))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FundRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub reference_number: String,
    pub status: FundRequestStatus,
    pub remarks: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub service_charge: Option<Decimal>,
    pub wallet_credit: Option<Decimal>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FundRequest {
    pub const REFERENCE_PREFIX: &'static str = "FR";

    pub fn new(user_id: Uuid, amount: Decimal, remarks: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            reference_number: generate_reference(Self::REFERENCE_PREFIX),
            status: FundRequestStatus::Pending,
            remarks,
            processed_by: None,
            processed_at: None,
            service_charge: None,
            wallet_credit: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fails with "already processed" unless the request is still pending.
    pub fn ensure_pending(&self) -> Result<()> {
        if self.status.is_final() {
            return Err(AppError::AlreadyProcessed(format!(
                "Fund request {} is already {:?}",
                self.reference_number, self.status
            )));
        }
        Ok(())
    }
}
