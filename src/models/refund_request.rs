use super::transaction::WalletTransaction;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum RefundRequestStatus {
    Initiated,
    Approved,
    Rejected,
}

/// Recorded intent to refund one ledger entry. Money moves only on approval.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefundRequest {
    pub id: Uuid,
    pub original_transaction_id: Uuid,
    pub wallet_id: Uuid,
    /// `amount + service_charge` of the original entry.
    pub refund_amount: Decimal,
    pub reference_number: String,
    pub status: RefundRequestStatus,
    pub reason: Option<String>,
    pub external_response: Option<serde_json::Value>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub refund_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RefundRequest {
    /// Requests the full `amount + service_charge` of `original` back. Only
    /// one request may exist per original, so its reference doubles as ours.
    pub fn new(
        original: &WalletTransaction,
        reason: Option<String>,
        external_response: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_transaction_id: original.id,
            wallet_id: original.wallet_id,
            refund_amount: original.amount + original.service_charge,
            reference_number: format!("RFQ{}", original.reference_number),
            status: RefundRequestStatus::Initiated,
            reason,
            external_response,
            processed_by: None,
            processed_at: None,
            refund_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn ensure_initiated(&self) -> Result<()> {
        if self.status != RefundRequestStatus::Initiated {
            return Err(AppError::AlreadyProcessed(format!(
                "Refund request {} is already {:?}",
                self.reference_number, self.status
            )));
        }
        Ok(())
    }
}
