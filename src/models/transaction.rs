use super::reference::generate_reference;
use super::wallet::BalanceMovement;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Direction of a balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

/// What a ledger entry was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum TransactionCategory {
    FundRequest,
    MoneyTransfer,
    BillPayment,
    Bbps,
    ServiceCharge,
    Cashback,
    Refund,
    Commission,
    ServicePayment,
    BeneficiaryVerification,
    VendorPayment,
    DmtTransfer,
    ManualTopup,
    DirectTransfer,
    Other,
}

impl TransactionCategory {
    /// Prefix used when generating reference numbers.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            TransactionCategory::FundRequest => "FR",
            TransactionCategory::MoneyTransfer => "MT",
            TransactionCategory::BillPayment => "BP",
            TransactionCategory::Bbps => "BBPS",
            TransactionCategory::ServiceCharge => "SC",
            TransactionCategory::Cashback => "CB",
            TransactionCategory::Refund => "RF",
            TransactionCategory::Commission => "COM",
            TransactionCategory::ServicePayment => "SP",
            TransactionCategory::BeneficiaryVerification => "BV",
            TransactionCategory::VendorPayment => "VP",
            TransactionCategory::DmtTransfer => "DMT",
            TransactionCategory::ManualTopup => "MTU",
            TransactionCategory::DirectTransfer => "DT",
            TransactionCategory::Other => "TXN",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::FundRequest => "fund_request",
            TransactionCategory::MoneyTransfer => "money_transfer",
            TransactionCategory::BillPayment => "bill_payment",
            TransactionCategory::Bbps => "bbps",
            TransactionCategory::ServiceCharge => "service_charge",
            TransactionCategory::Cashback => "cashback",
            TransactionCategory::Refund => "refund",
            TransactionCategory::Commission => "commission",
            TransactionCategory::ServicePayment => "service_payment",
            TransactionCategory::BeneficiaryVerification => "beneficiary_verification",
            TransactionCategory::VendorPayment => "vendor_payment",
            TransactionCategory::DmtTransfer => "dmt_transfer",
            TransactionCategory::ManualTopup => "manual_topup",
            TransactionCategory::DirectTransfer => "direct_transfer",
            TransactionCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    /// Handed to the external gateway, outcome not yet known.
    Processing,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Pending and processing entries are still mutable.
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    NotRefunded,
    RefundInitiated,
    Refunded,
}

/// Status transitions for ledger entries. Only open entries may move.
#[derive(Debug, Clone)]
pub struct TransactionStateMachine;

impl TransactionStateMachine {
    pub fn valid_transitions(current: TransactionStatus) -> Vec<TransactionStatus> {
        match current {
            TransactionStatus::Pending => vec![
                TransactionStatus::Processing,
                TransactionStatus::Success,
                TransactionStatus::Failed,
                TransactionStatus::Cancelled,
            ],
            TransactionStatus::Processing => vec![
                TransactionStatus::Success,
                TransactionStatus::Failed,
                TransactionStatus::Cancelled,
            ],
            TransactionStatus::Success
            | TransactionStatus::Failed
            | TransactionStatus::Cancelled => vec![],
        }
    }

    pub fn can_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    pub fn transition(from: TransactionStatus, to: TransactionStatus) -> Result<TransactionStatus> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(AppError::Validation(format!(
                "Invalid state transition from {:?} to {:?}",
                from, to
            )))
        }
    }
}

/// Everything the caller decides about a ledger entry. Balances are filled in
/// from the locked wallet when the entry is recorded.
#[derive(Debug, Clone)]
pub struct LedgerEntryDraft {
    pub amount: Decimal,
    pub service_charge: Decimal,
    pub transaction_type: TransactionType,
    pub category: TransactionCategory,
    pub status: TransactionStatus,
    pub description: String,
    pub initiated_by: Option<Uuid>,
    pub reference_number: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl LedgerEntryDraft {
    pub fn debit(amount: Decimal, category: TransactionCategory, description: impl Into<String>) -> Self {
        Self {
            amount,
            service_charge: Decimal::ZERO,
            transaction_type: TransactionType::Debit,
            category,
            status: TransactionStatus::Success,
            description: description.into(),
            initiated_by: None,
            reference_number: None,
            metadata: None,
        }
    }

    pub fn credit(amount: Decimal, category: TransactionCategory, description: impl Into<String>) -> Self {
        Self {
            transaction_type: TransactionType::Credit,
            ..Self::debit(amount, category, description)
        }
    }

    pub fn with_charge(mut self, charge: Decimal) -> Self {
        self.service_charge = charge;
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn initiated_by(mut self, user_id: Uuid) -> Self {
        self.initiated_by = Some(user_id);
        self
    }

    pub fn with_reference(mut self, reference_number: impl Into<String>) -> Self {
        self.reference_number = Some(reference_number.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Total that moves the balance.
    pub fn gross(&self) -> Decimal {
        self.amount + self.service_charge
    }
}

/// One immutable audit row for a single balance movement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub service_charge: Decimal,
    /// `amount + service_charge`, the magnitude of the balance change.
    pub net_amount: Decimal,
    pub transaction_type: TransactionType,
    pub category: TransactionCategory,
    pub status: TransactionStatus,
    pub reference_number: String,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub refund_status: RefundStatus,
    pub description: String,
    pub initiated_by: Option<Uuid>,
    pub external_reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Freezes a draft against the movement it documents.
    pub fn from_draft(
        wallet_id: Uuid,
        draft: LedgerEntryDraft,
        movement: BalanceMovement,
    ) -> Result<Self> {
        let expected = match draft.transaction_type {
            TransactionType::Credit => movement.opening_balance + draft.gross(),
            TransactionType::Debit => movement.opening_balance - draft.gross(),
        };
        if expected != movement.closing_balance {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Ledger entry does not match balance movement: expected closing {}, got {}",
                expected,
                movement.closing_balance
            )));
        }

        let now = Utc::now();
        let reference_number = draft
            .reference_number
            .unwrap_or_else(|| generate_reference(draft.category.reference_prefix()));

        Ok(Self {
            id: Uuid::new_v4(),
            wallet_id,
            amount: draft.amount,
            service_charge: draft.service_charge,
            net_amount: draft.amount + draft.service_charge,
            transaction_type: draft.transaction_type,
            category: draft.category,
            status: draft.status,
            reference_number,
            opening_balance: movement.opening_balance,
            closing_balance: movement.closing_balance,
            refund_status: RefundStatus::NotRefunded,
            description: draft.description,
            initiated_by: draft.initiated_by,
            external_reference: None,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_refundable(&self) -> bool {
        self.transaction_type == TransactionType::Debit
            && self.refund_status == RefundStatus::NotRefunded
    }
}
