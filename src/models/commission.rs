use super::hierarchy::{Recipient, ResolvedVia};
use super::transaction::WalletTransaction;
use super::user::Role;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "commission_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    Percentage,
    Fixed,
}

/// Named tier such as platinum, gold or silver.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CommissionPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Assignment of a plan to a user. At most one active row per user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserCommissionPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub is_active: bool,
    pub assigned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Commission terms for one service or operator under one plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceCommission {
    pub id: Uuid,
    /// Service or operator key, e.g. `bbps:electricity` or `operator:airtel`.
    pub service_key: String,
    pub plan_id: Uuid,
    pub commission_type: CommissionType,
    pub commission_value: Decimal,
    pub admin_commission: Decimal,
    pub master_commission: Decimal,
    pub dealer_commission: Decimal,
    pub retailer_commission: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceCommission {
    pub fn new(
        service_key: impl Into<String>,
        plan_id: Uuid,
        commission_type: CommissionType,
        commission_value: Decimal,
        split: CommissionSplit,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_key: service_key.into(),
            plan_id,
            commission_type,
            commission_value,
            admin_commission: split.admin,
            master_commission: split.master,
            dealer_commission: split.dealer,
            retailer_commission: split.retailer,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn split(&self) -> CommissionSplit {
        CommissionSplit {
            admin: self.admin_commission,
            master: self.master_commission,
            dealer: self.dealer_commission,
            retailer: self.retailer_commission,
        }
    }

    /// Write-time check: value non-negative, split valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.service_key.trim().is_empty() {
            return Err("Service key is required".to_string());
        }
        if self.commission_value < Decimal::ZERO {
            return Err("Commission value cannot be negative".to_string());
        }
        if self.commission_type == CommissionType::Percentage
            && self.commission_value > Decimal::ONE_HUNDRED
        {
            return Err("Percentage commission cannot exceed 100".to_string());
        }
        self.split().validate()
    }

    /// Total commission for a transaction amount, truncated to currency precision.
    pub fn total_commission(&self, amount: Decimal) -> Decimal {
        let total = match self.commission_type {
            CommissionType::Percentage => amount * self.commission_value / Decimal::ONE_HUNDRED,
            CommissionType::Fixed => self.commission_value,
        };
        to_currency(total)
    }
}

/// Percentages of the total paid to each named role. The superadmin receives
/// whatever the four named buckets leave over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub admin: Decimal,
    pub master: Decimal,
    pub dealer: Decimal,
    pub retailer: Decimal,
}

impl CommissionSplit {
    pub fn named_total(&self) -> Decimal {
        self.admin + self.master + self.dealer + self.retailer
    }

    pub fn superadmin(&self) -> Decimal {
        Decimal::ONE_HUNDRED - self.named_total()
    }

    pub fn percentage_for(&self, role: Role) -> Decimal {
        match role {
            Role::Superadmin => self.superadmin(),
            Role::Admin => self.admin,
            Role::Master => self.master,
            Role::Dealer => self.dealer,
            Role::Retailer => self.retailer,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("admin", self.admin),
            ("master", self.master),
            ("dealer", self.dealer),
            ("retailer", self.retailer),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(format!("{} commission must be between 0 and 100", name));
            }
        }
        if self.named_total() > Decimal::ONE_HUNDRED {
            return Err(format!(
                "Commission percentages sum to {}, which exceeds 100",
                self.named_total()
            ));
        }
        Ok(())
    }
}

/// Share of `total` owed to each role, superadmin included.
pub fn role_shares(total: Decimal, split: &CommissionSplit) -> Vec<(Role, Decimal)> {
    Role::ALL
        .iter()
        .map(|role| {
            let share = to_currency(total * split.percentage_for(*role) / Decimal::ONE_HUNDRED);
            (*role, share)
        })
        .collect()
}

/// One planned credit of a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionAllocation {
    pub recipient: Recipient,
    pub amount: Decimal,
}

/// Pairs shares with resolved recipients, dropping zero shares and roles
/// without a payee.
pub fn allocate(
    total: Decimal,
    split: &CommissionSplit,
    recipients: &[Recipient],
) -> Vec<CommissionAllocation> {
    role_shares(total, split)
        .into_iter()
        .filter(|(_, share)| *share > Decimal::ZERO)
        .filter_map(|(role, share)| {
            recipients
                .iter()
                .find(|r| r.role == role)
                .map(|recipient| CommissionAllocation {
                    recipient: *recipient,
                    amount: share,
                })
        })
        .collect()
}

/// Shares are truncated, so the sum never exceeds the computed total.
fn to_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// One commission credit to one recipient for one originating transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommissionTransaction {
    pub id: Uuid,
    pub originating_transaction_id: Uuid,
    /// Ledger entry written on the recipient's wallet.
    pub ledger_transaction_id: Uuid,
    pub recipient_id: Uuid,
    pub role: Role,
    pub commission_amount: Decimal,
    pub original_transaction_amount: Decimal,
    pub retailer_user_id: Uuid,
    pub service_key: String,
    pub resolved_via: String,
    pub reference_number: String,
    pub created_at: DateTime<Utc>,
}

impl CommissionTransaction {
    /// The reference is derived from the credit entry's own reference, which
    /// is unique, so rows written in the same second cannot collide.
    pub fn new(
        originating_transaction_id: Uuid,
        ledger_entry: &WalletTransaction,
        allocation: &CommissionAllocation,
        original_transaction_amount: Decimal,
        retailer_user_id: Uuid,
        service_key: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            originating_transaction_id,
            ledger_transaction_id: ledger_entry.id,
            recipient_id: allocation.recipient.user_id,
            role: allocation.recipient.role,
            commission_amount: allocation.amount,
            original_transaction_amount,
            retailer_user_id,
            service_key: service_key.to_string(),
            resolved_via: allocation.recipient.resolved_via.as_str().to_string(),
            reference_number: format!("CT{}", ledger_entry.reference_number),
            created_at: Utc::now(),
        }
    }

    pub fn was_fallback(&self) -> bool {
        self.resolved_via == ResolvedVia::Fallback.as_str()
    }
}

/// A commission-percentage field that can be shown or edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionField {
    AdminCommission,
    MasterCommission,
    DealerCommission,
    RetailerCommission,
}

/// Which commission fields a role can see and edit.
#[derive(Debug, Clone, Copy)]
pub struct FieldAccess {
    pub visible: &'static [CommissionField],
    pub editable: &'static [CommissionField],
}

const ALL_FIELDS: &[CommissionField] = &[
    CommissionField::AdminCommission,
    CommissionField::MasterCommission,
    CommissionField::DealerCommission,
    CommissionField::RetailerCommission,
];
const BELOW_ADMIN: &[CommissionField] = &[
    CommissionField::MasterCommission,
    CommissionField::DealerCommission,
    CommissionField::RetailerCommission,
];
const BELOW_MASTER: &[CommissionField] = &[
    CommissionField::DealerCommission,
    CommissionField::RetailerCommission,
];
const BELOW_DEALER: &[CommissionField] = &[CommissionField::RetailerCommission];

/// Static role table. A role sees its own field and everything below it and
/// edits only the fields strictly below it; superadmin edits everything.
pub fn field_access(role: Role) -> FieldAccess {
    match role {
        Role::Superadmin => FieldAccess {
            visible: ALL_FIELDS,
            editable: ALL_FIELDS,
        },
        Role::Admin => FieldAccess {
            visible: ALL_FIELDS,
            editable: BELOW_ADMIN,
        },
        Role::Master => FieldAccess {
            visible: BELOW_ADMIN,
            editable: BELOW_MASTER,
        },
        Role::Dealer => FieldAccess {
            visible: BELOW_MASTER,
            editable: BELOW_DEALER,
        },
        Role::Retailer => FieldAccess {
            visible: BELOW_DEALER,
            editable: &[],
        },
    }
}
