pub mod commission;
pub mod fund_request;
pub mod hierarchy;
pub mod pin;
pub mod reference;
pub mod refund_request;
pub mod service_charge;
pub mod transaction;
pub mod user;
pub mod wallet;

pub use commission::{
    CommissionAllocation, CommissionPlan, CommissionSplit, CommissionTransaction, CommissionType,
    ServiceCommission, UserCommissionPlan,
};
pub use fund_request::{FeeSchedule, FundRequest, FundRequestStatus};
pub use hierarchy::{Recipient, ResolvedVia, UplineChain, MAX_HIERARCHY_DEPTH};
pub use refund_request::{RefundRequest, RefundRequestStatus};
pub use service_charge::{ChargeType, ServiceCharge};
pub use transaction::{
    LedgerEntryDraft, RefundStatus, TransactionCategory, TransactionStateMachine,
    TransactionStatus, TransactionType, WalletTransaction,
};
pub use user::{Role, User};
pub use wallet::{BalanceMovement, Wallet};
