pub mod auto_resolution;
pub mod charge_calculator;
pub mod commission_engine;
pub mod commission_service;
pub mod fund_request_service;
pub mod hierarchy_service;
pub mod ledger;
pub mod payment_service;
pub mod refund_service;
pub mod wallet_service;

pub use auto_resolution::AutoResolutionJob;
pub use charge_calculator::ChargeCalculator;
pub use commission_engine::{CommissionEngine, DistributionOutcome};
pub use commission_service::CommissionService;
pub use fund_request_service::{FundRequestApproval, FundRequestService};
pub use hierarchy_service::{HierarchyService, OnboardUserRequest, OnboardedUser};
pub use ledger::LedgerPosting;
pub use payment_service::{
    GatewayRequest, GatewayResponse, GatewayStatus, PaymentGateway, PaymentOutcome, PaymentRequest,
    PaymentService,
};
pub use refund_service::{RefundApproval, RefundInitiation, RefundService};
pub use wallet_service::{DebitRequest, WalletService};
