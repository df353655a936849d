pub mod charge_repository;
pub mod commission_repository;
pub mod fund_request_repository;
pub mod refund_repository;
pub mod transaction_repository;
pub mod user_repository;
pub mod wallet_repository;

pub use charge_repository::ChargeRepository;
pub use commission_repository::CommissionRepository;
pub use fund_request_repository::FundRequestRepository;
pub use refund_repository::RefundRepository;
pub use transaction_repository::TransactionRepository;
pub use user_repository::UserRepository;
pub use wallet_repository::WalletRepository;
