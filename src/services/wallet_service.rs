use super::charge_calculator::ChargeCalculator;
use super::ledger::{lock_and_post_in, post_in, LedgerPosting};
use crate::error::{AppError, Result};
use crate::models::pin::{hash_pin, validate_pin};
use crate::models::{
    LedgerEntryDraft, Role, TransactionCategory, TransactionStatus, TransactionType, Wallet,
    WalletTransaction,
};
use crate::observability::{get_metrics, mask_wallet_id};
use crate::repositories::{TransactionRepository, UserRepository, WalletRepository};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// A user-initiated debit. The service charge is looked up from the category.
#[derive(Debug, Clone)]
pub struct DebitRequest {
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub category: TransactionCategory,
    pub pin: Option<String>,
    pub description: String,
    pub initiated_by: Option<Uuid>,
    /// `Pending` when the outcome depends on an external call.
    pub status: TransactionStatus,
    pub metadata: Option<serde_json::Value>,
}

impl DebitRequest {
    pub fn new(wallet_id: Uuid, amount: Decimal, category: TransactionCategory, pin: Option<&str>) -> Self {
        Self {
            wallet_id,
            amount,
            category,
            pin: pin.map(str::to_string),
            description: format!("{} debit", category.as_str()),
            initiated_by: None,
            status: TransactionStatus::Success,
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
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

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Wallet operations: PIN management, authorized debits, credits and the
/// two PIN-less debit paths.
pub struct WalletService {
    pool: PgPool,
    wallet_repo: WalletRepository,
    transaction_repo: TransactionRepository,
    user_repo: UserRepository,
    charges: ChargeCalculator,
}

impl WalletService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            wallet_repo: WalletRepository::new(pool.clone()),
            transaction_repo: TransactionRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            charges: ChargeCalculator::new(pool.clone()),
            pool,
        }
    }

    pub async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.wallet_repo
            .find_by_id(wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet '{}' not found", wallet_id)))
    }

    pub async fn get_wallet_for_user(&self, user_id: Uuid) -> Result<Wallet> {
        self.wallet_repo
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet for user '{}' not found", user_id)))
    }

    pub async fn set_pin(&self, wallet_id: Uuid, pin: &str) -> Result<Wallet> {
        validate_pin(pin)?;
        let hash = hash_pin(pin)?;
        let wallet = self.wallet_repo.set_pin_hash(wallet_id, &hash).await?;

        tracing::info!(wallet_id = %mask_wallet_id(&wallet_id), "Transaction PIN set");
        Ok(wallet)
    }

    /// False when no PIN is set or the PIN does not match.
    pub async fn verify_pin(&self, wallet_id: Uuid, pin: &str) -> Result<bool> {
        let wallet = self.get_wallet(wallet_id).await?;
        Ok(wallet.verify_pin(pin))
    }

    pub async fn has_sufficient_balance(&self, wallet_id: Uuid, amount: Decimal, charge: Decimal) -> Result<bool> {
        let wallet = self.get_wallet(wallet_id).await?;
        Ok(wallet.has_sufficient_balance(amount, charge))
    }

    /// PIN-checked debit of `amount` plus the configured charge.
    #[tracing::instrument(skip(self, request), fields(wallet_id = %request.wallet_id, category = request.category.as_str()))]
    pub async fn attempt_debit(&self, request: DebitRequest) -> Result<LedgerPosting> {
        let charge = self.charges.calculate_charge(request.category, request.amount).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let wallet = WalletRepository::lock_in(&mut *tx, request.wallet_id).await?;

        let authorized = wallet
            .authorize_debit(request.pin.as_deref())
            .and_then(|_| wallet.plan_debit(request.amount, charge).map(|_| ()));
        if let Err(e) = authorized {
            get_metrics().record_debit_rejected(request.category.as_str(), e.reason_code());
            tracing::warn!(reason = e.reason_code(), "Debit rejected");
            return Err(e);
        }

        let mut draft = LedgerEntryDraft::debit(request.amount, request.category, request.description)
            .with_charge(charge)
            .with_status(request.status);
        if let Some(user_id) = request.initiated_by {
            draft = draft.initiated_by(user_id);
        }
        if let Some(metadata) = request.metadata {
            draft = draft.with_metadata(metadata);
        }

        let posting = post_in(&mut *tx, &wallet, draft).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(
            reference = %posting.entry.reference_number,
            amount = %posting.entry.amount,
            charge = %posting.entry.service_charge,
            closing = %posting.entry.closing_balance,
            "Wallet debited"
        );

        Ok(posting)
    }

    /// Credits never need the receiver's PIN.
    pub async fn attempt_credit(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        category: TransactionCategory,
        description: impl Into<String>,
        initiated_by: Option<Uuid>,
    ) -> Result<LedgerPosting> {
        let mut draft = LedgerEntryDraft::credit(amount, category, description);
        if let Some(user_id) = initiated_by {
            draft = draft.initiated_by(user_id);
        }

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let posting = lock_and_post_in(&mut *tx, wallet_id, draft).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(
            wallet_id = %wallet_id,
            reference = %posting.entry.reference_number,
            amount = %amount,
            "Wallet credited"
        );

        Ok(posting)
    }

    /// Mandatory platform fee, e.g. beneficiary bank verification. Never used
    /// for user-initiated transfers.
    pub async fn deduct_fee_without_pin(
        &self,
        wallet_id: Uuid,
        fee: Decimal,
        category: TransactionCategory,
        description: impl Into<String>,
    ) -> Result<LedgerPosting> {
        let draft = LedgerEntryDraft::debit(fee, category, description)
            .with_metadata(serde_json::json!({ "platform_fee": true }));

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let posting = lock_and_post_in(&mut *tx, wallet_id, draft).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(wallet_id = %wallet_id, fee = %fee, "Platform fee deducted");
        Ok(posting)
    }

    /// Privileged PIN-less debit for administrative corrections.
    pub(crate) async fn system_deduct(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        description: impl Into<String>,
        actor: Uuid,
    ) -> Result<LedgerPosting> {
        let draft = LedgerEntryDraft::debit(amount, TransactionCategory::Other, description)
            .initiated_by(actor)
            .with_metadata(serde_json::json!({ "system_deduct": true }));

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let posting = lock_and_post_in(&mut *tx, wallet_id, draft).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::warn!(wallet_id = %wallet_id, actor = %actor, amount = %amount, "System deduction applied");
        Ok(posting)
    }

    /// Superadmin-only credit or debit with a mandatory reason.
    pub async fn manual_adjustment(
        &self,
        actor_id: Uuid,
        wallet_id: Uuid,
        amount: Decimal,
        direction: TransactionType,
        reason: &str,
    ) -> Result<LedgerPosting> {
        let actor = self
            .user_repo
            .find_by_id(actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", actor_id)))?;
        if actor.role != Role::Superadmin || !actor.is_active {
            return Err(AppError::PermissionDenied(
                "Manual adjustments require an active superadmin".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(AppError::Validation("Adjustment reason is required".to_string()));
        }

        let description = format!("Manual adjustment: {}", reason.trim());
        match direction {
            TransactionType::Credit => {
                self.attempt_credit(wallet_id, amount, TransactionCategory::ManualTopup, description, Some(actor_id))
                    .await
            }
            TransactionType::Debit => self.system_deduct(wallet_id, amount, description, actor_id).await,
        }
    }

    pub async fn history(&self, wallet_id: Uuid, limit: i64, offset: i64) -> Result<Vec<WalletTransaction>> {
        self.transaction_repo.find_by_wallet(wallet_id, limit, offset).await
    }
}
