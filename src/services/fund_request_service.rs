use super::ledger::{post_in, LedgerPosting};
use crate::error::{AppError, Result};
use crate::models::reference::generate_reference;
use crate::models::wallet::validate_amount;
use crate::models::{
    FeeSchedule, FundRequest, FundRequestStatus, LedgerEntryDraft, TransactionCategory, User,
};
use crate::observability::get_metrics;
use crate::repositories::{FundRequestRepository, UserRepository, WalletRepository};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const REFERENCE_CONSTRAINT: &str = "fund_requests_reference_number_key";
const MAX_REFERENCE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundRequestApproval {
    pub request: FundRequest,
    pub approver_posting: LedgerPosting,
    pub requester_posting: LedgerPosting,
}

/// Top-up requests funded from the approver's own wallet.
pub struct FundRequestService {
    pool: PgPool,
    fund_request_repo: FundRequestRepository,
    user_repo: UserRepository,
    wallet_repo: WalletRepository,
    fees: FeeSchedule,
}

impl FundRequestService {
    pub fn new(pool: PgPool, fees: FeeSchedule) -> Self {
        Self {
            fund_request_repo: FundRequestRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            wallet_repo: WalletRepository::new(pool.clone()),
            pool,
            fees,
        }
    }

    pub async fn create(&self, user_id: Uuid, amount: Decimal, remarks: Option<String>) -> Result<FundRequest> {
        validate_amount(amount)?;
        self.active_user(user_id).await?;
        self.fees.split(amount)?;

        let mut request = FundRequest::new(user_id, amount, remarks);
        let mut attempt = 1;
        let request = loop {
            match self.fund_request_repo.create(&request).await {
                Ok(row) => break row,
                Err(e) if attempt < MAX_REFERENCE_ATTEMPTS && e.is_unique_violation_on(REFERENCE_CONSTRAINT) => {
                    tracing::warn!(reference = %request.reference_number, attempt, "Reference number collision, regenerating");
                    request.reference_number = generate_reference(FundRequest::REFERENCE_PREFIX);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        tracing::info!(reference = %request.reference_number, amount = %amount, "Fund request created");
        Ok(request)
    }

    pub async fn get(&self, id: Uuid) -> Result<FundRequest> {
        self.fund_request_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fund request '{}' not found", id)))
    }

    pub async fn pending(&self, limit: i64) -> Result<Vec<FundRequest>> {
        self.fund_request_repo.find_pending(limit).await
    }

    /// Moves `amount - fee` from the approver to the requester and marks the
    /// request approved, all in one transaction.
    #[tracing::instrument(skip(self, notes))]
    pub async fn approve(&self, request_id: Uuid, approver_id: Uuid, notes: Option<String>) -> Result<FundRequestApproval> {
        let approver = self.active_user(approver_id).await?;
        let snapshot = self.get(request_id).await?;
        snapshot.ensure_pending()?;
        let requester = self.active_user(snapshot.user_id).await?;
        ensure_can_approve(&approver, &requester)?;

        let approver_wallet = self.wallet_id_for(approver.id).await?;
        let requester_wallet = self.wallet_id_for(requester.id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let request = FundRequestRepository::lock_in(&mut *tx, request_id).await?;
        request.ensure_pending()?;

        let (fee, net) = self.fees.split(request.amount)?;

        let wallets = WalletRepository::lock_many_in(&mut *tx, &[approver_wallet, requester_wallet]).await?;
        let (approver_row, requester_row) = (&wallets[0], &wallets[1]);
        if approver_row.balance < net {
            get_metrics().record_fund_request("insufficient_approver_balance");
            return Err(AppError::InsufficientApproverBalance {
                required: net,
                available: approver_row.balance,
            });
        }

        let audit = serde_json::json!({
            "fund_request_id": request.id,
            "fund_request_reference": request.reference_number,
            "gross_amount": request.amount,
            "platform_fee": fee,
        });
        let approver_posting = post_in(
            &mut *tx,
            approver_row,
            LedgerEntryDraft::debit(net, TransactionCategory::FundRequest, format!("Fund request {} approved", request.reference_number))
                .initiated_by(approver.id)
                .with_metadata(audit.clone()),
        )
        .await?;
        let requester_posting = post_in(
            &mut *tx,
            requester_row,
            LedgerEntryDraft::credit(net, TransactionCategory::FundRequest, format!("Fund request {} credited", request.reference_number))
                .initiated_by(approver.id)
                .with_metadata(audit),
        )
        .await?;

        let request = FundRequestRepository::finalize_in(
            &mut *tx,
            request.id,
            FundRequestStatus::Approved,
            approver.id,
            Some(fee),
            Some(net),
            notes.as_deref(),
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_fund_request("approved");
        tracing::info!(
            reference = %request.reference_number,
            fee = %fee,
            net = %net,
            approver = %approver.id,
            "Fund request approved"
        );

        Ok(FundRequestApproval {
            request,
            approver_posting,
            requester_posting,
        })
    }

    /// Pure state transition, no money moves.
    pub async fn reject(&self, request_id: Uuid, approver_id: Uuid, notes: Option<String>) -> Result<FundRequest> {
        let approver = self.active_user(approver_id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let request = FundRequestRepository::lock_in(&mut *tx, request_id).await?;
        request.ensure_pending()?;
        let request = FundRequestRepository::finalize_in(
            &mut *tx,
            request.id,
            FundRequestStatus::Rejected,
            approver.id,
            None,
            None,
            notes.as_deref(),
        )
        .await?;
        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_fund_request("rejected");
        tracing::info!(reference = %request.reference_number, approver = %approver.id, "Fund request rejected");
        Ok(request)
    }

    async fn active_user(&self, user_id: Uuid) -> Result<User> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))?;
        if !user.is_active {
            return Err(AppError::PermissionDenied(format!("User '{}' is inactive", user.username)));
        }
        Ok(user)
    }

    async fn wallet_id_for(&self, user_id: Uuid) -> Result<Uuid> {
        self.wallet_repo
            .find_by_user_id(user_id)
            .await?
            .map(|w| w.id)
            .ok_or_else(|| AppError::NotFound(format!("Wallet for user '{}' not found", user_id)))
    }
}

/// Approvers must rank above the requester; superadmin approves anyone else.
fn ensure_can_approve(approver: &User, requester: &User) -> Result<()> {
    if approver.id == requester.id {
        return Err(AppError::PermissionDenied("Users cannot approve their own fund requests".to_string()));
    }
    if !approver.role.can_create(requester.role) {
        return Err(AppError::PermissionDenied(format!(
            "A {} cannot approve fund requests from a {}",
            approver.role, requester.role
        )));
    }
    Ok(())
}
