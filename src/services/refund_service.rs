use super::ledger::{lock_and_post_in, LedgerPosting};
use crate::error::{AppError, Result};
use crate::models::{
    LedgerEntryDraft, RefundRequest, RefundRequestStatus, RefundStatus, Role, TransactionCategory,
};
use crate::observability::get_metrics;
use crate::repositories::{RefundRepository, TransactionRepository, UserRepository};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundInitiation {
    Initiated(RefundRequest),
    /// A refund is already in flight or done for this entry.
    NoOp { reason: String },
}

impl RefundInitiation {
    pub fn request(&self) -> Option<&RefundRequest> {
        match self {
            RefundInitiation::Initiated(request) => Some(request),
            RefundInitiation::NoOp { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundApproval {
    pub request: RefundRequest,
    pub posting: LedgerPosting,
}

/// Refund intent recording and its explicit approval or rejection.
pub struct RefundService {
    pool: PgPool,
    refund_repo: RefundRepository,
    user_repo: UserRepository,
}

impl RefundService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            refund_repo: RefundRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            pool,
        }
    }

    /// Records the intent to refund `original_transaction_id`. Safe to call
    /// repeatedly: only the first call creates a request.
    #[tracing::instrument(skip(self, external_response))]
    pub async fn auto_initiate(
        &self,
        original_transaction_id: Uuid,
        external_response: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<RefundInitiation> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let original = TransactionRepository::lock_in(&mut *tx, original_transaction_id).await?;

        if !original.is_refundable() {
            return Ok(RefundInitiation::NoOp {
                reason: format!(
                    "transaction {} is not refundable ({:?})",
                    original.reference_number, original.refund_status
                ),
            });
        }
        if RefundRepository::exists_for_original_in(&mut *tx, original.id).await? {
            return Ok(RefundInitiation::NoOp {
                reason: format!("refund already requested for {}", original.reference_number),
            });
        }

        let request = RefundRequest::new(&original, reason, external_response);
        let request = RefundRepository::insert_in(&mut *tx, &request).await?;
        TransactionRepository::set_refund_status_in(&mut *tx, original.id, RefundStatus::RefundInitiated).await?;
        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_refund("initiated");
        tracing::info!(
            reference = %request.reference_number,
            original = %original.reference_number,
            amount = %request.refund_amount,
            "Refund initiated"
        );
        Ok(RefundInitiation::Initiated(request))
    }

    /// Credits the refund back and marks the original entry refunded.
    pub async fn approve(&self, refund_request_id: Uuid, approver_id: Uuid) -> Result<RefundApproval> {
        self.ensure_refund_approver(approver_id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let request = RefundRepository::lock_in(&mut *tx, refund_request_id).await?;
        request.ensure_initiated()?;
        let original = TransactionRepository::lock_in(&mut *tx, request.original_transaction_id).await?;

        let draft = LedgerEntryDraft::credit(
            request.refund_amount,
            TransactionCategory::Refund,
            format!("Refund of {}", original.reference_number),
        )
        .initiated_by(approver_id)
        .with_metadata(serde_json::json!({
            "refund_request_id": request.id,
            "original_transaction_id": original.id,
            "original_reference": original.reference_number,
        }));
        let posting = lock_and_post_in(&mut *tx, request.wallet_id, draft).await?;

        TransactionRepository::set_refund_status_in(&mut *tx, original.id, RefundStatus::Refunded).await?;
        let request = RefundRepository::finalize_in(
            &mut *tx,
            request.id,
            RefundRequestStatus::Approved,
            approver_id,
            Some(posting.entry.id),
        )
        .await?;
        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_refund("approved");
        tracing::info!(
            reference = %request.reference_number,
            credited = %posting.entry.amount,
            "Refund approved"
        );
        Ok(RefundApproval { request, posting })
    }

    /// Closes the request without moving money. The original entry becomes
    /// refundable in status only; its unique request row stays.
    pub async fn reject(&self, refund_request_id: Uuid, approver_id: Uuid) -> Result<RefundRequest> {
        self.ensure_refund_approver(approver_id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let request = RefundRepository::lock_in(&mut *tx, refund_request_id).await?;
        request.ensure_initiated()?;
        TransactionRepository::set_refund_status_in(&mut *tx, request.original_transaction_id, RefundStatus::NotRefunded)
            .await?;
        let request = RefundRepository::finalize_in(
            &mut *tx,
            request.id,
            RefundRequestStatus::Rejected,
            approver_id,
            None,
        )
        .await?;
        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_refund("rejected");
        tracing::info!(reference = %request.reference_number, "Refund rejected");
        Ok(request)
    }

    pub async fn find_for_transaction(&self, original_transaction_id: Uuid) -> Result<Option<RefundRequest>> {
        self.refund_repo.find_by_original(original_transaction_id).await
    }

    async fn ensure_refund_approver(&self, approver_id: Uuid) -> Result<()> {
        let approver = self
            .user_repo
            .find_by_id(approver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", approver_id)))?;
        if !approver.is_active || !matches!(approver.role, Role::Superadmin | Role::Admin) {
            return Err(AppError::PermissionDenied(
                "Refunds are approved by an active admin or superadmin".to_string(),
            ));
        }
        Ok(())
    }
}
