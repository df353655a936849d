use super::commission_engine::{CommissionEngine, DistributionOutcome};
use super::ledger::{lock_and_post_in, LedgerPosting};
use super::wallet_service::{DebitRequest, WalletService};
use crate::error::{AppError, Result};
use crate::models::{
    LedgerEntryDraft, RefundStatus, TransactionCategory, TransactionStateMachine, TransactionStatus,
    WalletTransaction,
};
use crate::observability::{amount_band, get_metrics, mask_account, mask_reference, LatencyTimer};
use crate::repositories::TransactionRepository;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_DISTRIBUTION_ATTEMPTS: u32 = 3;

/// What the core hands to the external gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub amount: Decimal,
    /// Reference number of the debit, used by the gateway for idempotency.
    pub client_reference: String,
    pub service_key: String,
    pub recipient: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
    /// Accepted but not yet settled; the sweep resolves it.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub status: GatewayStatus,
    pub external_reference_id: Option<String>,
    pub message: String,
}

/// Outbound payment rail. Authentication, retries and wire format are the
/// implementor's concern.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn execute(&self, request: &GatewayRequest) -> Result<GatewayResponse>;
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub category: TransactionCategory,
    pub service_key: String,
    pub pin: Option<String>,
    pub recipient: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Completed {
        entry: WalletTransaction,
        commission: DistributionOutcome,
    },
    /// The gateway has not answered definitively; the debit stays open.
    Pending { entry: WalletTransaction },
}

/// Debit, call out, then settle or reverse.
pub struct PaymentService {
    pool: PgPool,
    wallets: WalletService,
    gateway: Arc<dyn PaymentGateway>,
    commissions: Arc<CommissionEngine>,
    gateway_timeout: Duration,
}

impl PaymentService {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, commissions: Arc<CommissionEngine>) -> Self {
        Self {
            wallets: WalletService::new(pool.clone()),
            pool,
            gateway,
            commissions,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Any gateway failure or timeout is reversed before the error is
    /// returned, so a failed payment never leaves the wallet debited.
    #[tracing::instrument(skip(self, request), fields(wallet_id = %request.wallet_id, service = %request.service_key))]
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentOutcome> {
        let debit = DebitRequest::new(request.wallet_id, request.amount, request.category, request.pin.as_deref())
            .with_description(format!("Payment for {}", request.service_key))
            .with_status(TransactionStatus::Processing)
            .initiated_by(request.user_id)
            .with_metadata(serde_json::json!({ "service_key": request.service_key }));
        let posting = self.wallets.attempt_debit(debit).await?;

        let gateway_request = GatewayRequest {
            amount: request.amount,
            client_reference: posting.entry.reference_number.clone(),
            service_key: request.service_key.clone(),
            recipient: request.recipient,
        };

        tracing::info!(
            reference = %mask_reference(&gateway_request.client_reference),
            amount = amount_band(&gateway_request.amount),
            account = %masked_account(&gateway_request.recipient),
            "Dispatching payment to gateway"
        );

        let timer = LatencyTimer::new();
        let result = tokio::time::timeout(self.gateway_timeout, self.gateway.execute(&gateway_request)).await;
        let elapsed = timer.elapsed_ms();

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                get_metrics().record_gateway_call("error", elapsed);
                let reason = e.to_string();
                self.reverse(&posting, &reason, None).await?;
                return Err(AppError::Gateway(reason));
            }
            Err(_) => {
                get_metrics().record_gateway_call("timeout", elapsed);
                let reason = format!("Gateway did not answer within {:?}", self.gateway_timeout);
                self.reverse(&posting, &reason, None).await?;
                return Err(AppError::Gateway(reason));
            }
        };

        match response.status {
            GatewayStatus::Success => {
                get_metrics().record_gateway_call("success", elapsed);
                let entry = self.settle(&posting.entry, &response).await?;
                let commission = self.distribute_commission(&entry, request.user_id, &request.service_key).await;
                Ok(PaymentOutcome::Completed { entry, commission })
            }
            GatewayStatus::Failed => {
                get_metrics().record_gateway_call("failed", elapsed);
                self.reverse(&posting, &response.message, response.external_reference_id.as_deref())
                    .await?;
                Err(AppError::Gateway(response.message))
            }
            GatewayStatus::Pending => {
                get_metrics().record_gateway_call("pending", elapsed);
                tracing::info!(reference = %posting.entry.reference_number, "Payment pending at gateway");
                Ok(PaymentOutcome::Pending { entry: posting.entry })
            }
        }
    }

    /// The payment is already settled, so a distribution error never fails
    /// it. Retryable errors are retried; whatever remains is reported in the
    /// outcome so the caller can call `CommissionEngine::distribute` later.
    async fn distribute_commission(&self, entry: &WalletTransaction, user_id: Uuid, service_key: &str) -> DistributionOutcome {
        let mut attempt = 1;
        loop {
            match self.commissions.distribute(entry.id, user_id, service_key).await {
                Ok(outcome) => return outcome,
                Err(e) if e.is_retryable() && attempt < MAX_DISTRIBUTION_ATTEMPTS => {
                    tracing::warn!(reference = %entry.reference_number, attempt, error = %e, "Commission distribution failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::error!(reference = %entry.reference_number, retryable, error = %e, "Commission distribution failed");
                    get_metrics().record_commission_failed(e.reason_code(), retryable);
                    return DistributionOutcome::Failed {
                        reason: e.to_string(),
                        retryable,
                    };
                }
            }
        }
    }

    async fn settle(&self, entry: &WalletTransaction, response: &GatewayResponse) -> Result<WalletTransaction> {
        let already_resolved = || {
            AppError::AlreadyProcessed(format!(
                "Transaction {} was resolved before the gateway confirmed it",
                entry.reference_number
            ))
        };

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let current = TransactionRepository::lock_in(&mut *tx, entry.id).await?;
        if !TransactionStateMachine::can_transition(current.status, TransactionStatus::Success) {
            return Err(already_resolved());
        }
        let settled = TransactionRepository::update_status_in(
            &mut *tx,
            entry.id,
            TransactionStatus::Success,
            response.external_reference_id.as_deref(),
            Some(serde_json::json!({ "gateway_message": response.message })),
        )
        .await?
        .ok_or_else(already_resolved)?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(reference = %settled.reference_number, "Payment settled");
        Ok(settled)
    }

    /// Fails the debit and credits back `amount + service_charge` with a
    /// refund entry, unless the entry is already refunded.
    async fn reverse(&self, posting: &LedgerPosting, reason: &str, external_reference: Option<&str>) -> Result<Option<LedgerPosting>> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let entry = TransactionRepository::lock_in(&mut *tx, posting.entry.id).await?;

        if entry.refund_status != RefundStatus::NotRefunded || entry.status == TransactionStatus::Success {
            tracing::warn!(reference = %entry.reference_number, "Reversal skipped; entry already settled or refunded");
            return Ok(None);
        }

        if TransactionStateMachine::can_transition(entry.status, TransactionStatus::Failed) {
            TransactionRepository::update_status_in(
                &mut *tx,
                entry.id,
                TransactionStatus::Failed,
                external_reference,
                Some(serde_json::json!({ "failure_reason": reason })),
            )
            .await?;
        }

        let draft = LedgerEntryDraft::credit(
            entry.amount + entry.service_charge,
            TransactionCategory::Refund,
            format!("Reversal of {}", entry.reference_number),
        )
        .with_metadata(serde_json::json!({
            "original_transaction_id": entry.id,
            "original_reference": entry.reference_number,
            "reason": reason,
        }));
        let refund = lock_and_post_in(&mut *tx, entry.wallet_id, draft).await?;
        TransactionRepository::set_refund_status_in(&mut *tx, entry.id, RefundStatus::Refunded).await?;
        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_refund("reversed");
        tracing::warn!(
            reference = %entry.reference_number,
            refunded = %refund.entry.amount,
            reason = reason,
            "Payment reversed"
        );
        Ok(Some(refund))
    }
}

/// Recipient account number with only the last four digits visible.
fn masked_account(recipient: &serde_json::Value) -> String {
    recipient
        .get("account")
        .and_then(|v| v.as_str())
        .map(mask_account)
        .unwrap_or_else(|| "-".to_string())
}
