use super::ledger::post_in;
use crate::config::CommissionSettings;
use crate::error::{AppError, Result};
use crate::models::commission::allocate;
use crate::models::{
    CommissionTransaction, LedgerEntryDraft, Recipient, ResolvedVia, Role, TransactionCategory,
    TransactionStatus, UplineChain, Wallet, MAX_HIERARCHY_DEPTH,
};
use crate::observability::get_metrics;
use crate::repositories::{
    CommissionRepository, TransactionRepository, UserRepository, WalletRepository,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// Result of a distribution request. Skips are soft failures: the
/// originating payment stays successful.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DistributionOutcome {
    Distributed {
        total_commission: Decimal,
        records: Vec<CommissionTransaction>,
    },
    Skipped {
        reason: String,
    },
    /// Nothing was written. `distribute` may be called again for the same
    /// origin; a retryable failure is expected to succeed on a later call.
    Failed {
        reason: String,
        retryable: bool,
    },
}

impl DistributionOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        get_metrics().record_commission_skipped(&reason);
        DistributionOutcome::Skipped { reason }
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self, DistributionOutcome::Distributed { .. })
    }

    pub fn records(&self) -> &[CommissionTransaction] {
        match self {
            DistributionOutcome::Distributed { records, .. } => records,
            DistributionOutcome::Skipped { .. } | DistributionOutcome::Failed { .. } => &[],
        }
    }
}

/// Splits the commission of one successful transaction across the
/// originator's hierarchy and the platform superadmin.
pub struct CommissionEngine {
    pool: PgPool,
    user_repo: UserRepository,
    wallet_repo: WalletRepository,
    transaction_repo: TransactionRepository,
    commission_repo: CommissionRepository,
    superadmin: Option<Uuid>,
    fallback_to_any_active_user: bool,
}

impl CommissionEngine {
    /// Resolves the superadmin once: the oldest active one.
    pub async fn initialize(pool: PgPool, settings: &CommissionSettings) -> Result<Self> {
        let superadmin = UserRepository::new(pool.clone())
            .find_first_active_by_role(Role::Superadmin)
            .await?
            .map(|u| u.id);

        match superadmin {
            Some(id) => tracing::info!(superadmin = %id, "Commission engine initialized"),
            None => tracing::warn!("No active superadmin; residual commission will not be paid"),
        }

        Ok(Self::with_superadmin(pool, superadmin, settings))
    }

    pub fn with_superadmin(pool: PgPool, superadmin: Option<Uuid>, settings: &CommissionSettings) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            wallet_repo: WalletRepository::new(pool.clone()),
            transaction_repo: TransactionRepository::new(pool.clone()),
            commission_repo: CommissionRepository::new(pool.clone()),
            pool,
            superadmin,
            fallback_to_any_active_user: settings.fallback_to_any_active_user,
        }
    }

    pub fn superadmin(&self) -> Option<Uuid> {
        self.superadmin
    }

    /// Payees for a distribution originating at `user_id`, one per role.
    pub async fn resolve_recipients(&self, user_id: Uuid) -> Result<Vec<Recipient>> {
        let (origin, ancestors) = self.user_repo.load_ancestors(user_id, MAX_HIERARCHY_DEPTH).await?;
        let resolution = UplineChain::new(origin, ancestors).resolve_commission_roles();
        let mut recipients = resolution.recipients;

        for role in resolution.missing {
            if !self.fallback_to_any_active_user {
                tracing::warn!(user_id = %user_id, role = %role, "No upline for role; share unpaid");
                continue;
            }
            match self.user_repo.find_first_active_by_role(role).await? {
                Some(user) => {
                    tracing::warn!(
                        user_id = %user_id,
                        role = %role,
                        payee = %user.id,
                        "No upline for role; paying fallback user"
                    );
                    get_metrics().record_commission_fallback(role.as_str());
                    recipients.push(Recipient {
                        user_id: user.id,
                        role,
                        resolved_via: ResolvedVia::Fallback,
                    });
                }
                None => tracing::warn!(role = %role, "No active user holds role; share unpaid"),
            }
        }

        if let Some(superadmin) = self.superadmin {
            recipients.push(Recipient {
                user_id: superadmin,
                role: Role::Superadmin,
                resolved_via: ResolvedVia::Singleton,
            });
        }

        Ok(recipients)
    }

    /// Credits every payee and records one commission row each, all in one
    /// transaction. A second call for the same originating entry is skipped.
    #[tracing::instrument(skip(self))]
    pub async fn distribute(
        &self,
        originating_transaction_id: Uuid,
        retailer_user_id: Uuid,
        service_key: &str,
    ) -> Result<DistributionOutcome> {
        let origin = self
            .transaction_repo
            .find_by_id(originating_transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction '{}' not found", originating_transaction_id))
            })?;
        if origin.status != TransactionStatus::Success {
            return Ok(DistributionOutcome::skipped("originating transaction not successful"));
        }
        let origin_wallet = self
            .wallet_repo
            .find_by_id(origin.wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet '{}' not found", origin.wallet_id)))?;
        if origin_wallet.user_id != retailer_user_id {
            return Err(AppError::Validation(format!(
                "Transaction {} was not made by user '{}'",
                origin.reference_number, retailer_user_id
            )));
        }

        let plan = match self.commission_repo.find_active_plan_for_user(retailer_user_id).await? {
            Some(plan) => plan,
            None => return Ok(DistributionOutcome::skipped("no commission plan assigned")),
        };
        let config = match self
            .commission_repo
            .find_service_commission(service_key, plan.plan_id)
            .await?
        {
            Some(config) => config,
            None => return Ok(DistributionOutcome::skipped("no commission configuration")),
        };

        let total = config.total_commission(origin.amount);
        if total <= Decimal::ZERO {
            return Ok(DistributionOutcome::skipped("zero commission"));
        }

        let recipients = self.resolve_recipients(retailer_user_id).await?;
        let allocations = allocate(total, &config.split(), &recipients);
        if allocations.is_empty() {
            return Ok(DistributionOutcome::skipped("no payable recipients"));
        }

        let mut wallet_ids = HashMap::new();
        for allocation in &allocations {
            let user_id = allocation.recipient.user_id;
            if wallet_ids.contains_key(&user_id) {
                continue;
            }
            let wallet = self
                .wallet_repo
                .find_by_user_id(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Wallet for user '{}' not found", user_id)))?;
            wallet_ids.insert(user_id, wallet.id);
        }

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // Serializes concurrent distributions for the same origin. The status
        // read above may be stale by now.
        let origin = TransactionRepository::lock_in(&mut *tx, origin.id).await?;
        if origin.status != TransactionStatus::Success {
            return Ok(DistributionOutcome::skipped("originating transaction not successful"));
        }
        if CommissionRepository::exists_for_origin_in(&mut *tx, origin.id).await? {
            return Ok(DistributionOutcome::skipped("already distributed"));
        }

        let ids: Vec<Uuid> = wallet_ids.values().copied().collect();
        let mut wallets: HashMap<Uuid, Wallet> = WalletRepository::lock_many_in(&mut *tx, &ids)
            .await?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        let mut records = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            let wallet_id = wallet_ids[&allocation.recipient.user_id];
            let wallet = wallets
                .get(&wallet_id)
                .ok_or_else(|| AppError::NotFound(format!("Wallet '{}' not found", wallet_id)))?;

            let draft = LedgerEntryDraft::credit(
                allocation.amount,
                TransactionCategory::Commission,
                format!("{} commission for {}", allocation.recipient.role, service_key),
            )
            .with_metadata(serde_json::json!({
                "originating_transaction_id": origin.id,
                "originating_reference": origin.reference_number,
                "role": allocation.recipient.role.as_str(),
                "resolved_via": allocation.recipient.resolved_via.as_str(),
            }));
            let posting = post_in(&mut *tx, wallet, draft).await?;

            let record = CommissionTransaction::new(
                origin.id,
                &posting.entry,
                allocation,
                origin.amount,
                retailer_user_id,
                service_key,
            );
            records.push(CommissionRepository::insert_transaction_in(&mut *tx, &record).await?);
            wallets.insert(wallet_id, posting.wallet);
        }

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_commission_distributed(service_key, records.len() as u64);
        tracing::info!(
            reference = %origin.reference_number,
            total = %total,
            recipients = records.len(),
            "Commission distributed"
        );

        Ok(DistributionOutcome::Distributed {
            total_commission: total,
            records,
        })
    }

    pub async fn records_for(&self, originating_transaction_id: Uuid) -> Result<Vec<CommissionTransaction>> {
        self.commission_repo.find_by_origin(originating_transaction_id).await
    }
}
