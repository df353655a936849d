use crate::error::{AppError, Result};
use crate::models::hierarchy::would_create_cycle;
use crate::models::{Role, UplineChain, User, Wallet, MAX_HIERARCHY_DEPTH};
use crate::repositories::{UserRepository, WalletRepository};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::VecDeque;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OnboardUserRequest {
    #[validate(length(min = 3, max = 150, message = "Username must be between 3 and 150 characters"))]
    pub username: String,
    pub role: Role,
    /// `None` only when bootstrapping the root superadmin.
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardedUser {
    pub user: User,
    pub wallet: Wallet,
}

/// Reseller hierarchy: onboarding, parent changes and upline/downline queries.
pub struct HierarchyService {
    pool: PgPool,
    user_repo: UserRepository,
}

impl HierarchyService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            pool,
        }
    }

    /// Creates the user and an empty wallet in one transaction.
    pub async fn onboard_user(&self, request: OnboardUserRequest) -> Result<OnboardedUser> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        match request.created_by {
            None if request.role != Role::Superadmin => {
                return Err(AppError::Validation(format!(
                    "A {} must be onboarded by an existing user",
                    request.role
                )));
            }
            None => {}
            Some(creator_id) => {
                let creator = self.get_user(creator_id).await?;
                if !creator.is_active {
                    return Err(AppError::PermissionDenied(format!(
                        "User '{}' is inactive",
                        creator.username
                    )));
                }
                if !creator.role.can_create(request.role) {
                    return Err(AppError::PermissionDenied(format!(
                        "A {} cannot onboard a {}",
                        creator.role, request.role
                    )));
                }
            }
        }

        if self.user_repo.exists_by_username(&request.username).await? {
            return Err(AppError::Validation(format!(
                "Username '{}' is already taken",
                request.username
            )));
        }

        let user = User::new(request.username, request.role, request.created_by);
        let wallet = Wallet::new(user.id);

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let user = UserRepository::create_in(&mut *tx, &user).await?;
        let wallet = WalletRepository::create_in(&mut *tx, &wallet).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(user_id = %user.id, role = %user.role, created_by = ?user.created_by, "User onboarded");
        Ok(OnboardedUser { user, wallet })
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))
    }

    pub async fn upline(&self, user_id: Uuid) -> Result<UplineChain> {
        let (origin, ancestors) = self.user_repo.load_ancestors(user_id, MAX_HIERARCHY_DEPTH).await?;
        Ok(UplineChain::new(origin, ancestors))
    }

    /// Nearest ancestor of `user_id` holding `target_role`.
    pub async fn resolve_upline(&self, user_id: Uuid, target_role: Role) -> Result<Option<Uuid>> {
        let chain = self.upline(user_id).await?;
        Ok(chain.nearest(target_role).map(|u| u.id))
    }

    /// Every user below `user_id`, breadth first.
    pub async fn downline(&self, user_id: Uuid) -> Result<Vec<User>> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([(user_id, 0usize)]);

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= MAX_HIERARCHY_DEPTH {
                continue;
            }
            for child in self.user_repo.find_children(id).await? {
                queue.push_back((child.id, depth + 1));
                result.push(child);
            }
        }

        Ok(result)
    }

    /// Moves `user_id` under `new_parent_id`, rejecting any change that would
    /// put the user above itself.
    pub async fn reassign_parent(&self, user_id: Uuid, new_parent_id: Uuid) -> Result<User> {
        let user = self.get_user(user_id).await?;

        // The chain is read under the lock so two concurrent moves cannot
        // each pass the cycle check against the other's old parent.
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        UserRepository::lock_hierarchy_in(&mut *tx).await?;
        let (parent, ancestors) = UserRepository::load_ancestors_in(&mut *tx, new_parent_id, MAX_HIERARCHY_DEPTH).await?;

        if !parent.role.can_create(user.role) {
            return Err(AppError::PermissionDenied(format!(
                "A {} cannot be placed under a {}",
                user.role, parent.role
            )));
        }

        let mut chain_ids = vec![parent.id];
        chain_ids.extend(ancestors.iter().map(|u| u.id));
        if would_create_cycle(user.id, &chain_ids) {
            return Err(AppError::Validation(format!(
                "Placing '{}' under '{}' would create a cycle",
                user.username, parent.username
            )));
        }

        let updated = UserRepository::update_parent_in(&mut *tx, user.id, Some(parent.id)).await?;
        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(user_id = %user.id, new_parent = %parent.id, "Hierarchy parent reassigned");
        Ok(updated)
    }

    pub async fn deactivate(&self, user_id: Uuid) -> Result<User> {
        self.user_repo
            .set_active(user_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))
    }
}
