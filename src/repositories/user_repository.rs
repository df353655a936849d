use crate::error::{AppError, Result};
use crate::models::{Role, User};
use sqlx::{PgConnection, PgPool};
use std::collections::HashSet;
use uuid::Uuid;

/// Advisory lock key guarding the `created_by` graph.
const HIERARCHY_LOCK_KEY: i64 = 0x5245_5345_4c4c;

const USER_COLUMNS: &str = "id, username, role, created_by, is_active, created_at, updated_at";

/// Repository for users and the `created_by` hierarchy.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a user inside the caller's transaction.
    pub async fn create_in(conn: &mut PgConnection, user: &User) -> Result<User> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, role, created_by, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(user.role)
        .bind(user.created_by)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        Self::find_by_id_in(&mut *conn, id).await
    }

    pub async fn find_by_id_in(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Serializes `created_by` rewrites until the caller's transaction ends.
    pub async fn lock_hierarchy_in(conn: &mut PgConnection) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(HIERARCHY_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn exists_by_username(&self, username: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::Database)?;

        Ok(exists.0)
    }

    /// Users onboarded directly by `id`.
    pub async fn find_children(&self, id: Uuid) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE created_by = $1 ORDER BY created_at, id",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Oldest active user holding `role`. Deterministic for a fixed data set.
    pub async fn find_first_active_by_role(&self, role: Role) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {} FROM users
            WHERE role = $1 AND is_active
            ORDER BY created_at, id
            LIMIT 1
            "#,
            USER_COLUMNS
        ))
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Walks `created_by` upward from `user_id`, one row per step, nearest
    /// parent first. Fails if the chain is deeper than `max_depth` or loops.
    pub async fn load_ancestors(&self, user_id: Uuid, max_depth: usize) -> Result<(User, Vec<User>)> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        Self::load_ancestors_in(&mut *conn, user_id, max_depth).await
    }

    pub async fn load_ancestors_in(
        conn: &mut PgConnection,
        user_id: Uuid,
        max_depth: usize,
    ) -> Result<(User, Vec<User>)> {
        let origin = Self::find_by_id_in(&mut *conn, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))?;

        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([origin.id]);
        let mut next = origin.created_by;

        while let Some(parent_id) = next {
            if ancestors.len() >= max_depth || !visited.insert(parent_id) {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Hierarchy above user '{}' is cyclic or deeper than {}",
                    user_id,
                    max_depth
                )));
            }
            let parent = Self::find_by_id_in(&mut *conn, parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", parent_id)))?;
            next = parent.created_by;
            ancestors.push(parent);
        }

        Ok((origin, ancestors))
    }

    pub async fn update_parent_in(
        conn: &mut PgConnection,
        id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<User> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET created_by = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(created_by)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("User '{}' not found", id)))
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
