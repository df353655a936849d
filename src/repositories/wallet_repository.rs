use crate::error::{AppError, Result};
use crate::models::Wallet;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const WALLET_COLUMNS: &str = "id, user_id, balance, pin_hash, is_pin_set, created_at, updated_at";

/// Repository for wallets. Every balance write goes through a row locked
/// with `lock_in` inside the caller's transaction.
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_in(conn: &mut PgConnection, wallet: &Wallet) -> Result<Wallet> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            INSERT INTO wallets (id, user_id, balance, pin_hash, is_pin_set, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(wallet.id)
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .bind(&wallet.pin_hash)
        .bind(wallet.is_pin_set)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE id = $1",
            WALLET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Takes an exclusive row lock held until the transaction ends.
    pub async fn lock_in(conn: &mut PgConnection, id: Uuid) -> Result<Wallet> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Wallet '{}' not found", id)))
    }

    pub async fn lock_by_user_in(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Wallet for user '{}' not found", user_id)))
    }

    /// Locks several wallets in ascending id order, whatever order they were
    /// requested in. Returns them in the requested order.
    pub async fn lock_many_in(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Wallet>> {
        let mut ordered: Vec<Uuid> = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut locked = Vec::with_capacity(ordered.len());
        for id in ordered {
            locked.push(Self::lock_in(&mut *conn, id).await?);
        }

        ids.iter()
            .map(|id| {
                locked
                    .iter()
                    .find(|w| w.id == *id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("Wallet '{}' not found", id)))
            })
            .collect()
    }

    /// Writes the new balance of a locked wallet.
    pub async fn set_balance_in(conn: &mut PgConnection, id: Uuid, balance: Decimal) -> Result<Wallet> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            UPDATE wallets SET balance = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(id)
        .bind(balance)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn set_pin_hash(&self, id: Uuid, pin_hash: &str) -> Result<Wallet> {
        let row = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            UPDATE wallets SET pin_hash = $2, is_pin_set = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(id)
        .bind(pin_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Wallet '{}' not found", id)))
    }
}
