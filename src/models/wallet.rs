use super::pin;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One balance per user. Created together with the user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    pub is_pin_set: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Decimal::ZERO,
            pin_hash: None,
            is_pin_set: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns false when no PIN is set.
    pub fn verify_pin(&self, pin: &str) -> bool {
        match (&self.pin_hash, self.is_pin_set) {
            (Some(hash), true) => pin::verify_pin_hash(pin, hash),
            _ => false,
        }
    }

    /// Validates, hashes and stores a new PIN in memory.
    pub fn set_pin(&mut self, pin: &str) -> Result<()> {
        let hash = pin::hash_pin(pin)?;
        self.pin_hash = Some(hash);
        self.is_pin_set = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn has_sufficient_balance(&self, amount: Decimal, charge: Decimal) -> bool {
        self.balance >= amount + charge
    }

    /// Checks the PIN for a user-initiated debit.
    pub fn authorize_debit(&self, pin: Option<&str>) -> Result<()> {
        if !self.is_pin_set {
            return Err(AppError::PinRequired);
        }
        let pin = pin.ok_or(AppError::PinRequired)?;
        if !self.verify_pin(pin) {
            return Err(AppError::InvalidPin("PIN does not match".to_string()));
        }
        Ok(())
    }

    /// Computes the movement for a debit of `amount + charge` without applying it.
    pub fn plan_debit(&self, amount: Decimal, charge: Decimal) -> Result<BalanceMovement> {
        validate_amount(amount)?;
        if charge < Decimal::ZERO {
            return Err(AppError::Validation("Charge cannot be negative".to_string()));
        }
        validate_scale(charge, "Charge")?;
        if !self.has_sufficient_balance(amount, charge) {
            return Err(AppError::InsufficientBalance {
                required: amount + charge,
                available: self.balance,
            });
        }
        Ok(BalanceMovement {
            opening_balance: self.balance,
            closing_balance: self.balance - amount - charge,
        })
    }

    /// Computes the movement for a credit without applying it.
    pub fn plan_credit(&self, amount: Decimal) -> Result<BalanceMovement> {
        validate_amount(amount)?;
        Ok(BalanceMovement {
            opening_balance: self.balance,
            closing_balance: self.balance + amount,
        })
    }
}

/// Balance before and after a single mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMovement {
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
}

impl BalanceMovement {
    pub fn delta(&self) -> Decimal {
        self.closing_balance - self.opening_balance
    }
}

/// Decimal places stored by every money column.
pub const MONEY_SCALE: u32 = 2;

/// A positive amount that the ledger can store without rounding.
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }
    validate_scale(amount, "Amount")
}

fn validate_scale(value: Decimal, label: &str) -> Result<()> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(AppError::Validation(format!(
            "{} cannot have more than {} decimal places",
            label, MONEY_SCALE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded(balance: Decimal) -> Wallet {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.balance = balance;
        wallet
    }

    #[test]
    fn test_new_wallet() {
        let wallet = Wallet::new(Uuid::new_v4());
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert!(!wallet.is_pin_set);
        assert!(wallet.pin_hash.is_none());
    }

    #[test]
    fn test_verify_pin_without_pin_set() {
        let wallet = Wallet::new(Uuid::new_v4());
        assert!(!wallet.verify_pin("7392"));
    }

    #[test]
    fn test_set_and_verify_pin() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.set_pin("7392").unwrap();
        assert!(wallet.is_pin_set);
        assert!(wallet.verify_pin("7392"));
        assert!(!wallet.verify_pin("7391"));
    }

    #[test]
    fn test_set_weak_pin_leaves_wallet_untouched() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        assert!(wallet.set_pin("1234").is_err());
        assert!(!wallet.is_pin_set);
    }

    #[test]
    fn test_authorize_debit() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        assert!(matches!(wallet.authorize_debit(Some("7392")), Err(AppError::PinRequired)));

        wallet.set_pin("7392").unwrap();
        assert!(matches!(wallet.authorize_debit(None), Err(AppError::PinRequired)));
        assert!(matches!(
            wallet.authorize_debit(Some("7391")),
            Err(AppError::InvalidPin(_))
        ));
        assert!(wallet.authorize_debit(Some("7392")).is_ok());
    }

    #[test]
    fn test_sufficient_balance_is_exact() {
        let wallet = funded(dec!(100.10));
        assert!(wallet.has_sufficient_balance(dec!(100.00), dec!(0.10)));
        assert!(!wallet.has_sufficient_balance(dec!(100.00), dec!(0.11)));
    }

    #[test]
    fn test_plan_debit() {
        let wallet = funded(dec!(1000.00));
        let movement = wallet.plan_debit(dec!(300), dec!(5)).unwrap();
        assert_eq!(movement.opening_balance, dec!(1000.00));
        assert_eq!(movement.closing_balance, dec!(695.00));
        assert_eq!(movement.delta(), dec!(-305));
    }

    #[test]
    fn test_plan_debit_insufficient() {
        let wallet = funded(dec!(50.00));
        let result = wallet.plan_debit(dec!(100), Decimal::ZERO);
        assert!(matches!(
            result,
            Err(AppError::InsufficientBalance { required, available })
                if required == dec!(100) && available == dec!(50.00)
        ));
    }

    #[test]
    fn test_plan_rejects_non_positive_amounts() {
        let wallet = funded(dec!(50.00));
        assert!(wallet.plan_debit(Decimal::ZERO, Decimal::ZERO).is_err());
        assert!(wallet.plan_credit(dec!(-1)).is_err());
        assert!(wallet.plan_debit(dec!(10), dec!(-1)).is_err());
    }

    #[test]
    fn test_plan_rejects_sub_cent_amounts() {
        let wallet = funded(dec!(1000.00));
        assert!(matches!(wallet.plan_debit(dec!(0.005), Decimal::ZERO), Err(AppError::Validation(_))));
        assert!(matches!(wallet.plan_debit(dec!(10), dec!(0.125)), Err(AppError::Validation(_))));
        assert!(matches!(wallet.plan_credit(dec!(12.345)), Err(AppError::Validation(_))));
        // Trailing zeros are not extra precision.
        assert!(wallet.plan_debit(dec!(10.500), Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_plan_credit() {
        let wallet = funded(dec!(50.00));
        let movement = wallet.plan_credit(dec!(0.01)).unwrap();
        assert_eq!(movement.closing_balance, dec!(50.01));
    }

    #[test]
    fn test_pin_hash_not_serialized() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.set_pin("7392").unwrap();
        let json = serde_json::to_string(&wallet).unwrap();
        assert!(!json.contains("pin_hash"));
    }
}
