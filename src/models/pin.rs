//! Transaction PIN policy and hashing.

use crate::error::{AppError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

pub const PIN_LENGTH: usize = 4;

/// Patterns rejected on top of the sequential/repeated rules.
const COMMON_PINS: &[&str] = &[
    "1212", "1122", "1313", "2121", "1010", "2020", "0101", "1100", "2580", "0852", "6969",
    "1004", "2000", "7890", "0987",
];

/// Checks the PIN against the format policy. Returns a specific reason on failure.
pub fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidPin(format!(
            "PIN must be exactly {} numeric digits",
            PIN_LENGTH
        )));
    }

    let digits: Vec<i8> = pin.bytes().map(|b| (b - b'0') as i8).collect();

    if digits.iter().all(|d| *d == digits[0]) {
        return Err(AppError::InvalidPin(
            "PIN cannot consist of a single repeated digit".to_string(),
        ));
    }

    let ascending = digits.windows(2).all(|w| w[1] - w[0] == 1);
    let descending = digits.windows(2).all(|w| w[0] - w[1] == 1);
    if ascending || descending {
        return Err(AppError::InvalidPin(
            "PIN cannot be a sequential run of digits".to_string(),
        ));
    }

    if COMMON_PINS.contains(&pin) {
        return Err(AppError::InvalidPin("PIN is too common".to_string()));
    }

    Ok(())
}

/// Validates and hashes a PIN with a fresh random salt (Argon2id, PHC string).
pub fn hash_pin(pin: &str) -> Result<String> {
    validate_pin(pin)?;

    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode PIN salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash PIN: {}", e)))?;

    Ok(hash.to_string())
}

/// Compares a candidate PIN with a stored hash. Never errors; a malformed
/// hash simply fails verification.
pub fn verify_pin_hash(pin: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
