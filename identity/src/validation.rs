use crate::errors::{IdentityError, IdentityResult};
use crate::keys::ADDRESS_HEX_LEN;
use regex::Regex;
use std::collections::HashSet;

/// Maximum transfer amount accepted from user input.
pub const MAX_TRANSFER_AMOUNT: u64 = 1_000_000_000;

/// Input validation utilities for the identity core.
///
/// These checks are UX-level hygiene for values arriving from the host
/// application; the cryptographic layers below never rely on them.
pub struct InputValidator {
    // Compiled regex patterns for performance
    address_pattern: Regex,
    pin_pattern: Regex,
    name_pattern: Regex,
}

impl InputValidator {
    pub fn new() -> IdentityResult<Self> {
        let address_pattern = Regex::new(&format!("^[a-fA-F0-9]{{{}}}$", ADDRESS_HEX_LEN))
            .map_err(|e| IdentityError::ValidationError(format!("Invalid address regex: {}", e)))?;

        let pin_pattern = Regex::new(r"^\d{4,12}$")
            .map_err(|e| IdentityError::ValidationError(format!("Invalid PIN regex: {}", e)))?;

        let name_pattern = Regex::new(r"^[a-zA-Z0-9\s\-_]+$")
            .map_err(|e| IdentityError::ValidationError(format!("Invalid name regex: {}", e)))?;

        Ok(InputValidator {
            address_pattern,
            pin_pattern,
            name_pattern,
        })
    }

    /// Validate a receiver/sender address string (hex-encoded public key).
    pub fn validate_address(&self, address: &str) -> IdentityResult<()> {
        if address.is_empty() {
            return Err(IdentityError::ValidationError(
                "Address cannot be empty".to_string(),
            ));
        }

        if address.len() > 100 {
            return Err(IdentityError::ValidationError(
                "Address too long".to_string(),
            ));
        }

        if !self.address_pattern.is_match(address) {
            return Err(IdentityError::InvalidAddress(
                "Address format is invalid".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a transfer amount.
    pub fn validate_amount(&self, amount: u64) -> IdentityResult<()> {
        if amount == 0 {
            return Err(IdentityError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        if amount > MAX_TRANSFER_AMOUNT {
            return Err(IdentityError::InvalidAmount(
                "Amount too large".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate PIN format and strength.
    ///
    /// The common-PIN blacklist is application-layer policy enforced before a
    /// vault is created or re-keyed; the vault itself accepts any PIN and
    /// derives its key the same way regardless.
    pub fn validate_pin(&self, pin: &str) -> IdentityResult<()> {
        if !self.pin_pattern.is_match(pin) {
            return Err(IdentityError::ValidationError(
                "PIN must be 4 to 12 digits".to_string(),
            ));
        }

        if self.is_common_pin(pin) {
            return Err(IdentityError::ValidationError(
                "PIN is too common, please choose another".to_string(),
            ));
        }

        let first = pin.as_bytes()[0];
        if pin.bytes().all(|b| b == first) {
            return Err(IdentityError::ValidationError(
                "PIN must not repeat a single digit".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate an identity display name.
    pub fn validate_identity_name(&self, name: &str) -> IdentityResult<()> {
        if name.is_empty() {
            return Err(IdentityError::ValidationError(
                "Identity name cannot be empty".to_string(),
            ));
        }

        if name.len() > 50 {
            return Err(IdentityError::ValidationError(
                "Identity name too long".to_string(),
            ));
        }

        if !self.name_pattern.is_match(name) {
            return Err(IdentityError::ValidationError(
                "Identity name contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Check against a list of widely used PINs.
    fn is_common_pin(&self, pin: &str) -> bool {
        let common_pins: HashSet<&str> = [
            "1234", "4321", "1212", "2580", "0852", "1122", "1004", "2000", "6969", "123456",
            "654321", "121212", "112233",
        ]
        .iter()
        .cloned()
        .collect();

        common_pins.contains(pin)
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new().expect("Failed to create InputValidator")
    }
}
