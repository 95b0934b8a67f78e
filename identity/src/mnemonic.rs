//! Recovery phrase handling: BIP-39 generation, validation, and seed stretching.
//!
//! The mnemonic is the root of the identity. Everything else (signing keys,
//! public address) is re-derived from it on demand and never persisted in
//! plaintext outside an unlocked session.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::errors::{IdentityError, IdentityResult};

/// Seed length produced by BIP-39 stretching (PBKDF2-HMAC-SHA512).
pub const SEED_LEN: usize = 64;

/// Word counts accepted for recovery phrases (128..=256 bits of entropy).
pub const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Generate a new recovery phrase with the requested word count.
///
/// Entropy is drawn from the OS RNG; the only failure mode is RNG
/// unavailability, which is surfaced rather than silently degraded.
pub fn generate(word_count: usize) -> IdentityResult<String> {
    let entropy_bits = match word_count {
        12 => 128,
        15 => 160,
        18 => 192,
        21 => 224,
        24 => 256,
        _ => {
            return Err(IdentityError::ValidationError(
                "Invalid word count: must be 12, 15, 18, 21, or 24".to_string(),
            ))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_bits / 8]);
    OsRng
        .try_fill_bytes(entropy.as_mut())
        .map_err(|e| IdentityError::CryptoError(format!("Failed to gather entropy: {}", e)))?;

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| IdentityError::CryptoError(format!("Failed to encode mnemonic: {}", e)))?;

    Ok(mnemonic.to_string())
}

/// Validate a recovery phrase and return its raw entropy.
///
/// Rejects unknown words, wrong word counts, and checksum mismatches outright.
/// There is no partial acceptance or repair.
pub fn validate(phrase: &str) -> IdentityResult<Vec<u8>> {
    let mnemonic = parse(phrase)?;
    Ok(mnemonic.to_entropy())
}

/// Stretch a recovery phrase (plus optional passphrase) into a 64-byte seed.
///
/// Deterministic and side-effect free: the same phrase and passphrase always
/// produce the same seed, which recovery correctness depends on.
pub fn to_seed(phrase: &str, passphrase: &str) -> IdentityResult<Zeroizing<[u8; SEED_LEN]>> {
    let mnemonic = parse(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

fn parse(phrase: &str) -> IdentityResult<Mnemonic> {
    let word_count = phrase.split_whitespace().count();
    if !VALID_WORD_COUNTS.contains(&word_count) {
        return Err(IdentityError::InvalidMnemonic(format!(
            "Unexpected word count: {}",
            word_count
        )));
    }

    Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| IdentityError::InvalidMnemonic(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Standard 12-word test vector: valid checksum, known seed.
    const VECTOR_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const VECTOR_SEED_PREFIX: &str =
        "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1";

    #[test]
    fn generate_produces_requested_word_count() {
        for count in VALID_WORD_COUNTS {
            let phrase = generate(count).unwrap();
            assert_eq!(phrase.split_whitespace().count(), count);
            assert!(validate(&phrase).is_ok());
        }
    }

    #[test]
    fn generate_rejects_invalid_word_count() {
        let err = generate(13).unwrap_err();
        assert!(matches!(err, IdentityError::ValidationError(_)));
    }

    #[test]
    fn validate_rejects_unknown_word() {
        let phrase = VECTOR_PHRASE.replace("about", "zzzzzz");
        let err = validate(&phrase).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidMnemonic(_)));
    }

    #[test]
    fn validate_rejects_checksum_mismatch() {
        // Substituting a valid word list word breaks the checksum.
        let phrase = VECTOR_PHRASE.replace("about", "abandon");
        let err = validate(&phrase).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidMnemonic(_)));
    }

    #[test]
    fn validate_rejects_wrong_word_count() {
        let err = validate("abandon abandon abandon").unwrap_err();
        assert!(matches!(err, IdentityError::InvalidMnemonic(_)));
    }

    #[test]
    fn single_word_mutations_are_rejected() {
        // A 24-word phrase carries an 8-bit checksum, so a single-word
        // substitution slips through with probability 1/256. Over 100 fixed
        // mutations the expected number of accidental passes is well under 1;
        // allow a small margin rather than asserting zero.
        let base = generate(24).unwrap();
        let original: Vec<String> = base
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();

        let mut accepted = 0usize;
        for replacement in Language::English.word_list().iter().take(100) {
            if original[3] == *replacement {
                continue;
            }
            let mut words = original.clone();
            words[3] = replacement.to_string();
            if validate(&words.join(" ")).is_ok() {
                accepted += 1;
            }
        }
        assert!(accepted <= 3, "too many mutations accepted: {}", accepted);
    }

    #[test]
    fn to_seed_matches_reference_vector() {
        let seed = to_seed(VECTOR_PHRASE, "").unwrap();
        assert_eq!(hex::encode(&seed[..32]), VECTOR_SEED_PREFIX);
    }

    #[test]
    fn to_seed_is_deterministic_and_passphrase_sensitive() {
        let a = to_seed(VECTOR_PHRASE, "").unwrap();
        let b = to_seed(VECTOR_PHRASE, "").unwrap();
        let c = to_seed(VECTOR_PHRASE, "extra").unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn entropy_round_trips_through_words() {
        let phrase = generate(24).unwrap();
        let entropy = validate(&phrase).unwrap();
        let rebuilt = bip39::Mnemonic::from_entropy(&entropy).unwrap();
        assert_eq!(rebuilt.to_string(), phrase);
    }
}
