use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::IdentityPaths;
use crate::errors::{IdentityError, IdentityResult};

const VAULT_MAGIC: &[u8; 8] = b"UBTVAULT";
const VAULT_VERSION: u16 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

const KDF_ALGORITHM: &str = "argon2id";
const CIPHER_ALGORITHM: &str = "aes-256-gcm";

/// Metadata stored alongside the encrypted mnemonic. Everything here is
/// readable without the PIN, so nothing secret belongs in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultMetadata {
    /// Human-readable identity name.
    pub identity_name: String,
    /// Timestamp when the vault was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the vault was last modified.
    pub updated_at: DateTime<Utc>,
    /// Version identifier for future migrations.
    pub schema_version: u16,
    /// Public key (hex) of the identity, for locked-state display.
    #[serde(default)]
    pub public_key_hex: Option<String>,
}

impl VaultMetadata {
    pub fn new(identity_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity_name: identity_name.into(),
            created_at: now,
            updated_at: now,
            schema_version: VAULT_VERSION,
            public_key_hex: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Secrets encrypted within the vault. The vault wraps the recovery phrase
/// only; signing keys are re-derived on each unlock and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct VaultSecrets {
    /// Recovery phrase for the identity.
    pub mnemonic_phrase: String,
}

impl VaultSecrets {
    pub fn new(mnemonic_phrase: impl Into<String>) -> Self {
        Self {
            mnemonic_phrase: mnemonic_phrase.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultRecord {
    magic: [u8; 8],
    version: u16,
    kdf: KdfParameters,
    cipher: CipherParameters,
    ciphertext: Vec<u8>,
    metadata: VaultMetadata,
}

/// KDF parameters persisted with the vault so cost settings can evolve
/// without breaking older vaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParameters {
    pub algorithm: String,
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
    pub salt: [u8; SALT_LEN],
}

impl Default for KdfParameters {
    fn default() -> Self {
        Self {
            algorithm: KDF_ALGORITHM.to_string(),
            m_cost_kib: 64 * 1024, // 64 MiB
            t_cost: 3,
            p_cost: 1,
            salt: [0u8; SALT_LEN],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CipherParameters {
    algorithm: String,
    nonce: [u8; NONCE_LEN],
}

/// Parameters required to write a vault to disk.
pub struct VaultCreateParams<'a> {
    pub pin: &'a SecretString,
    pub metadata: VaultMetadata,
    pub secrets: VaultSecrets,
}

/// Result returned after successfully unlocking a vault.
#[derive(Debug, Clone)]
pub struct VaultUnlocked {
    pub metadata: VaultMetadata,
    pub secrets: VaultSecrets,
}

/// Handles persistence and encryption of the identity vault file.
///
/// There is exactly one vault per device root; `save` replaces it wholesale
/// and callers must not interleave `save` with `unlock` on the same record.
#[derive(Debug, Clone)]
pub struct VaultManager {
    vault_path: PathBuf,
    identity_paths: Option<IdentityPaths>,
}

impl VaultManager {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            vault_path: path.as_ref().to_path_buf(),
            identity_paths: None,
        }
    }

    pub fn from_paths(paths: &IdentityPaths) -> Self {
        Self {
            vault_path: paths.vault_file().to_path_buf(),
            identity_paths: Some(paths.clone()),
        }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    /// O(1) check whether a vault exists on this device.
    pub fn has_vault(&self) -> bool {
        self.vault_path.exists()
    }

    /// Create a new encrypted vault on disk. Fails if a vault already exists.
    pub fn create(&self, params: VaultCreateParams<'_>) -> IdentityResult<()> {
        if self.has_vault() {
            return Err(IdentityError::AlreadyExists(
                self.vault_path.display().to_string(),
            ));
        }
        self.write_record(params)
    }

    /// Replace the vault with new secrets and metadata. Destructive by
    /// design: the previous identity is no longer recoverable from this
    /// device once its backups are pruned. The prior file is snapshotted to
    /// the backup directory first when paths are configured.
    pub fn save(&self, params: VaultCreateParams<'_>) -> IdentityResult<()> {
        self.snapshot_existing_vault()?;
        self.write_record(params)
    }

    /// Unlock the vault and return the decrypted secrets.
    ///
    /// Any decryption failure surfaces as the single generic
    /// `WrongPinOrCorrupt`; the caller cannot tell a wrong PIN from a
    /// tampered file, and must not try to.
    pub fn unlock(&self, pin: &SecretString) -> IdentityResult<VaultUnlocked> {
        let record = self.load()?;
        let key = derive_vault_key(pin, &record.kdf)?;
        let plaintext = open_sealed(&key, &record.cipher, &record.ciphertext)?;

        let secrets: VaultSecrets =
            serde_json::from_slice(&plaintext).map_err(|_| IdentityError::WrongPinOrCorrupt)?;
        Ok(VaultUnlocked {
            metadata: record.metadata,
            secrets,
        })
    }

    /// Read vault metadata without decrypting secrets.
    pub fn read_metadata(&self) -> IdentityResult<Option<VaultMetadata>> {
        if !self.has_vault() {
            return Ok(None);
        }

        let record = self.load()?;
        Ok(Some(record.metadata))
    }

    /// Change the PIN by re-encrypting the existing vault under a new one.
    pub fn change_pin(
        &self,
        current_pin: &SecretString,
        new_pin: &SecretString,
    ) -> IdentityResult<()> {
        let unlocked = self.unlock(current_pin)?;
        let mut metadata = unlocked.metadata.clone();
        metadata.touch();
        let params = VaultCreateParams {
            pin: new_pin,
            metadata,
            secrets: unlocked.secrets,
        };
        self.save(params)
    }

    /// Irreversibly delete the vault record and its backups.
    ///
    /// Gating behind explicit user confirmation is the caller's job.
    pub fn reset(&self) -> IdentityResult<()> {
        if self.vault_path.exists() {
            fs::remove_file(&self.vault_path)?;
        }
        if let Some(paths) = &self.identity_paths {
            paths.prune_old_backups(0)?;
        }
        log::info!("Identity vault reset");
        Ok(())
    }

    /// List available vault backups ordered by newest first.
    pub fn available_backups(&self) -> IdentityResult<Vec<PathBuf>> {
        if let Some(paths) = &self.identity_paths {
            return paths.list_backups();
        }

        Ok(Vec::new())
    }

    /// Restore the vault state from a specific backup file.
    pub fn restore_from_backup(&self, backup_path: &Path) -> IdentityResult<()> {
        let paths = self.identity_paths.as_ref().ok_or_else(|| {
            IdentityError::StorageError(
                "Vault manager configured without identity paths".to_string(),
            )
        })?;

        paths.restore_vault_from_backup(backup_path)?;
        Ok(())
    }

    fn load(&self) -> IdentityResult<VaultRecord> {
        if !self.vault_path.exists() {
            return Err(IdentityError::VaultNotFound);
        }

        let bytes = fs::read(&self.vault_path)?;
        let record: VaultRecord = serde_json::from_slice(&bytes)
            .map_err(|e| IdentityError::ValidationError(format!("Malformed vault file: {}", e)))?;

        if &record.magic != VAULT_MAGIC {
            return Err(IdentityError::ValidationError(
                "Invalid vault magic marker".to_string(),
            ));
        }

        if record.version != VAULT_VERSION {
            return Err(IdentityError::ValidationError(format!(
                "Unsupported vault version: {}",
                record.version
            )));
        }

        Ok(record)
    }

    fn write_record(&self, params: VaultCreateParams<'_>) -> IdentityResult<()> {
        // Encrypt before touching the filesystem so a KDF or serialization
        // failure leaves no temp file behind.
        let record = self.encrypt_payload(params)?;
        let serialized = serde_json::to_vec(&record)?;
        let mut file = create_atomic_file(&self.vault_path)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        finalize_atomic_file(file, &self.vault_path)?;
        Ok(())
    }

    fn encrypt_payload(&self, params: VaultCreateParams<'_>) -> IdentityResult<VaultRecord> {
        let mut rng = OsRng;
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce_bytes);

        let kdf_params = KdfParameters {
            salt,
            ..Default::default()
        };
        let cipher_params = CipherParameters {
            algorithm: CIPHER_ALGORITHM.to_string(),
            nonce: nonce_bytes,
        };

        let key = derive_vault_key(params.pin, &kdf_params)?;

        let buffer = Zeroizing::new(serde_json::to_vec(&params.secrets)?);
        let ciphertext = seal(&key, &cipher_params, &buffer)?;

        Ok(VaultRecord {
            magic: *VAULT_MAGIC,
            version: VAULT_VERSION,
            kdf: kdf_params,
            cipher: cipher_params,
            ciphertext,
            metadata: params.metadata,
        })
    }

    fn snapshot_existing_vault(&self) -> IdentityResult<()> {
        if let Some(paths) = &self.identity_paths {
            if self.has_vault() {
                let backup_path = paths.create_vault_backup()?;
                debug_assert!(
                    backup_path.exists(),
                    "backup path should exist after creation"
                );
            }
        }
        Ok(())
    }
}

/// Stretch a PIN into the 32-byte vault key using Argon2id with the
/// parameters recorded in the vault.
fn derive_vault_key(
    pin: &SecretString,
    params: &KdfParameters,
) -> IdentityResult<Zeroizing<[u8; KEY_LEN]>> {
    if params.algorithm != KDF_ALGORITHM {
        return Err(IdentityError::CryptoError(format!(
            "Unsupported KDF algorithm: {}",
            params.algorithm
        )));
    }

    let argon_params = Params::new(
        params.m_cost_kib,
        params.t_cost,
        params.p_cost,
        Some(KEY_LEN),
    )
    .map_err(|e| IdentityError::CryptoError(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new_with_secret(&[], Algorithm::Argon2id, Version::V0x13, argon_params)
        .map_err(|e| IdentityError::CryptoError(format!("Failed to init Argon2: {}", e)))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(pin.expose_secret().as_bytes(), &params.salt, key.as_mut())
        .map_err(|e| IdentityError::CryptoError(format!("KDF failed: {}", e)))?;
    Ok(key)
}

fn aead_key(key: &Zeroizing<[u8; KEY_LEN]>) -> IdentityResult<LessSafeKey> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, key.as_ref())
        .map_err(|e| IdentityError::CryptoError(format!("Invalid encryption key: {}", e)))?;
    Ok(LessSafeKey::new(unbound_key))
}

fn seal(
    key: &Zeroizing<[u8; KEY_LEN]>,
    cipher: &CipherParameters,
    plaintext: &[u8],
) -> IdentityResult<Vec<u8>> {
    let key = aead_key(key)?;
    let nonce = Nonce::assume_unique_for_key(cipher.nonce);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| IdentityError::CryptoError("Encryption failure".to_string()))?;
    Ok(in_out)
}

fn open_sealed(
    key: &Zeroizing<[u8; KEY_LEN]>,
    cipher: &CipherParameters,
    ciphertext: &[u8],
) -> IdentityResult<Zeroizing<Vec<u8>>> {
    if cipher.algorithm != CIPHER_ALGORITHM {
        return Err(IdentityError::CryptoError(format!(
            "Unsupported cipher algorithm: {}",
            cipher.algorithm
        )));
    }

    let key = aead_key(key)?;
    let nonce = Nonce::assume_unique_for_key(cipher.nonce);

    if ciphertext.len() < aead::AES_256_GCM.tag_len() {
        return Err(IdentityError::WrongPinOrCorrupt);
    }

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| IdentityError::WrongPinOrCorrupt)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

fn create_atomic_file(path: &Path) -> IdentityResult<File> {
    let dir = path
        .parent()
        .ok_or_else(|| IdentityError::StorageError("Invalid vault path".to_string()))?;
    fs::create_dir_all(dir)?;
    let tmp_path = path.with_extension("new");
    Ok(File::create(&tmp_path)?)
}

fn finalize_atomic_file(mut file: File, final_path: &Path) -> IdentityResult<()> {
    file.flush()?;
    drop(file);
    let tmp_path = final_path.with_extension("new");
    fs::rename(tmp_path, final_path)?;
    Ok(())
}
