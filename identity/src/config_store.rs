use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use blake3::Hasher as Blake3;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{IdentityError, IdentityResult};
use crate::storage::IdentityPaths;

const CONFIG_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    pub primary_endpoint: String,
    pub failover_endpoints: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            primary_endpoint: "https://ledger.ubt.network".to_string(),
            failover_endpoints: vec!["https://ledger-backup.ubt.network".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub auto_lock_minutes: u32,
    pub max_failed_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_lock_minutes: 15,
            max_failed_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Acceptable clock-skew window for transaction timestamps, in seconds.
    pub clock_skew_secs: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityConfig {
    pub ledger: LedgerConfig,
    pub session: SessionConfig,
    pub verify: VerifyConfig,
    pub environment: String,
    pub last_updated: DateTime<Utc>,
    pub version: u16,
}

impl IdentityConfig {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            ledger: LedgerConfig::default(),
            session: SessionConfig::default(),
            verify: VerifyConfig::default(),
            environment: environment.into(),
            last_updated: Utc::now(),
            version: CONFIG_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u16,
    checksum: [u8; 32],
    payload: IdentityConfig,
    modified_at_unix: i64,
}

/// Handles persistence of identity configuration with integrity checks.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_paths(paths: &IdentityPaths) -> Self {
        Self {
            path: paths.config_file().to_path_buf(),
        }
    }

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load_or_default(&self, environment: impl Into<String>) -> IdentityResult<IdentityConfig> {
        if !self.path.exists() {
            let config = IdentityConfig::new(environment);
            self.save(&config)?;
            return Ok(config);
        }

        let bytes = fs::read(&self.path)?;
        let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != CONFIG_VERSION {
            return Err(IdentityError::ValidationError(format!(
                "Unsupported config version {}",
                envelope.version
            )));
        }

        let checksum = checksum(&envelope.payload);
        if checksum != envelope.checksum {
            return Err(IdentityError::ValidationError(
                "Config integrity verification failed".to_string(),
            ));
        }

        Ok(envelope.payload)
    }

    pub fn save(&self, config: &IdentityConfig) -> IdentityResult<()> {
        let mut payload = config.clone();
        payload.touch();

        let envelope = ConfigEnvelope {
            version: CONFIG_VERSION,
            checksum: checksum(&payload),
            modified_at_unix: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_err(|e| IdentityError::StorageError(e.to_string()))?
                .as_secs() as i64,
            payload,
        };

        let serialized = serde_json::to_vec_pretty(&envelope)?;
        let tmp_path = self.path.with_extension("new");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&serialized)?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }

    pub fn update<F>(
        &self,
        environment: impl Into<String>,
        updater: F,
    ) -> IdentityResult<IdentityConfig>
    where
        F: FnOnce(&mut IdentityConfig) -> IdentityResult<()>,
    {
        let mut config = self.load_or_default(environment)?;
        updater(&mut config)?;
        config.touch();
        self.save(&config)?;
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn checksum(config: &IdentityConfig) -> [u8; 32] {
    let mut hasher = Blake3::new();
    let encoded = serde_json::to_vec(config).expect("config serialization must succeed");
    hasher.update(&encoded);
    let mut output = [0u8; 32];
    output.copy_from_slice(hasher.finalize().as_bytes());
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load_config_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("identity.config");
        let store = ConfigStore::new(&path);

        let mut config = IdentityConfig::new("development");
        config.ledger.primary_endpoint = "http://localhost:8545".into();
        config.verify.clock_skew_secs = 120;
        store.save(&config).unwrap();

        let loaded = store.load_or_default("development").unwrap();
        assert_eq!(loaded.ledger.primary_endpoint, "http://localhost:8545");
        assert_eq!(loaded.verify.clock_skew_secs, 120);
    }

    #[test]
    fn missing_config_gets_defaults() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("identity.config"));

        let config = store.load_or_default("test").unwrap();
        assert_eq!(config.session.auto_lock_minutes, 15);
        assert_eq!(config.session.max_failed_attempts, 5);
        assert_eq!(config.verify.clock_skew_secs, 300);
        assert!(store.path().exists());
    }

    #[test]
    fn tampered_config_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("identity.config");
        let store = ConfigStore::new(&path);
        store.save(&IdentityConfig::new("test")).unwrap();

        let mut envelope: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        envelope["payload"]["session"]["max_failed_attempts"] = serde_json::json!(1000);
        fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

        let result = store.load_or_default("test");
        assert!(matches!(result, Err(IdentityError::ValidationError(_))));
    }
}
