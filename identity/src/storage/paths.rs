use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::errors::{IdentityError, IdentityResult};

/// Manages filesystem paths used by the identity core.
///
/// Everything lives under a single root directory supplied by the host
/// application. The root must map to local, non-syncing storage so the vault
/// ciphertext never rides along in cloud backups.
#[derive(Debug, Clone)]
pub struct IdentityPaths {
    /// Root directory for identity data.
    root_dir: PathBuf,
    /// Encrypted vault file path.
    vault_file: PathBuf,
    /// Directory for vault backups.
    backup_dir: PathBuf,
    /// Path to persisted identity configuration.
    config_file: PathBuf,
}

impl IdentityPaths {
    /// Default vault file name used on disk.
    pub const DEFAULT_VAULT_FILENAME: &'static str = "identity.vault";
    /// Backup file extension appended to timestamped backups.
    pub const BACKUP_EXTENSION: &'static str = "vault.bak";

    /// Create a new path manager rooted at the provided directory.
    pub fn new(root: impl AsRef<Path>) -> IdentityResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(IdentityError::StorageError(
                "Identity root directory cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            vault_file: root_dir.join(Self::DEFAULT_VAULT_FILENAME),
            backup_dir: root_dir.join("backups"),
            config_file: root_dir.join("identity.config"),
            root_dir,
        })
    }

    /// Ensure the directory structure exists, creating missing folders.
    pub fn ensure_directories(&self) -> IdentityResult<()> {
        fs::create_dir_all(&self.root_dir)?;
        fs::create_dir_all(&self.backup_dir)?;
        Ok(())
    }

    /// Absolute path to the encrypted vault file.
    pub fn vault_file(&self) -> &Path {
        &self.vault_file
    }

    /// Directory that stores timestamped backups.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Path to persisted identity configuration file.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Root directory for all identity-managed data.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Create a timestamped backup of the vault file.
    /// Returns the path to the created backup file.
    pub fn create_vault_backup(&self) -> IdentityResult<PathBuf> {
        if !self.vault_file.exists() {
            return Err(IdentityError::StorageError(
                "Vault file does not exist, cannot create backup".to_string(),
            ));
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let backup_filename = format!("identity_{}.{}", timestamp, Self::BACKUP_EXTENSION);
        let backup_path = self.backup_dir.join(backup_filename);

        fs::copy(&self.vault_file, &backup_path)?;

        // Verify the copy before trusting it as a backup.
        let original_size = fs::metadata(&self.vault_file)?.len();
        let backup_size = fs::metadata(&backup_path)?.len();
        if original_size != backup_size {
            fs::remove_file(&backup_path)?;
            return Err(IdentityError::StorageError(
                "Backup verification failed: size mismatch".to_string(),
            ));
        }

        Ok(backup_path)
    }

    /// Restore the vault from a backup file.
    /// The current vault (if any) is held aside and rolled back on failure.
    pub fn restore_vault_from_backup(&self, backup_path: impl AsRef<Path>) -> IdentityResult<()> {
        let backup_path = backup_path.as_ref();
        if !backup_path.exists() {
            return Err(IdentityError::FileNotFound(format!(
                "Backup file does not exist: {}",
                backup_path.display()
            )));
        }

        let temp_backup = if self.vault_file.exists() {
            let temp_name = format!("identity_pre_restore_{}.tmp", Utc::now().timestamp());
            let temp_path = self.backup_dir.join(temp_name);
            fs::copy(&self.vault_file, &temp_path)?;
            Some(temp_path)
        } else {
            None
        };

        match fs::copy(backup_path, &self.vault_file) {
            Ok(_) => {
                if let Some(temp_path) = temp_backup {
                    let _ = fs::remove_file(temp_path);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(temp_path) = temp_backup {
                    let _ = fs::copy(&temp_path, &self.vault_file);
                    let _ = fs::remove_file(temp_path);
                }
                Err(IdentityError::StorageError(format!(
                    "Failed to restore vault from backup: {}",
                    err
                )))
            }
        }
    }

    /// List all available backup files, sorted by timestamp (newest first).
    pub fn list_backups(&self) -> IdentityResult<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                if let Some(filename) = path.file_name().and_then(|f| f.to_str()) {
                    if filename.ends_with(Self::BACKUP_EXTENSION) {
                        backups.push(path);
                    }
                }
            }
        }

        backups.sort_by(|a, b| {
            let a_time = fs::metadata(a).and_then(|m| m.modified()).ok();
            let b_time = fs::metadata(b).and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        Ok(backups)
    }

    /// Delete old backups, keeping only the N most recent.
    pub fn prune_old_backups(&self, keep_count: usize) -> IdentityResult<usize> {
        let backups = self.list_backups()?;
        let mut deleted_count = 0;

        for backup_path in backups.iter().skip(keep_count) {
            fs::remove_file(backup_path)?;
            deleted_count += 1;
        }

        Ok(deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_test_vault(paths: &IdentityPaths, content: &[u8]) {
        paths.ensure_directories().unwrap();
        let mut file = File::create(paths.vault_file()).unwrap();
        file.write_all(content).unwrap();
    }

    #[test]
    fn paths_layout_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let paths = IdentityPaths::new(temp_dir.path()).unwrap();

        assert_eq!(
            paths.vault_file(),
            temp_dir.path().join(IdentityPaths::DEFAULT_VAULT_FILENAME)
        );
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
        assert_eq!(paths.config_file(), temp_dir.path().join("identity.config"));
    }

    #[test]
    fn empty_root_directory_rejected() {
        let result = IdentityPaths::new("");
        assert!(matches!(result, Err(IdentityError::StorageError(_))));
    }

    #[test]
    fn backup_and_restore_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let paths = IdentityPaths::new(temp_dir.path()).unwrap();

        let original_data = b"original encrypted data";
        write_test_vault(&paths, original_data);

        let backup_path = paths.create_vault_backup().unwrap();
        assert!(backup_path.starts_with(paths.backup_dir()));

        fs::write(paths.vault_file(), b"modified encrypted data").unwrap();
        paths.restore_vault_from_backup(&backup_path).unwrap();

        let restored = fs::read(paths.vault_file()).unwrap();
        assert_eq!(restored, original_data);
    }

    #[test]
    fn backup_without_vault_fails() {
        let temp_dir = TempDir::new().unwrap();
        let paths = IdentityPaths::new(temp_dir.path()).unwrap();
        paths.ensure_directories().unwrap();

        assert!(paths.create_vault_backup().is_err());
    }

    #[test]
    fn list_backups_newest_first_and_filters_strangers() {
        let temp_dir = TempDir::new().unwrap();
        let paths = IdentityPaths::new(temp_dir.path()).unwrap();
        write_test_vault(&paths, b"test");

        let backup1 = paths.create_vault_backup().unwrap();
        thread::sleep(Duration::from_millis(50));
        let backup2 = paths.create_vault_backup().unwrap();

        fs::write(paths.backup_dir().join("random.txt"), b"not a backup").unwrap();

        let backups = paths.list_backups().unwrap();
        assert_eq!(backups, vec![backup2, backup1]);
    }

    #[test]
    fn prune_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        let paths = IdentityPaths::new(temp_dir.path()).unwrap();
        write_test_vault(&paths, b"test");

        for _ in 0..4 {
            paths.create_vault_backup().unwrap();
            thread::sleep(Duration::from_millis(30));
        }

        let before = paths.list_backups().unwrap();
        let deleted = paths.prune_old_backups(2).unwrap();
        assert_eq!(deleted, 2);

        let after = paths.list_backups().unwrap();
        assert_eq!(after, before[..2].to_vec());
    }
}
