use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{WalletError, WalletResult};

/// Filesystem layout of the encrypted wallet store.
#[derive(Debug, Clone)]
pub struct WalletPaths {
    /// Root directory for wallet data.
    root_dir: PathBuf,
    /// Encrypted key/value store.
    store_file: PathBuf,
}

impl WalletPaths {
    pub const DEFAULT_STORE_FILENAME: &'static str = "secure_store.vault";

    pub fn new(root: impl AsRef<Path>) -> WalletResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(WalletError::StorageError(
                "Wallet root directory cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            store_file: root_dir.join(Self::DEFAULT_STORE_FILENAME),
            root_dir,
        })
    }

    /// Per-app directory under a platform data dir, e.g. `<base>/<bundle id>`.
    pub fn for_app(base: impl AsRef<Path>, app_identity: &str) -> WalletResult<Self> {
        let sanitized: String = app_identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
            return Err(WalletError::StorageError(format!(
                "Invalid app identity '{}'",
                app_identity
            )));
        }
        Self::new(base.as_ref().join(sanitized))
    }

    pub fn ensure_directories(&self) -> WalletResult<()> {
        fs::create_dir_all(&self.root_dir)?;
        Ok(())
    }

    pub fn store_file(&self) -> &Path {
        &self.store_file
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Temporary sibling used for atomic replacement of the store file.
    pub fn staging_file(&self) -> PathBuf {
        self.store_file.with_extension("new")
    }
}
