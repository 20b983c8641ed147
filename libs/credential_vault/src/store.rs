//! File-backed vault: one sealed blob at a configured path.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use common::Credentials;
use tracing::{debug, info};

use crate::blob::{open, seal};
use crate::error::VaultError;

/// Persists the credential mapping as a single encrypted file.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    path: PathBuf,
}

impl CredentialVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Seal `credentials` under `pin` and overwrite the blob.
    ///
    /// Writes to a sibling temp file first so a crash never leaves a
    /// half-written vault behind.
    pub fn save(&self, credentials: &Credentials, pin: &str) -> Result<(), VaultError> {
        let blob = seal(credentials, pin)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!(
            "Vault saved: {} exchange(s) → {}",
            credentials.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read and decrypt the blob.
    pub fn load(&self, pin: &str) -> Result<Credentials, VaultError> {
        let blob = fs::read(&self.path)?;
        let credentials = open(&blob, pin)?;
        debug!("Vault unlocked: {} exchange(s)", credentials.len());
        Ok(credentials)
    }

    /// Like [`load`](Self::load), but a missing vault yields an empty mapping.
    pub fn load_or_default(&self, pin: &str) -> Result<Credentials, VaultError> {
        match self.load(pin) {
            Err(VaultError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("No vault at {}; starting empty", self.path.display());
                Ok(Credentials::new())
            }
            other => other,
        }
    }

    /// Delete the blob. Missing files are not an error.
    pub fn clear(&self) -> Result<(), VaultError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Vault deleted: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "vault".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
