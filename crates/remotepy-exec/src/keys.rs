//! Credentials used to authenticate a session

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// How the session proves its identity to the host
#[derive(Clone)]
pub enum Credential {
    /// Password authentication
    Password(String),
    /// Private key file, optionally protected by a passphrase
    KeyFile {
        /// Path to the private key
        path: PathBuf,
        /// Passphrase for an encrypted key
        passphrase: Option<String>,
    },
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Credential::Password(password.into())
    }

    pub fn key_file(path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Credential::KeyFile {
            path: path.into(),
            passphrase,
        }
    }

    /// Check that a key file credential is usable before connecting
    ///
    /// # Errors
    /// Returns `KeyError` if the key file is missing or readable by others
    pub fn validate(&self) -> Result<(), KeyError> {
        match self {
            Credential::Password(_) => Ok(()),
            Credential::KeyFile { path, .. } => validate_key_permissions(path),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::KeyFile { path, .. } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(unix)]
fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => KeyError::NotFound(path.display().to_string()),
        _ => KeyError::Io(e),
    })?;

    // group and other bits must be clear
    let mode = metadata.permissions().mode();
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    debug!(path = %path.display(), "key file permissions ok");
    Ok(())
}

#[cfg(not(unix))]
fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    if !path.is_file() {
        return Err(KeyError::NotFound(path.display().to_string()));
    }
    Ok(())
}
