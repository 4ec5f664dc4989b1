//! Transfer engine: stages local files and directory trees on the host
//!
//! One engine wraps one open [`FileChannel`] for the duration of a single
//! top-level transfer. Directory mirroring never merges into an existing
//! remote directory, and a failure part way through leaves whatever was
//! already copied in place.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::traits::FileChannel;

type TransferFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ExecError>> + Send + 'a>>;

/// Join a remote POSIX path and a child name
#[must_use]
pub fn remote_join(base: &str, name: &str) -> String {
    if base.is_empty() {
        return name.to_string();
    }
    let base = base.trim_end_matches('/');
    format!("{base}/{name}")
}

/// Recursive copier bound to one file channel
pub struct TransferEngine<'a> {
    channel: &'a dyn FileChannel,
}

impl<'a> TransferEngine<'a> {
    pub fn new(channel: &'a dyn FileChannel) -> Self {
        Self { channel }
    }

    /// Copy a single regular file into `remote_dir` under its own name
    ///
    /// Returns the remote path of the copy.
    ///
    /// # Errors
    /// `LocalPathMissing` if `local_file` is not a regular file,
    /// `TransferFailed` if the host rejects the write
    #[instrument(skip(self), fields(local = %local_file.display()))]
    pub async fn copy_file(&self, local_file: &Path, remote_dir: &str) -> Result<String, ExecError> {
        let metadata = tokio::fs::metadata(local_file)
            .await
            .map_err(|_| ExecError::LocalPathMissing(local_file.display().to_string()))?;
        if !metadata.is_file() {
            return Err(ExecError::LocalPathMissing(local_file.display().to_string()));
        }

        let target = remote_join(remote_dir, &entry_name(local_file)?);
        self.channel.put(local_file, &target).await?;
        info!(remote = %target, "copied file");
        Ok(target)
    }

    /// Mirror `local_dir` to `remote_dir/<local_dir name>`
    ///
    /// Returns the remote root of the mirrored tree.
    ///
    /// # Errors
    /// `RemoteCollision` if the remote root already exists (nothing is
    /// copied in that case), `LocalPathMissing` if `local_dir` is not a
    /// directory, any channel error from the copy itself
    #[instrument(skip(self), fields(local = %local_dir.display()))]
    pub async fn mirror(&self, local_dir: &Path, remote_dir: &str) -> Result<String, ExecError> {
        let local_dir = resolve_dir(local_dir).await?;
        let target = remote_join(remote_dir, &entry_name(&local_dir)?);

        if self.channel.exists(&target).await? {
            return Err(ExecError::RemoteCollision(target));
        }

        let canonical = canonical_dir(&local_dir).await?;
        let root = self
            .mirror_into(&local_dir, remote_dir, vec![canonical])
            .await?;
        info!(remote = %root, "mirrored directory");
        Ok(root)
    }

    /// `ancestors` holds the canonical form of every directory on the path
    /// from the mirrored root down to `local_dir`
    fn mirror_into<'b>(
        &'b self,
        local_dir: &'b Path,
        remote_dir: &'b str,
        ancestors: Vec<PathBuf>,
    ) -> TransferFuture<'b> {
        Box::pin(async move {
            let target = remote_join(remote_dir, &entry_name(local_dir)?);
            self.channel.mkdir(&target).await?;
            debug!(remote = %target, "created remote directory");

            for path in sorted_entries(local_dir).await? {
                // follows symlinks, so a link is copied as what it points to
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .map_err(|_| ExecError::LocalPathMissing(path.display().to_string()))?;

                if metadata.is_file() {
                    let remote_file = remote_join(&target, &entry_name(&path)?);
                    self.channel.put(&path, &remote_file).await?;
                    debug!(remote = %remote_file, "copied file");
                } else if metadata.is_dir() {
                    let canonical = canonical_dir(&path).await?;
                    if ancestors.contains(&canonical) {
                        warn!(path = %path.display(), "skipping symlink back into the tree being copied");
                        continue;
                    }
                    let mut nested = ancestors.clone();
                    nested.push(canonical);
                    self.mirror_into(&path, &target, nested).await?;
                } else {
                    warn!(path = %path.display(), "skipping entry that is neither file nor directory");
                }
            }

            Ok(target)
        })
    }
}

async fn resolve_dir(local_dir: &Path) -> Result<PathBuf, ExecError> {
    let missing = || ExecError::LocalPathMissing(local_dir.display().to_string());

    let metadata = tokio::fs::metadata(local_dir).await.map_err(|_| missing())?;
    if !metadata.is_dir() {
        return Err(missing());
    }

    // `.` and `..` have no name of their own
    if local_dir.file_name().is_none() {
        return tokio::fs::canonicalize(local_dir).await.map_err(|_| missing());
    }
    Ok(local_dir.to_path_buf())
}

async fn canonical_dir(local_dir: &Path) -> Result<PathBuf, ExecError> {
    tokio::fs::canonicalize(local_dir)
        .await
        .map_err(|_| ExecError::LocalPathMissing(local_dir.display().to_string()))
}

async fn sorted_entries(local_dir: &Path) -> Result<Vec<PathBuf>, ExecError> {
    let mut reader = tokio::fs::read_dir(local_dir)
        .await
        .map_err(|e| ExecError::IoError(format!("{}: {e}", local_dir.display())))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| ExecError::IoError(e.to_string()))?
    {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn entry_name(path: &Path) -> Result<String, ExecError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ExecError::LocalPathMissing(path.display().to_string()))
}
