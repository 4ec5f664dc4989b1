//! Error types for remotepy-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a remote host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Operation attempted outside an open session
    #[error("not connected")]
    NotConnected,

    /// Remote command exited with a nonzero status
    #[error("remote command `{command}` exited with status {status}")]
    CommandFailed {
        /// Invocation string sent to the host
        command: String,
        /// Exit status code (-1 when the host reported none)
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Local source of a transfer is missing or has the wrong kind
    #[error("local path not found: {0}")]
    LocalPathMissing(String),

    /// Remote directory already exists
    #[error("remote path already exists: {0}")]
    RemoteCollision(String),

    /// File channel operation failed
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// I/O error on the channel
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Whether the session could not be established
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::SshKeyError(_)
        )
    }

    /// Whether the error came from staging files on the host
    #[must_use]
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            ExecError::LocalPathMissing(_)
                | ExecError::RemoteCollision(_)
                | ExecError::TransferFailed(_)
        )
    }
}
