//! Core error types for remotepy-core

use remotepy_exec::ExecError;
use thiserror::Error;

/// Errors that can end a workflow
///
/// This is the domain error the command line reports with exit status 1.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Session, transfer or remote command failure
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Entry file is not a relative path inside the project
    #[error("invalid entry file {0}: expected a path relative to the project folder")]
    InvalidEntryFile(String),

    /// Remote path the shell would split or expand
    #[error("invalid remote path {0}: only letters, digits and / . _ - + = : @ , % ~ are allowed")]
    InvalidRemotePath(String),
}

impl CoreError {
    /// Whether the remote program ran and exited with a nonzero status
    #[must_use]
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, CoreError::Exec(ExecError::CommandFailed { .. }))
    }
}
