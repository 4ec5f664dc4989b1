//! Transport capability traits
//!
//! A [`Transport`] opens authenticated connections; a [`Connection`] runs
//! commands and hands out [`FileChannel`]s for staging files. The SSH
//! implementation lives in [`crate::ssh`]; tests substitute in-memory fakes.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{ConnectionInfo, ExecOutput};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish and authenticate a connection
    async fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn Connection>, ExecError>;

    fn transport_type(&self) -> &'static str;
}

#[async_trait]
pub trait Connection: Send {
    /// Run `command` on the host
    ///
    /// Stdout bytes are written to `stdout` as they arrive. With
    /// `allocate_pty` the host merges stderr into stdout.
    async fn execute(
        &mut self,
        command: &str,
        allocate_pty: bool,
        stdout: &mut (dyn Write + Send),
    ) -> Result<ExecOutput, ExecError>;

    /// Open a file channel for one transfer
    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, ExecError>;

    /// Tear down the connection
    async fn close(&mut self) -> Result<(), ExecError>;
}

/// Remote filesystem operations used by the transfer engine
#[async_trait]
pub trait FileChannel: Send + Sync {
    async fn exists(&self, remote_path: &str) -> Result<bool, ExecError>;

    async fn mkdir(&self, remote_path: &str) -> Result<(), ExecError>;

    /// Copy a local regular file to `remote_path`
    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), ExecError>;

    async fn close(&self) -> Result<(), ExecError>;
}
