//! Session: one authenticated connection and the operations scoped to it

use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::command::RemoteCommand;
use crate::error::ExecError;
use crate::result::{CommandResult, ConnectionInfo, ExecOutput};
use crate::traits::{Connection, FileChannel, Transport};
use crate::transfer::TransferEngine;

/// A session with one remote host
///
/// The connection exists only between a successful [`Session::connect`] and
/// [`Session::close`]; every other operation fails with
/// [`ExecError::NotConnected`] outside that window.
pub struct Session {
    info: ConnectionInfo,
    transport: Arc<dyn Transport>,
    connection: Option<Box<dyn Connection>>,
    output: Box<dyn Write + Send>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("transport", &self.transport.transport_type())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a closed session writing remote output to stdout
    pub fn new(info: ConnectionInfo, transport: Arc<dyn Transport>) -> Self {
        Self {
            info,
            transport,
            connection: None,
            output: Box::new(io::stdout()),
        }
    }

    /// Send remote output to `output` instead of stdout
    #[must_use]
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect and authenticate
    ///
    /// # Errors
    /// `SshKeyError` for an unusable key file, `ConnectionFailed` or
    /// `AuthenticationFailed` from the transport
    #[instrument(skip(self), fields(host = %self.info.host))]
    pub async fn connect(&mut self) -> Result<(), ExecError> {
        if self.connection.is_some() {
            return Ok(());
        }

        self.info
            .credential
            .validate()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        info!(
            host = %self.info.host,
            port = self.info.port,
            user = %self.info.user,
            transport = self.transport.transport_type(),
            "connecting"
        );

        let connection = self.transport.connect(&self.info).await?;
        self.connection = Some(connection);

        info!(host = %self.info.host, "session open");
        Ok(())
    }

    /// Release the connection
    ///
    /// Safe to call on a session that was never opened or is already closed.
    /// Teardown errors are logged, never returned.
    #[instrument(skip(self), fields(host = %self.info.host))]
    pub async fn close(&mut self) {
        let _ = self.output.flush();

        if let Some(mut connection) = self.connection.take() {
            match connection.close().await {
                Ok(()) => info!(host = %self.info.host, "session closed"),
                Err(e) => warn!(host = %self.info.host, error = %e, "error while closing session"),
            }
        }
    }

    /// Run a command on the host
    ///
    /// In streaming mode a pseudo-terminal is allocated and stdout is relayed
    /// to the output sink line by line as it arrives. Otherwise stdout is
    /// written once the command completes. Stderr is written afterwards in
    /// both modes.
    ///
    /// # Errors
    /// `NotConnected` outside an open session, `Timeout` if the command's
    /// timeout elapses, `CommandFailed` on a nonzero exit status
    #[instrument(skip(self, cmd), fields(host = %self.info.host))]
    pub async fn execute_remote_command(
        &mut self,
        cmd: &RemoteCommand,
    ) -> Result<CommandResult, ExecError> {
        let connection = self.connection.as_mut().ok_or(ExecError::NotConnected)?;
        let output = &mut self.output;

        let invocation = cmd.invocation();
        debug!(
            command = %invocation,
            elevated = cmd.is_elevated(),
            streaming = cmd.is_streaming(),
            "executing remote command"
        );

        let start = Instant::now();
        let mut buffered = Vec::new();

        let exec_output = if cmd.is_streaming() {
            let mut sink = LineWriter::new(&mut *output);
            let result = run_bounded(connection, cmd, &invocation, &mut sink).await;
            sink.flush().map_err(|e| ExecError::IoError(e.to_string()))?;
            result?
        } else {
            match run_bounded(connection, cmd, &invocation, &mut buffered).await {
                Ok(exec_output) => exec_output,
                Err(e) => {
                    // whatever arrived before the failure still reaches the operator
                    if let Err(io) = write_output(output, &buffered, "") {
                        warn!(error = %io, "could not write partial output");
                    }
                    return Err(e);
                }
            }
        };

        write_output(output, &buffered, &exec_output.stderr)
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();
        let status = exec_output.status.map_or(-1, u32::cast_signed);

        debug!(
            command = %invocation,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        if status != 0 {
            error!(command = %invocation, status = status, "remote command failed");
            return Err(ExecError::CommandFailed {
                command: invocation,
                status,
                stderr: exec_output.stderr,
            });
        }

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&buffered).into_owned(),
            stderr: exec_output.stderr,
            duration,
        })
    }

    /// Copy a local regular file into `remote_dir` under its own name
    ///
    /// # Errors
    /// `NotConnected` outside an open session, otherwise see
    /// [`TransferEngine::copy_file`]
    #[instrument(skip(self), fields(host = %self.info.host))]
    pub async fn transfer_file(
        &mut self,
        local_file: &Path,
        remote_dir: &str,
    ) -> Result<String, ExecError> {
        let connection = self.connection.as_mut().ok_or(ExecError::NotConnected)?;
        let channel = connection.open_file_channel().await?;

        let result = TransferEngine::new(channel.as_ref())
            .copy_file(local_file, remote_dir)
            .await;
        close_channel(channel.as_ref()).await;
        result
    }

    /// Mirror a local directory to `remote_dir/<name>`
    ///
    /// # Errors
    /// `NotConnected` outside an open session, otherwise see
    /// [`TransferEngine::mirror`]
    #[instrument(skip(self), fields(host = %self.info.host))]
    pub async fn transfer_directory(
        &mut self,
        local_dir: &Path,
        remote_dir: &str,
    ) -> Result<String, ExecError> {
        let connection = self.connection.as_mut().ok_or(ExecError::NotConnected)?;
        let channel = connection.open_file_channel().await?;

        let result = TransferEngine::new(channel.as_ref())
            .mirror(local_dir, remote_dir)
            .await;
        close_channel(channel.as_ref()).await;
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.connection.is_some() {
            // dropping the transport handle tears the connection down
            warn!(host = %self.info.host, "session dropped without close");
        }
    }
}

async fn run_bounded(
    connection: &mut Box<dyn Connection>,
    cmd: &RemoteCommand,
    invocation: &str,
    sink: &mut (dyn Write + Send),
) -> Result<ExecOutput, ExecError> {
    let exec = connection.execute(invocation, cmd.is_streaming(), sink);
    match cmd.timeout() {
        None => exec.await,
        Some(limit) => timeout(limit, exec).await.unwrap_or_else(|_| {
            error!(command = %invocation, timeout = ?limit, "command timed out");
            Err(ExecError::Timeout { timeout: limit })
        }),
    }
}

fn write_output(output: &mut dyn Write, stdout: &[u8], stderr: &str) -> io::Result<()> {
    output.write_all(stdout)?;
    output.write_all(stderr.as_bytes())?;
    output.flush()
}

async fn close_channel(channel: &dyn FileChannel) {
    if let Err(e) = channel.close().await {
        debug!(error = %e, "file channel close failed");
    }
}
