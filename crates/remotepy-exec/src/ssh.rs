//! SSH transport using the russh and russh-sftp crates

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::error::ExecError;
use crate::keys::Credential;
use crate::result::{ConnectionInfo, ExecOutput};
use crate::traits::{Connection, FileChannel, Transport};

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Unknown host keys are accepted and not persisted
        Ok(true)
    }
}

/// Opens SSH connections authenticated by password or key file
pub struct SshTransport {
    config: Arc<client::Config>,
}

impl SshTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
        }
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SshTransport {
    #[instrument(skip(self, info), fields(host = %info.host))]
    async fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn Connection>, ExecError> {
        let mut handle = client::connect(
            self.config.clone(),
            (&info.host[..], info.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let authenticated = match &info.credential {
            Credential::Password(password) => handle
                .authenticate_password(&info.user, password)
                .await
                .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
                .success(),
            Credential::KeyFile { path, passphrase } => {
                let key_pair = load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                handle
                    .authenticate_publickey(
                        &info.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
                    )
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?
                    .success()
            }
        };

        if !authenticated {
            return Err(ExecError::AuthenticationFailed(format!(
                "credentials rejected for {}@{}",
                info.user, info.host
            )));
        }

        info!(host = %info.host, "SSH connected and authenticated");

        Ok(Box::new(SshConnection {
            handle,
            host: info.host.clone(),
        }))
    }

    fn transport_type(&self) -> &'static str {
        "ssh"
    }
}

/// An authenticated russh session
struct SshConnection {
    handle: client::Handle<SshClientHandler>,
    host: String,
}

#[async_trait]
impl Connection for SshConnection {
    #[instrument(skip(self, stdout), fields(host = %self.host))]
    async fn execute(
        &mut self,
        command: &str,
        allocate_pty: bool,
        stdout: &mut (dyn Write + Send),
    ) -> Result<ExecOutput, ExecError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        if allocate_pty {
            channel
                .request_pty(false, "xterm", 80, 24, 0, 0, &[])
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }

        channel
            .exec(true, command)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = None;
        let mut stderr = Vec::new();

        // exit-status may arrive after EOF, so read until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    stdout
                        .write_all(&data)
                        .map_err(|e| ExecError::IoError(e.to_string()))?;
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    status = Some(exit_status);
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(ExecOutput {
            status,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, ExecError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| ExecError::TransferFailed(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| ExecError::TransferFailed(e.to_string()))?;

        debug!("sftp channel open");
        Ok(Box::new(SftpChannel { sftp }))
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;
        info!(host = %self.host, "SSH disconnected");
        Ok(())
    }
}

/// SFTP-backed file channel
struct SftpChannel {
    sftp: SftpSession,
}

#[async_trait]
impl FileChannel for SftpChannel {
    async fn exists(&self, remote_path: &str) -> Result<bool, ExecError> {
        self.sftp
            .try_exists(remote_path)
            .await
            .map_err(|e| ExecError::TransferFailed(format!("{remote_path}: {e}")))
    }

    async fn mkdir(&self, remote_path: &str) -> Result<(), ExecError> {
        self.sftp
            .create_dir(remote_path)
            .await
            .map_err(|e| ExecError::TransferFailed(format!("mkdir {remote_path}: {e}")))
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), ExecError> {
        let contents = tokio::fs::read(local_path)
            .await
            .map_err(|_| ExecError::LocalPathMissing(local_path.display().to_string()))?;

        let failed = |e: &dyn std::fmt::Display| {
            ExecError::TransferFailed(format!("put {remote_path}: {e}"))
        };

        let mut file = self
            .sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| failed(&e))?;
        file.write_all(&contents).await.map_err(|e| failed(&e))?;
        file.flush().await.map_err(|e| failed(&e))?;
        file.shutdown().await.map_err(|e| failed(&e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ExecError> {
        self.sftp
            .close()
            .await
            .map_err(|e| ExecError::TransferFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RemoteCommand;
    use crate::session::Session;

    #[test]
    fn test_transport_type() {
        assert_eq!(SshTransport::new().transport_type(), "ssh");
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_roundtrip() {
        let info = ConnectionInfo::new("localhost", "test", Credential::password("test"));
        let mut session = Session::new(info, Arc::new(SshTransport::new()));
        session.connect().await.unwrap();
        let result = session
            .execute_remote_command(&RemoteCommand::new(["echo", "hello"]))
            .await;
        session.close().await;
        assert_eq!(result.unwrap().stdout.trim(), "hello");
    }
}
