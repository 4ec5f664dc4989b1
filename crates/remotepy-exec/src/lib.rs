//! remotepy-exec: Remote session, command and transfer primitives
//!
//! Provides the session lifecycle over a pluggable transport, the recursive
//! transfer engine and an SSH transport built on russh.

pub mod command;
pub mod error;
pub mod keys;
pub mod result;
pub mod session;
pub mod ssh;
pub mod traits;
pub mod transfer;

pub use command::{DEFAULT_ELEVATION_PREFIX, RemoteCommand};
pub use error::ExecError;
pub use keys::{Credential, KeyError};
pub use result::{CommandResult, ConnectionInfo, ExecOutput};
pub use session::Session;
pub use ssh::SshTransport;
pub use traits::{Connection, FileChannel, Transport};
pub use transfer::{TransferEngine, remote_join};
