//! remotepy-core: Workflow orchestration
//!
//! Composes remote sessions, the transfer engine and remote commands into
//! the create-environment, execute-project and execute-file workflows.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::{CreateEnvironment, ExecuteFile, ExecuteProject, ExecutionSettings, Workflow};
pub use error::CoreError;
pub use orchestrator::{Orchestrator, OutputFactory};
