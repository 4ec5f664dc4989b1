//! Workflow parameters and execution settings

use std::path::PathBuf;
use std::time::Duration;

use remotepy_exec::DEFAULT_ELEVATION_PREFIX;
use serde::{Deserialize, Serialize};

/// How remote programs are launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Interpreter invoked on the host
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Prefix for elevated commands
    #[serde(default = "default_elevation_prefix")]
    pub elevation_prefix: String,
    /// Upper bound for each remote command; unbounded when absent
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            elevation_prefix: default_elevation_prefix(),
            command_timeout_secs: None,
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_elevation_prefix() -> String {
    DEFAULT_ELEVATION_PREFIX.to_string()
}

impl ExecutionSettings {
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Create a virtual environment at `path/env_name` on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEnvironment {
    /// Remote folder holding the environment
    pub path: String,
    /// Environment folder name
    pub env_name: String,
}

/// Deploy a local project folder and run one of its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteProject {
    /// Local project folder
    pub project_path: PathBuf,
    /// Entry point relative to the project folder, e.g. `main.py` or `./pkg/main.py`
    pub entry_file: PathBuf,
    /// Remote folder the project is copied into
    pub remote_destination: String,
    /// Remove and run as the elevated user
    pub elevated: bool,
}

/// Deploy a single local file and run it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteFile {
    /// Local file to copy
    pub local_file: PathBuf,
    /// Remote folder the file is copied into
    pub remote_destination: String,
    /// Run as the elevated user
    pub elevated: bool,
}

/// One user-facing operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workflow {
    CreateEnvironment(CreateEnvironment),
    ExecuteProject(ExecuteProject),
    ExecuteFile(ExecuteFile),
}

impl Workflow {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::CreateEnvironment(_) => "env",
            Workflow::ExecuteProject(_) => "execute-project",
            Workflow::ExecuteFile(_) => "execute-file",
        }
    }
}
