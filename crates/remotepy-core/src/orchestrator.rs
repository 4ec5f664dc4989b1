//! `Orchestrator`: composes sessions, transfers and commands into workflows
//!
//! Every workflow opens exactly one session and closes it on every exit
//! path. Steps run strictly in order; the first failure ends the workflow.

use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use remotepy_exec::{
    CommandResult, ConnectionInfo, ExecError, RemoteCommand, Session, Transport, remote_join,
};
use tracing::{info, instrument};

use crate::config::{CreateEnvironment, ExecuteFile, ExecuteProject, ExecutionSettings, Workflow};
use crate::error::CoreError;

/// Produces the sink each session writes remote output to
pub type OutputFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Runs workflows against one target host
pub struct Orchestrator {
    info: ConnectionInfo,
    transport: Arc<dyn Transport>,
    settings: ExecutionSettings,
    output: Option<OutputFactory>,
}

impl Orchestrator {
    pub fn new(info: ConnectionInfo, transport: Arc<dyn Transport>) -> Self {
        Self {
            info,
            transport,
            settings: ExecutionSettings::default(),
            output: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Redirect remote output (stdout by default)
    #[must_use]
    pub fn with_output(mut self, output: OutputFactory) -> Self {
        self.output = Some(output);
        self
    }

    /// Dispatch a workflow
    ///
    /// # Errors
    /// Whatever the selected workflow returns
    pub async fn run(&self, workflow: &Workflow) -> Result<(), CoreError> {
        info!(workflow = workflow.name(), host = %self.info.host, "starting workflow");
        match workflow {
            Workflow::CreateEnvironment(params) => self.create_environment(params).await,
            Workflow::ExecuteProject(params) => self.execute_project(params).await,
            Workflow::ExecuteFile(params) => self.execute_file(params).await,
        }
    }

    /// Create a virtual environment on the host
    ///
    /// # Errors
    /// `InvalidRemotePath` before connecting, connection failures, or
    /// `CommandFailed` if the interpreter exits nonzero
    #[instrument(skip(self, params), fields(host = %self.info.host))]
    pub async fn create_environment(&self, params: &CreateEnvironment) -> Result<(), CoreError> {
        let env_path = shell_safe(remote_join(&params.path, &params.env_name))?;
        let cmd = self.command([
            self.settings.interpreter.clone(),
            "-m".to_string(),
            "venv".to_string(),
            env_path.clone(),
        ]);

        let mut session = self.open_session().await?;
        let result = session.execute_remote_command(&cmd).await;
        session.close().await;

        result?;
        info!(path = %env_path, "virtual environment created");
        Ok(())
    }

    /// Replace the remote copy of a project and run its entry file
    ///
    /// # Errors
    /// `LocalPathMissing`, `InvalidEntryFile` or `InvalidRemotePath` before
    /// connecting, then any
    /// session, transfer or remote command failure
    #[instrument(skip(self, params), fields(host = %self.info.host))]
    pub async fn execute_project(&self, params: &ExecuteProject) -> Result<(), CoreError> {
        let project = resolve_project(&params.project_path).await?;
        let project_name = file_name(&project)?;
        let remote_project = shell_safe(remote_join(&params.remote_destination, &project_name))?;
        let entry = shell_safe(entry_remote_path(&remote_project, &params.entry_file)?)?;

        let mut session = self.open_session().await?;
        let result = self
            .deploy_project(&mut session, &project, &remote_project, &entry, params)
            .await;
        session.close().await;
        result
    }

    async fn deploy_project(
        &self,
        session: &mut Session,
        project: &Path,
        remote_project: &str,
        entry: &str,
        params: &ExecuteProject,
    ) -> Result<(), CoreError> {
        let remove = self
            .command([format!("rm -rf {remote_project}")])
            .elevated(params.elevated);
        session.execute_remote_command(&remove).await?;
        info!(remote = %remote_project, "removed previous deployment");

        session
            .transfer_directory(project, &params.remote_destination)
            .await?;

        let run = self
            .command([self.settings.interpreter.clone(), entry.to_string()])
            .elevated(params.elevated)
            .streaming(true);
        let result = session.execute_remote_command(&run).await?;
        log_finished(entry, &result);
        Ok(())
    }

    /// Replace a single remote file and run it
    ///
    /// # Errors
    /// `LocalPathMissing` or `InvalidRemotePath` before connecting, then any
    /// session, transfer or remote command failure
    #[instrument(skip(self, params), fields(host = %self.info.host))]
    pub async fn execute_file(&self, params: &ExecuteFile) -> Result<(), CoreError> {
        let local_file = &params.local_file;
        let is_file = tokio::fs::metadata(local_file)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ExecError::LocalPathMissing(local_file.display().to_string()).into());
        }
        let remote_file = shell_safe(remote_join(
            &params.remote_destination,
            &file_name(local_file)?,
        ))?;

        let mut session = self.open_session().await?;
        let result = self.deploy_file(&mut session, &remote_file, params).await;
        session.close().await;
        result
    }

    async fn deploy_file(
        &self,
        session: &mut Session,
        remote_file: &str,
        params: &ExecuteFile,
    ) -> Result<(), CoreError> {
        // the copy is owned by the connecting user, so no elevation here
        let remove = self.command([format!("rm -f {remote_file}")]);
        session.execute_remote_command(&remove).await?;

        session
            .transfer_file(&params.local_file, &params.remote_destination)
            .await?;

        let run = self
            .command([self.settings.interpreter.clone(), remote_file.to_string()])
            .elevated(params.elevated)
            .streaming(true);
        let result = session.execute_remote_command(&run).await?;
        log_finished(remote_file, &result);
        Ok(())
    }

    async fn open_session(&self) -> Result<Session, CoreError> {
        let mut session = Session::new(self.info.clone(), self.transport.clone());
        if let Some(make_output) = &self.output {
            session = session.with_output(make_output());
        }
        session.connect().await?;
        Ok(session)
    }

    fn command<I, S>(&self, tokens: I) -> RemoteCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RemoteCommand::new(tokens)
            .with_elevation_prefix(self.settings.elevation_prefix.clone())
            .with_timeout(self.settings.command_timeout())
    }
}

fn log_finished(program: &str, result: &CommandResult) {
    info!(
        program = %program,
        status = result.status,
        duration = ?result.duration,
        "remote program finished"
    );
}

async fn resolve_project(project: &Path) -> Result<PathBuf, CoreError> {
    let missing = || CoreError::from(ExecError::LocalPathMissing(project.display().to_string()));

    let metadata = tokio::fs::metadata(project).await.map_err(|_| missing())?;
    if !metadata.is_dir() {
        return Err(missing());
    }
    if project.file_name().is_none() {
        return tokio::fs::canonicalize(project).await.map_err(|_| missing());
    }
    Ok(project.to_path_buf())
}

fn file_name(path: &Path) -> Result<String, CoreError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ExecError::LocalPathMissing(path.display().to_string()).into())
}

/// Accept a remote path only if it reaches the shell as a single plain word
fn shell_safe(path: String) -> Result<String, CoreError> {
    let plain = |c: char| c.is_alphanumeric() || "/._-+=:@,%~".contains(c);
    if path.is_empty() || path.starts_with('-') || !path.chars().all(plain) {
        return Err(CoreError::InvalidRemotePath(path));
    }
    Ok(path)
}

/// Remote path of `entry` inside the deployed project
fn entry_remote_path(remote_project: &str, entry: &Path) -> Result<String, CoreError> {
    let invalid = || CoreError::InvalidEntryFile(entry.display().to_string());

    let mut parts = Vec::new();
    for component in entry.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }

    Ok(remote_join(remote_project, &parts.join("/")))
}
