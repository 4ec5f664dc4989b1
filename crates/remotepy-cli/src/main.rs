//! remotepy CLI
//!
//! Copies Python projects or single files to a remote host over SSH and runs them

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use remotepy_core::{CreateEnvironment, ExecuteFile, ExecuteProject, Orchestrator, Workflow};
use remotepy_exec::{ConnectionInfo, Credential, SshTransport};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "remotepy", version)]
#[command(about = "Run Python projects and files on a remote host", long_about = None)]
struct Cli {
    /// Remote host address
    #[arg(long)]
    server: String,

    /// Remote user
    #[arg(long)]
    user: String,

    /// Password for the remote user
    #[arg(long)]
    password: Option<String>,

    /// Private key used instead of a password
    #[arg(long)]
    identity_file: Option<PathBuf>,

    /// SSH port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a remotepy.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a Python virtual environment on the remote host
    Env {
        /// Remote folder the environment is created in
        #[arg(long)]
        env_folder: String,
        /// Environment folder name
        #[arg(long)]
        name: String,
    },

    /// Copy a project folder to the remote host and run one of its files
    ExecuteProject {
        /// Destination folder on the remote host
        #[arg(long)]
        remote_destination: String,
        /// Run the project as root
        #[arg(long)]
        as_root: bool,
        /// Local project folder
        #[arg(long)]
        project: PathBuf,
        /// File to run, relative to the project folder
        #[arg(long)]
        execute_file: PathBuf,
    },

    /// Copy a single Python file to the remote host and run it
    ExecuteFile {
        /// Destination folder on the remote host
        #[arg(long)]
        remote_destination: String,
        /// Run the file as root
        #[arg(long)]
        as_root: bool,
        /// Local Python file to run
        #[arg(long)]
        execute_file: PathBuf,
    },
}

impl From<Commands> for Workflow {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Env { env_folder, name } => Workflow::CreateEnvironment(CreateEnvironment {
                path: env_folder,
                env_name: name,
            }),
            Commands::ExecuteProject {
                remote_destination,
                as_root,
                project,
                execute_file,
            } => Workflow::ExecuteProject(ExecuteProject {
                project_path: project,
                entry_file: execute_file,
                remote_destination,
                elevated: as_root,
            }),
            Commands::ExecuteFile {
                remote_destination,
                as_root,
                execute_file,
            } => Workflow::ExecuteFile(ExecuteFile {
                local_file: execute_file,
                remote_destination,
                elevated: as_root,
            }),
        }
    }
}

/// Password wins over a key file; a key file from the flag wins over the config
fn credential(cli: &Cli, config: &Config) -> Result<Credential> {
    if let Some(password) = &cli.password {
        return Ok(Credential::password(password.clone()));
    }
    match cli.identity_file.as_ref().or(config.connection.identity_file.as_ref()) {
        Some(path) => Ok(Credential::key_file(path.clone(), None)),
        None => Err(eyre::eyre!(
            "no credential given: pass --password or --identity-file"
        )),
    }
}

fn connection_info(cli: &Cli, config: &Config) -> Result<ConnectionInfo> {
    let port = cli.port.unwrap_or(config.connection.port);
    Ok(ConnectionInfo::new(&cli.server, &cli.user, credential(cli, config)?).with_port(port))
}

fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the remote program's output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Logged once tracing is up, since the level itself comes from the config
fn report_config_source(config: &Config) {
    match &config.source {
        Some(path) => debug!(path = %path.display(), "loaded config"),
        None => warn!("no config file found, using defaults"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load_default(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);
    report_config_source(&config);

    let info = connection_info(&cli, &config)?;
    let orchestrator = Orchestrator::new(info, Arc::new(SshTransport::new()))
        .with_settings(config.execution.clone());

    let workflow = Workflow::from(cli.command);
    match orchestrator.run(&workflow).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::from(1))
        }
    }
}
