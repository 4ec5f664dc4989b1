use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use remotepy_core::*;
use remotepy_exec::{
    Connection, ConnectionInfo, Credential, ExecError, ExecOutput, FileChannel, Transport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Connect,
    Exec { command: String, pty: bool },
    Exists(String),
    Mkdir(String),
    Put(PathBuf, String),
    Close,
}

/// Remote host state shared by the fake transport and its channels
#[derive(Default)]
struct Host {
    calls: Vec<Call>,
    dirs: BTreeSet<String>,
    files: BTreeSet<String>,
    refuse_login: bool,
    fail_exec_prefix: Option<String>,
    readonly: bool,
}

impl Host {
    fn remove_tree(&mut self, path: &str) {
        let nested = format!("{path}/");
        self.dirs.retain(|d| d != path && !d.starts_with(&nested));
        self.files.retain(|f| f != path && !f.starts_with(&nested));
    }
}

#[derive(Clone, Default)]
struct FakeHost(Arc<Mutex<Host>>);

impl FakeHost {
    fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().calls.clone()
    }

    fn record(&self, call: Call) {
        self.0.lock().unwrap().calls.push(call);
    }

    fn has_file(&self, path: &str) -> bool {
        self.0.lock().unwrap().files.contains(path)
    }
}

#[async_trait]
impl Transport for FakeHost {
    async fn connect(&self, _info: &ConnectionInfo) -> Result<Box<dyn Connection>, ExecError> {
        if self.0.lock().unwrap().refuse_login {
            return Err(ExecError::AuthenticationFailed("password rejected".into()));
        }
        self.record(Call::Connect);
        Ok(Box::new(self.clone()))
    }

    fn transport_type(&self) -> &'static str {
        "fake"
    }
}

#[async_trait]
impl Connection for FakeHost {
    async fn execute(
        &mut self,
        command: &str,
        allocate_pty: bool,
        stdout: &mut (dyn Write + Send),
    ) -> Result<ExecOutput, ExecError> {
        self.record(Call::Exec {
            command: command.to_string(),
            pty: allocate_pty,
        });

        let mut host = self.0.lock().unwrap();
        if let Some(prefix) = &host.fail_exec_prefix
            && command.starts_with(prefix.as_str())
        {
            return Ok(ExecOutput {
                status: Some(1),
                stderr: "Permission denied\n".to_string(),
            });
        }

        let unprefixed = command.strip_prefix("sudo -E ").unwrap_or(command);
        if let Some(target) = unprefixed
            .strip_prefix("rm -rf ")
            .or_else(|| unprefixed.strip_prefix("rm -f "))
        {
            host.remove_tree(target);
        } else {
            stdout
                .write_all(b"hello from remote\n")
                .map_err(|e| ExecError::IoError(e.to_string()))?;
        }

        Ok(ExecOutput {
            status: Some(0),
            stderr: String::new(),
        })
    }

    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, ExecError> {
        Ok(Box::new(self.clone()))
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        self.record(Call::Close);
        Ok(())
    }
}

#[async_trait]
impl FileChannel for FakeHost {
    async fn exists(&self, remote_path: &str) -> Result<bool, ExecError> {
        self.record(Call::Exists(remote_path.to_string()));
        let host = self.0.lock().unwrap();
        Ok(host.dirs.contains(remote_path) || host.files.contains(remote_path))
    }

    async fn mkdir(&self, remote_path: &str) -> Result<(), ExecError> {
        self.record(Call::Mkdir(remote_path.to_string()));
        let mut host = self.0.lock().unwrap();
        if host.readonly {
            return Err(ExecError::TransferFailed(format!("mkdir {remote_path}: read-only")));
        }
        host.dirs.insert(remote_path.to_string());
        Ok(())
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), ExecError> {
        self.record(Call::Put(local_path.to_path_buf(), remote_path.to_string()));
        let mut host = self.0.lock().unwrap();
        if host.readonly {
            return Err(ExecError::TransferFailed(format!("put {remote_path}: read-only")));
        }
        host.files.insert(remote_path.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn orchestrator(host: &FakeHost) -> (Orchestrator, Captured) {
    let captured = Captured::default();
    let sink = captured.clone();
    let info = ConnectionInfo::new("pi.local", "pi", Credential::password("raspberry"));
    let orchestrator = Orchestrator::new(info, Arc::new(host.clone()))
        .with_output(Arc::new(move || -> Box<dyn Write + Send> { Box::new(sink.clone()) }));
    (orchestrator, captured)
}

/// Local `App` project with a nested package
fn project() -> (tempfile::TempDir, PathBuf) {
    let root = tempfile::tempdir().unwrap();
    let app = root.path().join("App");
    std::fs::create_dir_all(app.join("lib")).unwrap();
    std::fs::write(app.join("run.py"), "print('hello from remote')").unwrap();
    std::fs::write(app.join("lib/helpers.py"), "").unwrap();
    (root, app)
}

fn exec(command: &str, pty: bool) -> Call {
    Call::Exec {
        command: command.to_string(),
        pty,
    }
}

#[tokio::test]
async fn test_execute_project_call_sequence() {
    let host = FakeHost::default();
    let (orchestrator, captured) = orchestrator(&host);
    let (_root, app) = project();

    orchestrator
        .run(&Workflow::ExecuteProject(ExecuteProject {
            project_path: app.clone(),
            entry_file: PathBuf::from("run.py"),
            remote_destination: "/srv".to_string(),
            elevated: false,
        }))
        .await
        .unwrap();

    assert_eq!(
        host.calls(),
        vec![
            Call::Connect,
            exec("rm -rf /srv/App", false),
            Call::Exists("/srv/App".to_string()),
            Call::Mkdir("/srv/App".to_string()),
            Call::Mkdir("/srv/App/lib".to_string()),
            Call::Put(app.join("lib/helpers.py"), "/srv/App/lib/helpers.py".to_string()),
            Call::Put(app.join("run.py"), "/srv/App/run.py".to_string()),
            exec("python3 /srv/App/run.py", true),
            Call::Close,
        ]
    );
    assert_eq!(captured.text(), "hello from remote\n");
}

#[tokio::test]
async fn test_execute_project_redeploys_over_previous_copy() {
    let host = FakeHost::default();
    {
        let mut state = host.0.lock().unwrap();
        state.dirs.insert("/srv/App".to_string());
        state.files.insert("/srv/App/stale.py".to_string());
    }
    let (orchestrator, _captured) = orchestrator(&host);
    let (_root, app) = project();

    orchestrator
        .execute_project(&ExecuteProject {
            project_path: app,
            entry_file: PathBuf::from("./run.py"),
            remote_destination: "/srv/".to_string(),
            elevated: true,
        })
        .await
        .unwrap();

    assert!(!host.has_file("/srv/App/stale.py"));
    assert!(host.has_file("/srv/App/run.py"));

    let calls = host.calls();
    assert_eq!(calls[1], exec("sudo -E rm -rf /srv/App", false));
    assert_eq!(calls[calls.len() - 2], exec("sudo -E python3 /srv/App/run.py", true));
}

#[tokio::test]
async fn test_execute_project_nested_entry_file() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);
    let (_root, app) = project();

    orchestrator
        .execute_project(&ExecuteProject {
            project_path: app,
            entry_file: PathBuf::from("lib/helpers.py"),
            remote_destination: "/srv".to_string(),
            elevated: false,
        })
        .await
        .unwrap();

    assert!(host.calls().contains(&exec("python3 /srv/App/lib/helpers.py", true)));
}

#[tokio::test]
async fn test_failed_removal_stops_workflow() {
    let host = FakeHost::default();
    host.0.lock().unwrap().fail_exec_prefix = Some("sudo -E rm".to_string());
    let (orchestrator, captured) = orchestrator(&host);
    let (_root, app) = project();

    let err = orchestrator
        .execute_project(&ExecuteProject {
            project_path: app,
            entry_file: PathBuf::from("run.py"),
            remote_destination: "/srv".to_string(),
            elevated: true,
        })
        .await
        .unwrap_err();

    assert!(err.is_remote_failure());
    assert_eq!(
        host.calls(),
        vec![Call::Connect, exec("sudo -E rm -rf /srv/App", false), Call::Close]
    );
    assert_eq!(captured.text(), "Permission denied\n");
}

#[tokio::test]
async fn test_failed_transfer_skips_execution_and_closes() {
    let host = FakeHost::default();
    host.0.lock().unwrap().readonly = true;
    let (orchestrator, _captured) = orchestrator(&host);
    let (_root, app) = project();

    let err = orchestrator
        .execute_project(&ExecuteProject {
            project_path: app,
            entry_file: PathBuf::from("run.py"),
            remote_destination: "/srv".to_string(),
            elevated: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Exec(ExecError::TransferFailed(_))));
    let calls = host.calls();
    assert!(!calls.iter().any(|c| matches!(c, Call::Exec { pty: true, .. })));
    assert_eq!(calls.last(), Some(&Call::Close));
}

#[tokio::test]
async fn test_missing_project_fails_before_connecting() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);

    let err = orchestrator
        .execute_project(&ExecuteProject {
            project_path: PathBuf::from("/definitely/not/here/App"),
            entry_file: PathBuf::from("run.py"),
            remote_destination: "/srv".to_string(),
            elevated: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Exec(ExecError::LocalPathMissing(_))));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_entry_file_fails_before_connecting() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);
    let (_root, app) = project();

    let err = orchestrator
        .execute_project(&ExecuteProject {
            project_path: app,
            entry_file: PathBuf::from("../escape.py"),
            remote_destination: "/srv".to_string(),
            elevated: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidEntryFile(_)));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_execute_file_elevated_call_sequence() {
    let host = FakeHost::default();
    let (orchestrator, captured) = orchestrator(&host);
    let root = tempfile::tempdir().unwrap();
    let task = root.path().join("task.py");
    std::fs::write(&task, "print('hi')").unwrap();

    orchestrator
        .run(&Workflow::ExecuteFile(ExecuteFile {
            local_file: task.clone(),
            remote_destination: "/srv".to_string(),
            elevated: true,
        }))
        .await
        .unwrap();

    assert_eq!(
        host.calls(),
        vec![
            Call::Connect,
            exec("rm -f /srv/task.py", false),
            Call::Put(task, "/srv/task.py".to_string()),
            exec("sudo -E python3 /srv/task.py", true),
            Call::Close,
        ]
    );
    assert_eq!(captured.text(), "hello from remote\n");
}

#[tokio::test]
async fn test_execute_file_requires_regular_file() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);
    let root = tempfile::tempdir().unwrap();

    let err = orchestrator
        .execute_file(&ExecuteFile {
            local_file: root.path().to_path_buf(),
            remote_destination: "/srv".to_string(),
            elevated: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Exec(ExecError::LocalPathMissing(_))));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_create_environment() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);

    orchestrator
        .run(&Workflow::CreateEnvironment(CreateEnvironment {
            path: "/opt/envs".to_string(),
            env_name: "app-venv".to_string(),
        }))
        .await
        .unwrap();

    assert_eq!(
        host.calls(),
        vec![
            Call::Connect,
            exec("python3 -m venv /opt/envs/app-venv", false),
            Call::Close,
        ]
    );
}

#[tokio::test]
async fn test_settings_change_interpreter_and_prefix() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);
    let orchestrator = orchestrator.with_settings(ExecutionSettings {
        interpreter: "/opt/envs/app-venv/bin/python".to_string(),
        elevation_prefix: "doas".to_string(),
        command_timeout_secs: Some(600),
    });
    let root = tempfile::tempdir().unwrap();
    let task = root.path().join("task.py");
    std::fs::write(&task, "").unwrap();

    orchestrator
        .execute_file(&ExecuteFile {
            local_file: task,
            remote_destination: "/srv".to_string(),
            elevated: true,
        })
        .await
        .unwrap();

    assert!(
        host.calls()
            .contains(&exec("doas /opt/envs/app-venv/bin/python /srv/task.py", true))
    );
}

#[tokio::test]
async fn test_rejected_login_issues_no_calls() {
    let host = FakeHost::default();
    host.0.lock().unwrap().refuse_login = true;
    let (orchestrator, _captured) = orchestrator(&host);

    let err = orchestrator
        .create_environment(&CreateEnvironment {
            path: "/opt".to_string(),
            env_name: "venv".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::Exec(ExecError::AuthenticationFailed(_))
    ));
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_destination_with_shell_characters_fails_before_connecting() {
    let host = FakeHost::default();
    let (orchestrator, _captured) = orchestrator(&host);
    let (_root, app) = project();

    let err = orchestrator
        .execute_project(&ExecuteProject {
            project_path: app.clone(),
            entry_file: PathBuf::from("run.py"),
            remote_destination: "/srv/my dir".to_string(),
            elevated: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRemotePath(ref p) if p == "/srv/my dir/App"));

    let err = orchestrator
        .execute_file(&ExecuteFile {
            local_file: app.join("run.py"),
            remote_destination: "/srv;reboot".to_string(),
            elevated: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRemotePath(_)));

    assert!(host.calls().is_empty());
}
