//! Process spawning and lifecycle management.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::io::AgentIo;
use crate::config::ClientConfig;
use crate::{Error, Result};

/// Everything needed to start the agent: executable, arguments, finished
/// environment and working directory.
///
/// [`LaunchSpec::resolve`] derives one from a [`ClientConfig`]. Callers that
/// locate or wrap the binary themselves can build one directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// The complete child environment. Nothing else is inherited.
    pub env: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_directory: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Locate the CLI and build its arguments and environment.
    ///
    /// Fails with [`Error::CliNotFound`] when the binary is not on `PATH`.
    pub fn resolve(config: &ClientConfig) -> Result<Self> {
        let program = find_executable(config.cli_command(), std::env::var_os("PATH"))?;
        Ok(Self {
            program,
            args: config.cli_args()?,
            env: config.build_env()?,
            working_directory: config.working_directory.clone(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.env_clear();
        cmd.envs(&self.env);
        if let Some(ref dir) = self.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Search `path` for `name`, unless `name` already contains a separator.
fn find_executable(name: &str, path: Option<OsString>) -> Result<PathBuf> {
    let not_found = || Error::CliNotFound {
        searched: name.to_string(),
    };

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let path = path.ok_or_else(not_found)?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|full| is_executable(full))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// A running pi process.
///
/// # Cancellation
///
/// The child is spawned with `kill_on_drop`, so dropping an `AgentProcess`
/// kills the subprocess if it's still running.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    pid: Option<u32>,
}

impl AgentProcess {
    /// Start the process described by `spec` with all three pipes attached.
    ///
    /// Returns the process handle and its pipes.
    pub fn spawn(spec: &LaunchSpec) -> Result<(Self, AgentIo)> {
        let mut child = spec.command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliNotFound {
                    searched: spec.program.display().to_string(),
                }
            } else {
                Error::ProcessSpawn(e)
            }
        })?;

        let missing = |pipe: &str| {
            Error::ProcessSpawn(std::io::Error::other(format!("{pipe} was not captured")))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let pid = child.id();
        tracing::debug!("spawned {} (pid {:?})", spec.program.display(), pid);

        let io = AgentIo::new(stdin, stdout).with_stderr(stderr);
        Ok((Self { child, pid }, io))
    }

    /// Process ID at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit, killing it once `kill` is cancelled.
    pub async fn wait_or_kill(mut self, kill: CancellationToken) -> std::io::Result<ExitStatus> {
        tokio::select! {
            status = self.child.wait() => return status,
            _ = kill.cancelled() => {}
        }
        tracing::warn!("killing pi process (pid {:?})", self.pid);
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("kill failed: {}", e);
        }
        self.child.wait().await
    }
}

/// Ask the process to exit. Returns false if no signal was sent.
#[cfg(unix)]
pub(crate) fn request_termination(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("SIGTERM to pid {} failed: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn request_termination(_pid: u32) -> bool {
    false
}

/// Text for a process that exited. `None` for a clean exit.
pub(crate) fn exit_cause(status: &ExitStatus) -> Option<String> {
    if status.success() {
        None
    } else {
        Some(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send::<AgentProcess>();
        assert_send_sync::<LaunchSpec>();
    }

    #[test]
    fn missing_cli_is_reported() {
        let err = find_executable("pi-definitely-not-installed", Some("/nonexistent".into()))
            .unwrap_err();
        assert!(
            matches!(err, Error::CliNotFound { ref searched } if searched == "pi-definitely-not-installed")
        );

        assert!(matches!(
            find_executable("pi", None),
            Err(Error::CliNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn finds_executable_on_path() {
        let found = find_executable("sh", Some("/nonexistent:/bin:/usr/bin".into())).unwrap();
        assert!(found.ends_with("sh"));

        assert_eq!(
            find_executable("/bin/sh", None).unwrap(),
            PathBuf::from("/bin/sh")
        );
    }

    #[test]
    fn resolve_uses_config() {
        let config = ClientConfig::builder()
            .cli_path("/nonexistent/bin/pi")
            .build()
            .unwrap();
        assert!(matches!(
            LaunchSpec::resolve(&config),
            Err(Error::CliNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_and_exit_status() {
        let spec = LaunchSpec::new("/bin/sh").arg("-c").arg("exit 3");
        let (process, _io) = AgentProcess::spawn(&spec).unwrap();
        assert!(process.pid().is_some());

        let status = process
            .wait_or_kill(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));
        assert_eq!(exit_cause(&status).as_deref(), Some("exit status: 3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_token_stops_process() {
        let spec = LaunchSpec::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30")
            .env("PATH", "/usr/bin:/bin");
        let (process, _io) = AgentProcess::spawn(&spec).unwrap();

        let kill = CancellationToken::new();
        kill.cancel();
        let status = process.wait_or_kill(kill).await.unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_stops_process() {
        let spec = LaunchSpec::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30")
            .env("PATH", "/usr/bin:/bin");
        let (process, _io) = AgentProcess::spawn(&spec).unwrap();
        let pid = process.pid().unwrap();

        assert!(request_termination(pid));
        let status = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            process.wait_or_kill(CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!status.success());
    }
}
