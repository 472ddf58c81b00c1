//! Subprocess execution utilities.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::core::errors::PrefetchError;

/// Default time budget for external tools (15 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Build from an argv list (`[program, args...]`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("empty command"))?;
        Ok(ProcessBuilder::new(program).args(args))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        // the child leads a fresh process group, so a timeout can take down
        // everything it spawned
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }

    /// Execute the command and wait for completion.
    ///
    /// Fails with [`PrefetchError::SubprocessTimeout`] if a timeout is set and
    /// the command, or anything still holding its output pipes, runs past it.
    /// The whole process group is killed in that case.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("running `{}`", self.display_command());

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        // Drain both pipes on their own threads so a chatty child can't block
        // on a full pipe while we poll for its exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match deadline {
            Some(deadline) => self.wait_until(&mut child, deadline)?,
            None => child
                .wait()
                .with_context(|| format!("failed to wait for `{}`", self.program.display()))?,
        };

        // background processes may keep the pipes open after the child exits
        let (Some(stdout), Some(stderr)) = (collect(&stdout, deadline), collect(&stderr, deadline))
        else {
            kill_process_group(&child);
            return Err(self.timed_out());
        };

        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }

    fn wait_until(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        kill_process_group(child);
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(self.timed_out());
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to wait for `{}`", self.program.display())
                    })
                }
            }
        }
    }

    fn timed_out(&self) -> anyhow::Error {
        let timeout = self.timeout.unwrap_or_default();
        tracing::error!(
            "`{}` timed out after {}s",
            self.display_command(),
            timeout.as_secs()
        );
        PrefetchError::SubprocessTimeout {
            command: self.display_command(),
            timeout,
        }
        .into()
    }

    /// Execute and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            tracing::error!(
                "`{}` failed with: {}",
                self.display_command(),
                stderr.trim_end()
            );
            return Err(PrefetchError::SubprocessFailure {
                command: self.display_command(),
                exit_code: output.status.code(),
                stderr,
            }
            .into());
        }
        Ok(output)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

/// Wait for a drained pipe. `None` means the deadline passed first.
fn collect(rx: &Receiver<Vec<u8>>, deadline: Option<Instant>) -> Option<Vec<u8>> {
    let Some(deadline) = deadline else {
        return Some(rx.recv().unwrap_or_default());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Some(buf),
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("piprepo").args(["build", "/tmp/repo"]);

        assert_eq!(pb.display_command(), "piprepo build /tmp/repo");
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["pip-prefetch".to_string(), "--quiet".to_string()];
        let pb = ProcessBuilder::from_argv(&argv).unwrap();

        assert_eq!(pb.get_program(), Path::new("pip-prefetch"));
        assert_eq!(pb.get_args(), ["--quiet".to_string()]);
        assert!(ProcessBuilder::from_argv(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_captures_stdout() {
        let output = ProcessBuilder::new("echo").arg("hello").exec().unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_and_check_reports_exit_code() {
        let err = ProcessBuilder::new("sh")
            .args(["-c", "echo nope >&2; exit 3"])
            .exec_and_check()
            .unwrap_err();

        match err.downcast_ref::<PrefetchError>() {
            Some(PrefetchError::SubprocessFailure {
                exit_code, stderr, ..
            }) => {
                assert_eq!(*exit_code, Some(3));
                assert!(stderr.contains("nope"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let start = Instant::now();
        let err = ProcessBuilder::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(200))
            .exec()
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::SubprocessTimeout { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_covers_background_output_holders() {
        let start = Instant::now();
        let err = ProcessBuilder::new("sh")
            .args(["-c", "sleep 4 & echo hi"])
            .timeout(Duration::from_millis(300))
            .exec()
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::SubprocessTimeout { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_grandchildren() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("late");

        let script = format!("(sleep 1; touch '{}') >/dev/null 2>&1 & sleep 5", marker.display());
        let err = ProcessBuilder::new("sh")
            .args(["-c", script.as_str()])
            .timeout(Duration::from_millis(200))
            .exec()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrefetchError>(),
            Some(PrefetchError::SubprocessTimeout { .. })
        ));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }
}
