//! Worker process management for snippet execution.
//!
//! A `WorkerProcess` is one Python interpreter running the bundled bootstrap.
//! It receives exactly one [`WorkerRequest`], answers with at most one
//! [`WorkerOutcome`], and is then reaped. Nothing is pooled: a fresh process
//! per snippet is what keeps sessions from leaking into each other.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};

use crate::config::ENV_PYTHON;
use crate::error::{Error, Result};

use super::protocol::{WorkerOutcome, WorkerRequest, read_frame, write_frame};

/// Program run by the interpreter. Reads one request frame from stdin and
/// writes one outcome frame to a private duplicate of stdout.
const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// Bytes of worker-level stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// How long to wait for the stderr drain after the process is gone.
const STDERR_DRAIN_WAIT: Duration = Duration::from_millis(500);

/// Deadlines for the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grace {
    /// Time allowed between SIGTERM and SIGKILL.
    pub terminate: Duration,
    /// Time allowed for the process to be reaped after SIGKILL.
    pub kill: Duration,
}

/// Shutdown state of a worker.
///
/// `Running -> TerminateRequested -> (Exited | KillRequested -> Exited)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Running,
    TerminateRequested { deadline: Instant },
    KillRequested { deadline: Instant },
    Exited,
}

/// Locate the Python interpreter used for workers.
///
/// Looks in the following order:
/// 1. The explicitly configured path (a bare name is resolved on PATH)
/// 2. `RLM_PYTHON` environment variable
/// 3. `python3` on PATH
/// 4. `python` on PATH
pub fn find_interpreter(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return which::which(path).map_err(|e| {
            Error::Spawn(format!(
                "configured interpreter '{}' not found: {}",
                path.display(),
                e
            ))
        });
    }

    if let Ok(path) = std::env::var(ENV_PYTHON) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    for name in ["python3", "python"] {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    Err(Error::Spawn(
        "Could not find a Python interpreter. Set RLM_PYTHON or ensure python3 is in PATH."
            .to_string(),
    ))
}

/// Handle to one worker process.
pub struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    pid: Option<u32>,
    state: Termination,
    exit_status: Option<ExitStatus>,
}

impl WorkerProcess {
    /// Spawn a worker on `interpreter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(interpreter: &Path) -> Result<Self> {
        let mut command = Command::new(interpreter);
        command
            .arg("-I")
            .arg("-c")
            .arg(BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so signals also reach anything the snippet forks.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            Error::Spawn(format!(
                "Failed to spawn worker process '{}': {}",
                interpreter.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;
        let stderr = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut tail = Vec::new();
                let mut buf = [0u8; 8192];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            tail.extend_from_slice(&buf[..n]);
                            if tail.len() > 2 * STDERR_TAIL_BYTES {
                                tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                            }
                        }
                    }
                }
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
                String::from_utf8_lossy(&tail).into_owned()
            })
        });

        let pid = child.id();
        tracing::debug!("Spawned worker {:?} on {}", pid, interpreter.display());

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr,
            pid,
            state: Termination::Running,
            exit_status: None,
        })
    }

    /// Send the request and close stdin.
    pub async fn send(&mut self, request: &WorkerRequest) -> Result<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Worker request already sent".to_string()))?;
        write_frame(&mut stdin, request).await
        // stdin dropped here: the snippet sees EOF if it reads input.
    }

    /// Wait for the outcome frame. `None` means the worker exited silently.
    pub async fn recv(&mut self) -> Result<Option<WorkerOutcome>> {
        read_frame(&mut self.stdout).await
    }

    /// Process ID, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current shutdown state.
    pub fn state(&self) -> Termination {
        self.state
    }

    /// Exit status, once known.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Give a worker that has already reported a chance to exit on its own,
    /// then fall back to [`shutdown`](Self::shutdown).
    pub async fn reap(&mut self, grace: Grace) -> Option<ExitStatus> {
        if self.state == Termination::Running {
            if let Ok(status) = timeout(grace.terminate, self.child.wait()).await {
                self.exit_status = status.ok();
                self.state = Termination::Exited;
            }
        }
        self.shutdown(grace).await
    }

    /// Escalating shutdown: SIGTERM, wait, SIGKILL, wait.
    pub async fn shutdown(&mut self, grace: Grace) -> Option<ExitStatus> {
        loop {
            self.state = match self.state {
                Termination::Running => {
                    if let Ok(Some(status)) = self.child.try_wait() {
                        self.exit_status = Some(status);
                        Termination::Exited
                    } else {
                        self.signal_terminate();
                        Termination::TerminateRequested {
                            deadline: Instant::now() + grace.terminate,
                        }
                    }
                }
                Termination::TerminateRequested { deadline } => {
                    match timeout_at(deadline, self.child.wait()).await {
                        Ok(status) => {
                            self.exit_status = status.ok();
                            Termination::Exited
                        }
                        Err(_) => {
                            tracing::warn!("Worker {:?} ignored SIGTERM, killing", self.pid);
                            self.signal_kill();
                            Termination::KillRequested {
                                deadline: Instant::now() + grace.kill,
                            }
                        }
                    }
                }
                Termination::KillRequested { deadline } => {
                    match timeout_at(deadline, self.child.wait()).await {
                        Ok(status) => {
                            self.exit_status = status.ok();
                        }
                        Err(_) => {
                            tracing::warn!("Worker {:?} still not reaped after SIGKILL", self.pid);
                        }
                    }
                    Termination::Exited
                }
                Termination::Exited => {
                    // Anything the snippet forked is still in the group.
                    #[cfg(unix)]
                    self.signal_group(libc::SIGKILL);
                    self.pid = None;
                    return self.exit_status;
                }
            };
        }
    }

    /// Last bytes the worker process itself wrote to stderr.
    ///
    /// Snippet stderr is captured separately and returned in the outcome;
    /// this only holds interpreter-level noise such as bootstrap tracebacks.
    pub async fn stderr_tail(&mut self) -> String {
        let Some(mut handle) = self.stderr.take() else {
            return String::new();
        };
        match timeout(STDERR_DRAIN_WAIT, &mut handle).await {
            Ok(Ok(tail)) => tail,
            Ok(Err(_)) => String::new(),
            Err(_) => {
                handle.abort();
                String::new()
            }
        }
    }

    fn signal_terminate(&mut self) {
        #[cfg(unix)]
        self.signal_group(libc::SIGTERM);

        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!("Failed to kill worker: {}", e);
            }
        }
    }

    fn signal_kill(&mut self) {
        #[cfg(unix)]
        self.signal_group(libc::SIGKILL);

        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Failed to kill worker: {}", e);
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: i32) {
        let Some(pid) = self.pid else {
            return;
        };
        // SAFETY: plain syscall on the group we created at spawn.
        let result = unsafe { libc::kill(-(pid as i32), signal) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            // ESRCH: the group is already gone.
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!("Failed to signal worker {}: {}", pid, err);
            }
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if self.state != Termination::Exited {
            #[cfg(unix)]
            self.signal_group(libc::SIGKILL);
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}
