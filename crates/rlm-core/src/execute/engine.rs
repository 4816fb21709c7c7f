//! Process-isolated snippet execution against a session.

use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::ipc::{Grace, WorkerOutcome, WorkerProcess, WorkerRequest, find_interpreter};
use crate::session::SessionState;
use crate::value::transferable_snapshot;

use super::output::{sanitize, truncate_output};

/// Output returned for a snippet that was empty after cleanup.
pub const EMPTY_CODE_OUTPUT: &str = "(empty code)";

/// Why a run did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Session execution quota used up. Terminal for the session.
    QuotaExceeded,
    /// Worker was killed at the deadline.
    Timeout,
    /// The snippet itself raised.
    Runtime,
    /// Worker exited without a readable outcome.
    NoResult,
    /// No worker could be started.
    WorkerUnavailable,
}

/// Result of one snippet run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Captured stdout, plus stderr under a `[stderr]` label, capped.
    pub output: String,
    /// Wall-clock time spent on the run.
    pub execution_time: Duration,
    /// Whether the snippet completed.
    pub success: bool,
    /// Error text when `success` is false.
    pub error: Option<String>,
    /// Classification of `error`.
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    fn completed(output: String, execution_time: Duration) -> Self {
        Self {
            output,
            execution_time,
            success: true,
            error: None,
            failure: None,
        }
    }

    fn failed(kind: FailureKind, error: String, execution_time: Duration) -> Self {
        Self {
            output: String::new(),
            execution_time,
            success: false,
            error: Some(error),
            failure: Some(kind),
        }
    }

    /// Whether the run was refused for quota.
    pub fn is_quota_exceeded(&self) -> bool {
        self.failure == Some(FailureKind::QuotaExceeded)
    }

    /// Whether the run was killed at the deadline.
    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }
}

/// Runs snippets in fresh worker processes under the configured limits.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn grace(&self) -> Grace {
        Grace {
            terminate: self.config.terminate_grace,
            kill: self.config.kill_grace,
        }
    }

    /// Run `code` against `session`.
    ///
    /// Every failure is reported in the returned result; the engine stays
    /// usable for the next call. The execution counter moves on every call
    /// that passes the quota check. The namespace only changes when the
    /// worker delivered a successful outcome.
    pub async fn run(&self, session: &mut SessionState, code: &str) -> ExecutionResult {
        let max = self.config.max_executions;
        if session.execution_count() >= max {
            return ExecutionResult::failed(
                FailureKind::QuotaExceeded,
                format!(
                    "Session limit reached ({max} executions). STOP here and summarize your \
                     findings from the results you already gathered. Do NOT reset the session \
                     to re-analyze the same file."
                ),
                Duration::ZERO,
            );
        }

        let code = sanitize(code);
        session.record_execution();

        if code.is_empty() {
            return ExecutionResult::completed(EMPTY_CODE_OUTPUT.to_string(), Duration::ZERO);
        }

        let start = Instant::now();

        let (namespace, left_behind) = transferable_snapshot(session.namespace());
        if !left_behind.is_empty() {
            tracing::debug!(
                "Not transferring untransferable variables: {}",
                left_behind.join(", ")
            );
        }

        let interpreter = match find_interpreter(self.config.interpreter.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                return ExecutionResult::failed(
                    FailureKind::WorkerUnavailable,
                    e.to_string(),
                    start.elapsed(),
                );
            }
        };
        let mut worker = match WorkerProcess::spawn(&interpreter) {
            Ok(worker) => worker,
            Err(e) => {
                return ExecutionResult::failed(
                    FailureKind::WorkerUnavailable,
                    e.to_string(),
                    start.elapsed(),
                );
            }
        };

        let request = WorkerRequest { code, namespace };
        let exchange = async {
            worker.send(&request).await?;
            worker.recv().await
        };
        let exchanged = tokio::time::timeout(self.config.execution_timeout, exchange).await;

        match exchanged {
            Err(_) => {
                tracing::warn!(
                    "Worker {:?} exceeded {:?}, terminating",
                    worker.pid(),
                    self.config.execution_timeout
                );
                worker.shutdown(self.grace()).await;
                ExecutionResult::failed(
                    FailureKind::Timeout,
                    format!(
                        "TIMEOUT after {:.1}s. Code was killed. Try a completely different \
                         approach (avoid loops, use string methods or sampling instead). \
                         Do NOT retry the same code.",
                        self.config.execution_timeout.as_secs_f64()
                    ),
                    start.elapsed(),
                )
            }
            Ok(Ok(Some(outcome))) => {
                worker.reap(self.grace()).await;
                self.complete(session, outcome, start)
            }
            Ok(Ok(None)) => {
                let status = worker.reap(self.grace()).await;
                let tail = worker.stderr_tail().await;
                tracing::warn!(
                    "Worker exited without a result (status {:?}): {}",
                    status,
                    tail.trim()
                );
                ExecutionResult::failed(
                    FailureKind::NoResult,
                    "No result from execution".to_string(),
                    start.elapsed(),
                )
            }
            Ok(Err(e)) => {
                worker.shutdown(self.grace()).await;
                let tail = worker.stderr_tail().await;
                tracing::warn!("Worker exchange failed: {}: {}", e, tail.trim());
                ExecutionResult::failed(
                    FailureKind::NoResult,
                    format!("No result from execution: {e}"),
                    start.elapsed(),
                )
            }
        }
    }

    fn complete(
        &self,
        session: &mut SessionState,
        outcome: WorkerOutcome,
        start: Instant,
    ) -> ExecutionResult {
        let WorkerOutcome {
            success,
            stdout,
            stderr,
            error,
            variables,
            dropped,
        } = outcome;

        if !dropped.is_empty() {
            tracing::debug!(
                "Worker left untransferable variables behind: {}",
                dropped.join(", ")
            );
        }

        let mut output = stdout;
        if !stderr.is_empty() {
            output.push_str("\n[stderr]\n");
            output.push_str(&stderr);
        }
        let output = truncate_output(&output, self.config.max_output_chars);

        if success {
            let written = session.merge(variables);
            tracing::debug!("Merged {} variables into session", written);
            return ExecutionResult::completed(output, start.elapsed());
        }

        ExecutionResult {
            output,
            execution_time: start.elapsed(),
            success: false,
            error: Some(error.unwrap_or_else(|| "Unknown error".to_string())),
            failure: Some(FailureKind::Runtime),
        }
    }
}
