//! Per-session variable namespace and usage counters.

use std::time::{Duration, Instant, SystemTime};

use crate::config::EngineConfig;
use crate::value::{Namespace, Value};

/// Name under which loaded content is exposed to snippets.
pub const CONTEXT_KEY: &str = "context";

/// Name of the content length, in characters, set by the loader.
pub const CONTEXT_LENGTH_KEY: &str = "context_length";

/// Name of the loaded file path, set by the loader for single files.
pub const FILE_PATH_KEY: &str = "file_path";

/// State of one analysis session.
#[derive(Debug, Clone)]
pub struct SessionState {
    namespace: Namespace,
    execution_count: u32,
    reset_count: u32,
    created_at: SystemTime,
    started: Instant,
}

impl SessionState {
    /// Create a session seeded with `seed`.
    ///
    /// Without a seed, or when the seed lacks one, `context` is an empty string.
    pub fn new(seed: Option<Namespace>) -> Self {
        let mut namespace = seed.unwrap_or_default();
        namespace
            .entry(CONTEXT_KEY.to_string())
            .or_insert_with(|| Value::from(""));

        Self {
            namespace,
            execution_count: 0,
            reset_count: 0,
            created_at: SystemTime::now(),
            started: Instant::now(),
        }
    }

    /// Record how many resets this identifier had used when the state was made.
    pub fn with_reset_count(mut self, reset_count: u32) -> Self {
        self.reset_count = reset_count;
        self
    }

    /// The full namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespace.get(name)
    }

    /// Bind a variable directly, bypassing execution.
    ///
    /// Values that cannot cross the transfer boundary are kept here but never
    /// reach a worker.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.namespace.insert(name.into(), value.into());
    }

    /// Executions consumed so far, including refused-empty ones.
    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// Resets consumed by this identifier before the state was created.
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Time since creation.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// Length of the loaded content in characters.
    ///
    /// Uses `context_length` when the loader set it, otherwise measures `context`.
    pub fn context_length(&self) -> usize {
        if let Some(len) = self
            .get(CONTEXT_LENGTH_KEY)
            .and_then(Value::as_i64)
            .and_then(|n| usize::try_from(n).ok())
        {
            return len;
        }
        self.get(CONTEXT_KEY)
            .and_then(Value::as_str)
            .map_or(0, |s| s.chars().count())
    }

    /// Variable names other than the content itself.
    pub fn variable_names(&self) -> Vec<&str> {
        self.namespace
            .keys()
            .map(String::as_str)
            .filter(|name| *name != CONTEXT_KEY)
            .collect()
    }

    /// Status snapshot for reporting.
    pub fn info(&self, id: &str, config: &EngineConfig) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            execution_count: self.execution_count,
            max_executions: config.max_executions,
            remaining: config.max_executions.saturating_sub(self.execution_count),
            reset_count: self.reset_count,
            max_resets: config.max_resets,
            context_length: self.context_length(),
            age: self.age(),
            variables: self
                .variable_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    pub(crate) fn record_execution(&mut self) {
        self.execution_count += 1;
    }

    /// Merge a worker's variables, overwriting same-named entries.
    ///
    /// Returns the number of variables written.
    pub(crate) fn merge(&mut self, variables: Namespace) -> usize {
        let mut written = 0;
        for (name, value) in variables {
            if !value.is_transferable() {
                tracing::debug!("Skipping untransferable variable '{}' from worker", name);
                continue;
            }
            self.namespace.insert(name, value);
            written += 1;
        }
        written
    }

    #[cfg(test)]
    pub(crate) fn set_execution_count(&mut self, count: u32) {
        self.execution_count = count;
    }
}

/// Session status for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: String,
    pub execution_count: u32,
    pub max_executions: u32,
    pub remaining: u32,
    pub reset_count: u32,
    pub max_resets: u32,
    pub context_length: usize,
    pub age: Duration,
    pub variables: Vec<String>,
}
