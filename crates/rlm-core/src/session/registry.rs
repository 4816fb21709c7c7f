//! Registry of live sessions.
//!
//! The registry is an ordinary owned value handed to whatever adapter
//! dispatches calls. Each session sits behind its own async mutex, so calls
//! for one identifier run strictly one after another while other sessions
//! proceed in parallel.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, RwLock};

use crate::config::{EngineConfig, ReloadPolicy};
use crate::error::{Error, Result};
use crate::execute::{ExecutionEngine, ExecutionResult};
use crate::load::LoadedContent;
use crate::value::{Namespace, Value};

use super::state::{SessionInfo, SessionState};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Confirmation of an accepted reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetReceipt {
    /// Resets used by the identifier, including this one.
    pub used: u32,
    /// Reset quota.
    pub limit: u32,
}

/// Owns every session and the reset ledger.
pub struct SessionRegistry {
    engine: ExecutionEngine,
    sessions: RwLock<FxHashMap<String, SessionHandle>>,
    /// Resets per identifier. Outlives the sessions themselves.
    resets: Mutex<FxHashMap<String, u32>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: ExecutionEngine::new(config),
            sessions: RwLock::new(FxHashMap::default()),
            resets: Mutex::new(FxHashMap::default()),
        }
    }

    /// The engine used for `execute`.
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Look up a session without creating it.
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Existing session for `id`, or a new one seeded with `seed`.
    ///
    /// The seed is ignored when the session already exists.
    pub async fn get_or_create(&self, id: &str, seed: Option<Namespace>) -> SessionHandle {
        if let Some(handle) = self.get(id).await {
            return handle;
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(id) {
            return handle.clone();
        }
        let handle = self.fresh(id, seed).await;
        sessions.insert(id.to_string(), handle.clone());
        tracing::info!("Created session '{}'", id);
        handle
    }

    /// Discard any state for `id` and start over from `seed`.
    ///
    /// Under [`ReloadPolicy::CountsAsReset`] replacing an existing session
    /// consumes a reset and is refused once the quota is exhausted.
    pub async fn replace(&self, id: &str, seed: Namespace) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;

        if self.config().reload_policy == ReloadPolicy::CountsAsReset && sessions.contains_key(id)
        {
            self.consume_reset(id).await?;
        }

        let handle = self.fresh(id, Some(seed)).await;
        if sessions.insert(id.to_string(), handle.clone()).is_some() {
            tracing::info!("Replaced session '{}'", id);
        } else {
            tracing::info!("Created session '{}'", id);
        }
        Ok(handle)
    }

    /// Replace `id` with freshly loaded content.
    pub async fn load(&self, id: &str, content: LoadedContent) -> Result<SessionHandle> {
        self.replace(id, content.seed).await
    }

    /// Discard the session for `id`, counted against the reset quota.
    ///
    /// A refused reset leaves the session untouched.
    pub async fn reset(&self, id: &str) -> Result<ResetReceipt> {
        let used = self.consume_reset(id).await?;
        self.sessions.write().await.remove(id);
        tracing::info!("Reset session '{}' ({}/{})", id, used, self.config().max_resets);
        Ok(ResetReceipt {
            used,
            limit: self.config().max_resets,
        })
    }

    /// Drop the session for `id` without touching the reset ledger.
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Run `code` in session `id`, creating the session if needed.
    pub async fn execute(&self, id: &str, code: &str) -> ExecutionResult {
        let handle = self.get_or_create(id, None).await;
        let mut state = handle.lock().await;
        let result = self.engine.run(&mut state, code).await;
        tracing::debug!(
            "Session '{}' execution {}/{}: success={} in {:?}",
            id,
            state.execution_count(),
            self.config().max_executions,
            result.success,
            result.execution_time
        );
        result
    }

    /// Value of `name` in session `id`.
    pub async fn variable(&self, id: &str, name: &str) -> Result<Option<Value>> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let state = handle.lock().await;
        Ok(state.get(name).cloned())
    }

    /// Status of session `id`.
    pub async fn info(&self, id: &str) -> Result<SessionInfo> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let state = handle.lock().await;
        let mut info = state.info(id, self.config());
        info.reset_count = self.reset_count(id).await;
        Ok(info)
    }

    /// Resets used by `id` so far.
    pub async fn reset_count(&self, id: &str) -> u32 {
        self.resets.lock().await.get(id).copied().unwrap_or(0)
    }

    /// Identifiers of live sessions, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn fresh(&self, id: &str, seed: Option<Namespace>) -> SessionHandle {
        let resets = self.reset_count(id).await;
        Arc::new(Mutex::new(SessionState::new(seed).with_reset_count(resets)))
    }

    async fn consume_reset(&self, id: &str) -> Result<u32> {
        let limit = self.config().max_resets;
        let mut resets = self.resets.lock().await;
        let used = resets.entry(id.to_string()).or_insert(0);
        if *used >= limit {
            tracing::warn!("Refusing reset of session '{}': limit {} reached", id, limit);
            return Err(Error::ResetQuotaExceeded {
                session: id.to_string(),
                limit,
            });
        }
        *used += 1;
        Ok(*used)
    }
}
