//! Core engine for rlm: sandboxed snippet execution over large, session-scoped
//! working sets.
//!
//! This crate provides:
//! - Process-isolated execution with timeout and kill escalation
//! - Cross-process namespace transfer with an explicit value set
//! - Per-session execution and reset quotas
//! - Output capping and snippet cleanup
//! - File loading into session seeds

pub mod config;
pub mod error;
pub mod execute;
pub mod ipc;
pub mod load;
pub mod session;
pub mod value;

pub use config::{EngineConfig, ReloadPolicy};
pub use error::{Error, Result};
pub use execute::{ExecutionEngine, ExecutionResult, FailureKind};
pub use load::{LoadedContent, LoadedFile, load_file, load_files};
pub use session::{ResetReceipt, SessionHandle, SessionInfo, SessionRegistry, SessionState};
pub use value::{Namespace, Value};
