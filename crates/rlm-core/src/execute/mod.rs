//! Execution engine for rlm sessions.
//!
//! # Architecture
//!
//! ```text
//! ExecutionEngine::run(session, code)
//!     │
//!     ├── quota check, sanitize, count
//!     │
//!     └── WorkerProcess (fresh python per snippet)
//!             │
//!             ├── IPC: WorkerRequest { code, namespace }
//!             │
//!             ├── IPC: WorkerOutcome { stdout, stderr, variables, ... }
//!             │       └── merged into SessionState, output capped
//!             │
//!             └── deadline passed: SIGTERM → grace → SIGKILL
//! ```
//!
//! # Module Structure
//!
//! - `engine` - ExecutionEngine and ExecutionResult
//! - `output` - snippet sanitizing and output truncation

mod engine;
mod output;

pub use engine::{EMPTY_CODE_OUTPUT, ExecutionEngine, ExecutionResult, FailureKind};
pub use output::{group_thousands, sanitize, truncate_output};
