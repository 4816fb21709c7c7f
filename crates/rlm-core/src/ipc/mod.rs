//! Inter-process communication for rlm worker processes.
//!
//! This module provides the protocol and utilities for communicating
//! with the isolated worker processes that execute snippets.

pub mod protocol;
mod worker;

pub use protocol::{WorkerOutcome, WorkerRequest, read_frame, write_frame};
pub use worker::{Grace, Termination, WorkerProcess, find_interpreter};
