//! Session state and the registry that owns it.

mod registry;
mod state;

pub use registry::{ResetReceipt, SessionHandle, SessionRegistry};
pub use state::{CONTEXT_KEY, CONTEXT_LENGTH_KEY, FILE_PATH_KEY, SessionInfo, SessionState};
