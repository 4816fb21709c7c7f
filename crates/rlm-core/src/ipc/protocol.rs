//! IPC protocol messages for rlm worker processes.
//!
//! Uses length-prefixed JSON messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + UTF-8 JSON body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::value::Namespace;

/// Largest frame either side will accept.
pub const MAX_FRAME_BYTES: usize = 512 * 1024 * 1024;

/// The one request sent from parent to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Snippet source, already sanitized.
    pub code: String,
    /// Transferable copy of the session namespace.
    pub namespace: Namespace,
}

/// The one report sent from worker back to parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerOutcome {
    /// Whether the snippet ran to completion.
    pub success: bool,
    /// Text written to `sys.stdout` during the run.
    #[serde(default)]
    pub stdout: String,
    /// Text written to `sys.stderr` during the run.
    #[serde(default)]
    pub stderr: String,
    /// `"<Category>: <message>"` when the snippet raised.
    #[serde(default)]
    pub error: Option<String>,
    /// Top-level bindings after a successful run. Always empty on failure.
    #[serde(default)]
    pub variables: Namespace,
    /// Names that failed the worker-side transfer check.
    #[serde(default)]
    pub dropped: Vec<String>,
}

/// Write a message as one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    if body.len() > MAX_FRAME_BYTES {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes",
            body.len()
        )));
    }

    let len = body.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read one length-prefixed JSON frame.
///
/// Returns `Ok(None)` when the stream ends before a length prefix arrives,
/// which is how a worker that died without reporting looks from here.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(Error::Ipc(format!(
                "Failed to read IPC message length: {}",
                e
            )));
        }
    }
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_BYTES {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    let message = serde_json::from_slice(&body)
        .map_err(|e| Error::Serialization(format!("Failed to decode IPC message: {}", e)))?;

    Ok(Some(message))
}
