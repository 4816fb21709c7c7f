//! Loading file content into a session seed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::session::{CONTEXT_KEY, CONTEXT_LENGTH_KEY, FILE_PATH_KEY};
use crate::value::{Namespace, Value};

/// Below this many characters, reading the file directly is cheaper.
pub const SMALL_FILE_THRESHOLD: usize = 50_000;

/// One file that was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub path: PathBuf,
    /// Key under which a multi-file load exposes this file.
    pub name: String,
    pub chars: usize,
    pub lines: usize,
}

/// Content ready to seed a session.
#[derive(Debug, Clone)]
pub struct LoadedContent {
    /// Namespace the session starts from.
    pub seed: Namespace,
    pub files: Vec<LoadedFile>,
    /// Requested paths that did not exist (multi-file loads only).
    pub missing: Vec<PathBuf>,
    pub total_chars: usize,
}

impl LoadedContent {
    /// Whether the content is small enough to read without a session.
    pub fn is_small(&self) -> bool {
        self.total_chars < SMALL_FILE_THRESHOLD
    }

    /// Rough token estimate at four characters per token.
    pub fn approx_tokens(&self) -> usize {
        self.total_chars / 4
    }

    /// Total line count across loaded files.
    pub fn total_lines(&self) -> usize {
        self.files.iter().map(|f| f.lines).sum()
    }

    /// First `max_chars` characters of single-file content.
    pub fn preview(&self, max_chars: usize) -> Option<&str> {
        let text = self.seed.get(CONTEXT_KEY)?.as_str()?;
        let cut = text
            .char_indices()
            .nth(max_chars)
            .map_or(text.len(), |(idx, _)| idx);
        Some(&text[..cut])
    }
}

/// Read a file for a single-file session.
///
/// The seed binds `context`, `context_length` and `file_path`.
pub async fn load_file(path: impl AsRef<Path>) -> Result<LoadedContent> {
    let path = path.as_ref();
    let text = read_text(path).await?;
    let file = describe(path, &text);
    let chars = file.chars;

    let mut seed = Namespace::new();
    seed.insert(CONTEXT_KEY.to_string(), Value::from(text));
    seed.insert(CONTEXT_LENGTH_KEY.to_string(), Value::from(chars));
    seed.insert(
        FILE_PATH_KEY.to_string(),
        Value::from(path.display().to_string()),
    );

    tracing::info!("Loaded {} ({} chars)", path.display(), chars);

    Ok(LoadedContent {
        seed,
        files: vec![file],
        missing: Vec::new(),
        total_chars: chars,
    })
}

/// Read several files for a cross-file session.
///
/// `context` becomes a map from file name to text. Missing paths are listed
/// in the result rather than failing the load.
pub async fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedContent> {
    let mut contexts = BTreeMap::new();
    let mut files = Vec::new();
    let mut missing = Vec::new();
    let mut total_chars = 0;

    for path in paths {
        let path = path.as_ref();
        let text = match read_text(path).await {
            Ok(text) => text,
            Err(Error::FileNotFound(path)) => {
                tracing::warn!("Skipping missing file {}", path.display());
                missing.push(path);
                continue;
            }
            Err(e) => return Err(e),
        };
        let file = describe(path, &text);
        total_chars += file.chars;
        contexts.insert(file.name.clone(), Value::from(text));
        files.push(file);
    }

    let mut seed = Namespace::new();
    seed.insert(CONTEXT_KEY.to_string(), Value::Map(contexts));
    seed.insert(CONTEXT_LENGTH_KEY.to_string(), Value::from(total_chars));

    tracing::info!("Loaded {} files ({} chars)", files.len(), total_chars);

    Ok(LoadedContent {
        seed,
        files,
        missing,
        total_chars,
    })
}

async fn read_text(path: &Path) -> Result<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::FileNotFound(path.to_path_buf()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

fn describe(path: &Path, text: &str) -> LoadedFile {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    LoadedFile {
        path: path.to_path_buf(),
        name,
        chars: text.chars().count(),
        lines: text.matches('\n').count() + 1,
    }
}
