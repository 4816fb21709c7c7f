//! Values that may cross the worker process boundary.
//!
//! The set of transferable kinds is closed: null, booleans, 64-bit integers,
//! finite floats, strings, and lists/string-keyed maps of those, nested at
//! most [`MAX_DEPTH`] levels. The worker bootstrap applies the same rules on
//! its side before anything is written back.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Deepest nesting accepted at the transfer boundary.
pub const MAX_DEPTH: usize = 64;

/// Variable namespace of a session, keyed by variable name.
pub type Namespace = BTreeMap<String, Value>;

/// A transferable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this value can be handed to a worker and read back unchanged.
    pub fn is_transferable(&self) -> bool {
        self.check_depth(0)
    }

    fn check_depth(&self, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Str(_) => true,
            Value::Float(f) => f.is_finite(),
            Value::List(items) => items.iter().all(|v| v.check_depth(depth + 1)),
            Value::Map(entries) => entries.values().all(|v| v.check_depth(depth + 1)),
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Human-readable rendering, cut to `max_chars` characters.
    ///
    /// Strings render raw; everything else renders as JSON.
    pub fn render(&self, max_chars: usize) -> String {
        let text = self.to_string();
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
            None => text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "{other:?}"),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

/// Copy of `namespace` holding only transferable entries.
///
/// Returns the copy and the names that were left behind.
pub fn transferable_snapshot(namespace: &Namespace) -> (Namespace, Vec<String>) {
    let mut dropped = Vec::new();
    let snapshot = namespace
        .iter()
        .filter(|(name, value)| {
            let keep = value.is_transferable();
            if !keep {
                dropped.push((*name).clone());
            }
            keep
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    (snapshot, dropped)
}
