//! Per-run metadata threaded from the caller through to tool executions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key identifying the end user a run acts for.
pub const USER_ID_KEY: &str = "user_id";

/// Opaque key/value metadata attached to a run.
///
/// Only [`USER_ID_KEY`] has meaning to the runtime; everything else is carried
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunMetadata(BTreeMap<String, Value>);

impl RunMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying only a user id.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let mut meta = Self::new();
        meta.insert(USER_ID_KEY, Value::String(user_id.into()));
        meta
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The caller's user id, normalised to a string.
    ///
    /// Accepts both JSON strings and integers; blank strings count as absent.
    pub fn user_id(&self) -> Option<String> {
        match self.0.get(USER_ID_KEY)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for RunMetadata {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}
