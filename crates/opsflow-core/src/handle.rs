//! Operation handles correlate a mutating call with its status polls

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator for handles made of several IDs
pub const COMPOSITE_SEPARATOR: char = '#';

/// Opaque identifier returned by a mutating call (instance ID, task ID, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Join several IDs into one handle, e.g. `instance#backup`.
    ///
    /// Returns `None` when a part contains [`COMPOSITE_SEPARATOR`], so
    /// [`parts`](Self::parts) always yields exactly the IDs joined here.
    pub fn composite<S: AsRef<str>>(parts: &[S]) -> Option<Self> {
        let parts: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
        if parts.iter().any(|p| p.contains(COMPOSITE_SEPARATOR)) {
            return None;
        }
        Some(Self(parts.join(&COMPOSITE_SEPARATOR.to_string())))
    }

    /// Split a composite handle back into its IDs, in the order they were
    /// joined
    pub fn parts(&self) -> Vec<&str> {
        self.0.split(COMPOSITE_SEPARATOR).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OperationHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for OperationHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for OperationHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
