use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a note in the source graph.
///
/// Wraps the org-roam node ID (usually a UUID) to prevent accidental
/// mixing with titles, paths, or other free-form strings. Ordering is plain
/// lexicographic string ordering, which every deterministic tie-break in the
/// pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Creates a new note ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying ID value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
