use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::NoteId;

/// What a link points at, as written in the source syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetSpec {
    /// `id:<node id>`
    Identifier(NoteId),
    /// `file:<path>` with an optional `::` search option.
    Path { path: String, search: Option<String> },
    /// `roam:<title>` or a bare `[[title]]`.
    FuzzyTitle(String),
    /// Any other `scheme:` target (`https:`, `mailto:`, `cite:` ...).
    WebUri(String),
    /// `*Heading` inside the same file.
    Heading(String),
}

/// One link found in a note body, parsed fresh per body and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOccurrence {
    pub source_note_id: NoteId,
    pub target: TargetSpec,
    /// Target text exactly as written, for diagnostics.
    pub raw_target: String,
    pub display_text: Option<String>,
    /// Byte range of the whole `[[...]]` occurrence in the scanned text.
    pub span: Range<usize>,
}
