use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::NoteId;

/// One source document of the wiki graph.
///
/// Notes are read once per run and never mutated afterwards; every stage of
/// the pipeline borrows them immutably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    id: NoteId,
    title: String,
    source_path: PathBuf,
    level: u32,
    tags: Vec<String>,
    aliases: Vec<String>,
    refs: Vec<String>,
    properties: Vec<(String, String)>,
    raw_body: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    modified: Option<OffsetDateTime>,
}

impl Note {
    pub fn id(&self) -> &NoteId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Original file holding this note.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Outline depth: 0 for a file-level node, otherwise the heading level.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn refs(&self) -> &[String] {
        &self.refs
    }

    /// Node properties in source order. Keys are unique.
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// Looks up a property case-insensitively.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn raw_body(&self) -> &str {
        &self.raw_body
    }

    /// Last modification time of the source file, when org-roam recorded one.
    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.modified
    }
}

/// Builder for constructing `Note` instances with optional fields.
///
/// # Examples
///
/// ```
/// use roam2md::NoteBuilder;
///
/// let note = NoteBuilder::new()
///     .id("A1")
///     .title("Rust ownership")
///     .source_path("/org/rust.org")
///     .build();
///
/// assert_eq!(note.id().as_str(), "A1");
/// assert_eq!(note.title(), "Rust ownership");
/// assert!(note.tags().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct NoteBuilder {
    id: Option<NoteId>,
    title: Option<String>,
    source_path: Option<PathBuf>,
    level: u32,
    tags: Vec<String>,
    aliases: Vec<String>,
    refs: Vec<String>,
    properties: Vec<(String, String)>,
    raw_body: String,
    modified: Option<OffsetDateTime>,
}

impl NoteBuilder {
    /// Creates a new `NoteBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<NoteId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn refs(mut self, refs: Vec<String>) -> Self {
        self.refs = refs;
        self
    }

    /// Sets a property. A repeated key (case-insensitive) replaces the
    /// earlier value in place so keys stay unique.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .properties
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key, value)),
        }
        self
    }

    pub fn properties(mut self, properties: Vec<(String, String)>) -> Self {
        self.properties.clear();
        for (key, value) in properties {
            self = self.property(key, value);
        }
        self
    }

    pub fn raw_body(mut self, body: impl Into<String>) -> Self {
        self.raw_body = body.into();
        self
    }

    pub fn modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Builds the `Note`.
    ///
    /// The title defaults to the empty string and the source path to
    /// `<id>.org`.
    ///
    /// # Panics
    ///
    /// Panics if `id` has not been set.
    pub fn build(self) -> Note {
        let id = self.id.expect("id is required");
        let source_path = self
            .source_path
            .unwrap_or_else(|| PathBuf::from(format!("{id}.org")));
        Note {
            id,
            title: self.title.unwrap_or_default(),
            source_path,
            level: self.level,
            tags: self.tags,
            aliases: self.aliases,
            refs: self.refs,
            properties: self.properties,
            raw_body: self.raw_body,
            modified: self.modified,
        }
    }
}
