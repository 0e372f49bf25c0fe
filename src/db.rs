mod body;
mod schema;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::elisp::values::{
    alist_entries, decode_string_lenient, expect_int, expect_path, expect_string_list,
    plist_entries, render_plain, time_to_unix,
};
use crate::elisp::{Expr, parse_one};
use crate::models::{Note, NoteBuilder, NoteId};

use body::{NodeSpan, split_bodies};

pub use schema::ORG_ROAM_SCHEMA;

/// Problems with the source database that the user can fix.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("org-roam database not found: {0}")]
    NotFound(PathBuf),
}

/// A file tracked by org-roam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub hash: String,
    pub modified: Option<OffsetDateTime>,
}

/// One row of the `links` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub source: NoteId,
    pub dest: String,
    pub link_type: String,
    pub pos: i64,
    /// Headings enclosing the link, outermost first.
    pub outline: Vec<String>,
}

struct NodeRow {
    id: String,
    file: PathBuf,
    level: u32,
    pos: i64,
    title: String,
    properties: Vec<(String, String)>,
}

/// Read-only access to an org-roam database.
pub struct OrgRoamDatabase {
    conn: Connection,
}

impl OrgRoamDatabase {
    /// Opens the database at `path` read-only.
    ///
    /// The file must exist; a missing file is a [`SourceError::NotFound`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SourceError::NotFound(path.to_path_buf()).into());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open org-roam database {}", path.display()))?;
        tracing::info!(path = %path.display(), "opened org-roam database");
        Ok(Self { conn })
    }

    /// Wraps an existing connection, e.g. an in-memory fixture.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// All tracked files, ordered by path.
    pub fn read_files(&self) -> Result<Vec<SourceFile>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file, hash, mtime FROM files ORDER BY file")
            .context("Failed to query files")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                column_text(row, 0)?,
                column_text(row, 1)?,
                column_text(row, 2)?,
            ))
        })?;

        let mut files = Vec::new();
        for row in rows {
            let (file, hash, mtime) = row?;
            let Some(file) = file else { continue };
            let modified = mtime
                .and_then(|raw| parse_one(&raw).ok())
                .and_then(|expr| time_to_unix(&expr).ok())
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
            files.push(SourceFile {
                path: decode_path(&file),
                hash: hash.map(|h| decode_string_lenient(&h)).unwrap_or_default(),
                modified,
            });
        }
        Ok(files)
    }

    /// Identifiers of every node.
    pub fn node_ids(&self) -> Result<HashSet<NoteId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM nodes")?;
        let rows = stmt.query_map([], |row| column_text(row, 0))?;
        let mut ids = HashSet::new();
        for id in rows {
            if let Some(id) = id? {
                ids.insert(NoteId::new(decode_string_lenient(&id)));
            }
        }
        Ok(ids)
    }

    /// Builds one [`Note`] per node, ordered by file and position.
    ///
    /// Node bodies are read from the org files on disk. A file that cannot
    /// be read is logged and its nodes get empty bodies. Nodes whose columns
    /// cannot be decoded are skipped with a warning.
    pub fn read_notes(&self) -> Result<Vec<Note>> {
        let nodes = self.read_node_rows()?;
        let mut tags = self.read_multi("SELECT node_id, tag FROM tags ORDER BY rowid")?;
        let mut aliases = self.read_multi("SELECT node_id, alias FROM aliases ORDER BY rowid")?;
        let mut refs = self.read_refs()?;
        let modified: HashMap<PathBuf, OffsetDateTime> = self
            .read_files()?
            .into_iter()
            .filter_map(|file| file.modified.map(|time| (file.path, time)))
            .collect();

        let mut by_file: BTreeMap<&Path, Vec<&NodeRow>> = BTreeMap::new();
        for node in &nodes {
            by_file.entry(node.file.as_path()).or_default().push(node);
        }

        let mut bodies: HashMap<&str, String> = HashMap::new();
        for (file, file_nodes) in &by_file {
            let text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %err, "cannot read note file, bodies will be empty");
                    String::new()
                }
            };
            let spans: Vec<NodeSpan<'_>> = file_nodes
                .iter()
                .map(|node| NodeSpan {
                    id: &node.id,
                    title: &node.title,
                    level: node.level,
                    pos: node.pos,
                })
                .collect();
            for (node, body) in file_nodes.iter().zip(split_bodies(&text, &spans)) {
                bodies.insert(&node.id, body);
            }
        }

        let notes = nodes
            .iter()
            .map(|node| {
                let builder = NoteBuilder::new()
                    .id(node.id.as_str())
                    .title(node.title.as_str())
                    .source_path(node.file.clone())
                    .level(node.level)
                    .tags(tags.remove(&node.id).unwrap_or_default())
                    .aliases(aliases.remove(&node.id).unwrap_or_default())
                    .refs(refs.remove(&node.id).unwrap_or_default())
                    .properties(node.properties.clone())
                    .raw_body(bodies.remove(node.id.as_str()).unwrap_or_default());
                match modified.get(&node.file) {
                    Some(&time) => builder.modified(time).build(),
                    None => builder.build(),
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(notes = notes.len(), files = by_file.len(), "read org-roam graph");
        Ok(notes)
    }

    /// Rows of the `links` table whose source is `note_id`, by position.
    pub fn read_links(&self, note_id: &NoteId) -> Result<Vec<LinkRecord>> {
        let encoded = Expr::Str(note_id.as_str().to_string()).to_string();
        let mut stmt = self.conn.prepare(
            "SELECT pos, dest, type, properties FROM links WHERE source = ?1 OR source = ?2 ORDER BY pos",
        )?;
        let rows = stmt.query_map([encoded.as_str(), note_id.as_str()], |row| {
            Ok((
                column_text(row, 0)?,
                column_text(row, 1)?,
                column_text(row, 2)?,
                column_text(row, 3)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (pos, dest, link_type, properties) = row?;
            links.push(LinkRecord {
                source: note_id.clone(),
                dest: dest.map(|d| decode_string_lenient(&d)).unwrap_or_default(),
                link_type: link_type
                    .map(|t| decode_string_lenient(&t))
                    .unwrap_or_default(),
                pos: pos.and_then(|p| decode_int(&p)).unwrap_or(0),
                outline: properties.as_deref().map(decode_outline).unwrap_or_default(),
            });
        }
        Ok(links)
    }

    fn read_node_rows(&self) -> Result<Vec<NodeRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, file, level, pos, title, properties FROM nodes ORDER BY file, pos")
            .context("Failed to query nodes")?;
        let rows = stmt.query_map([], |row| {
            Ok([
                column_text(row, 0)?,
                column_text(row, 1)?,
                column_text(row, 2)?,
                column_text(row, 3)?,
                column_text(row, 4)?,
                column_text(row, 5)?,
            ])
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let [id, file, level, pos, title, properties] = row?;
            match decode_node(id, file, level, pos, title, properties) {
                Ok(node) => nodes.push(node),
                Err(err) => tracing::warn!(error = %err, "skipping undecodable node"),
            }
        }

        // Columns hold printed strings, so SQL ordering is only approximate.
        nodes.sort_by(|a, b| a.file.cmp(&b.file).then(a.pos.cmp(&b.pos)));
        Ok(nodes)
    }

    /// `node_id -> values` for a two-column query, values in row order.
    fn read_multi(&self, sql: &str) -> Result<HashMap<String, Vec<String>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((column_text(row, 0)?, column_text(row, 1)?)))?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            if let (Some(id), Some(value)) = row? {
                map.entry(decode_string_lenient(&id))
                    .or_default()
                    .push(decode_string_lenient(&value));
            }
        }
        Ok(map)
    }

    /// Refs formatted as `type:ref`, e.g. `https://example.com`.
    fn read_refs(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT node_id, ref, type FROM refs ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                column_text(row, 0)?,
                column_text(row, 1)?,
                column_text(row, 2)?,
            ))
        })?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            if let (Some(id), Some(reference), Some(kind)) = row? {
                let formatted = format!(
                    "{}:{}",
                    decode_string_lenient(&kind),
                    decode_string_lenient(&reference)
                );
                map.entry(decode_string_lenient(&id))
                    .or_default()
                    .push(formatted);
            }
        }
        Ok(map)
    }
}

fn decode_node(
    id: Option<String>,
    file: Option<String>,
    level: Option<String>,
    pos: Option<String>,
    title: Option<String>,
    properties: Option<String>,
) -> Result<NodeRow> {
    let id = id
        .map(|raw| decode_string_lenient(&raw))
        .filter(|id| !id.is_empty())
        .context("node without id")?;
    let file = file
        .map(|raw| decode_path(&raw))
        .with_context(|| format!("node {id} has no file"))?;
    let level = level
        .as_deref()
        .and_then(decode_int)
        .and_then(|n| u32::try_from(n).ok())
        .with_context(|| format!("node {id} has an invalid level"))?;
    let pos = pos
        .as_deref()
        .and_then(decode_int)
        .with_context(|| format!("node {id} has an invalid position"))?;
    let title = title.map(|raw| decode_string_lenient(&raw)).unwrap_or_default();

    let properties = match properties.as_deref().map(parse_one) {
        None => Vec::new(),
        Some(Ok(expr)) => alist_entries(&expr)
            .map(|entries| {
                entries
                    .into_iter()
                    .map(|(key, value)| (key, render_plain(&value)))
                    .collect()
            })
            .unwrap_or_else(|err| {
                tracing::warn!(note_id = %id, error = %err, "ignoring malformed properties");
                Vec::new()
            }),
        Some(Err(err)) => {
            tracing::warn!(note_id = %id, error = %err, "ignoring unparsable properties");
            Vec::new()
        }
    };

    Ok(NodeRow {
        id,
        file,
        level,
        pos,
        title,
        properties,
    })
}

fn decode_path(raw: &str) -> PathBuf {
    parse_one(raw)
        .and_then(|expr| expect_path(&expr))
        .unwrap_or_else(|_| PathBuf::from(decode_string_lenient(raw)))
}

/// The `:outline` entry of a link's property list.
fn decode_outline(raw: &str) -> Vec<String> {
    parse_one(raw)
        .and_then(|expr| plist_entries(&expr))
        .ok()
        .and_then(|entries| entries.into_iter().find(|(key, _)| key == "outline"))
        .and_then(|(_, value)| expect_string_list(&value).ok())
        .unwrap_or_default()
}

fn decode_int(raw: &str) -> Option<i64> {
    parse_one(raw).ok().and_then(|expr| expect_int(&expr).ok())
}

/// Reads a column as text whatever its storage class.
fn column_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(n) => Some(n.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    })
}

#[cfg(test)]
mod tests;
