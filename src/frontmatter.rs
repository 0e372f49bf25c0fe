//! YAML frontmatter for converted notes.
//!
//! Keys come out in a fixed order: `title`, `aliases`, `tags`, `links`,
//! `modified` when enabled, then whatever note properties remain,
//! lower-cased, in source order. Sequence fields are always sequences, even
//! when empty.

use serde_yaml::{Mapping, Value};
use time::format_description::well_known::Rfc3339;

use crate::config::ConversionConfig;
use crate::links::{LinkResolver, Resolution, UnresolvedLink, classify_target, plain_text};
use crate::models::{Note, TargetSpec};

const RESERVED_KEYS: &[&str] = &["title", "aliases", "tags", "links", "modified"];

/// Properties whose content is carried elsewhere or that Org computes.
const SKIPPED_PROPERTIES: &[&str] = &[
    "ID",
    "ROAM_ALIASES",
    "ROAM_REFS",
    "CATEGORY",
    "FILE",
    "ALLTAGS",
    "BLOCKED",
    "ITEM",
    "PRIORITY",
    "TODO",
    "TAGS",
    "CLOSED",
    "DEADLINE",
    "SCHEDULED",
    "TIMESTAMP",
    "TIMESTAMP_IA",
    "CLOCKSUM",
    "CLOCKSUM_T",
];

/// Aliases and refs of one note after link resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub aliases: Vec<String>,
    pub refs: Vec<String>,
    pub unresolved: Vec<UnresolvedLink>,
}

/// Resolves a note's aliases to display text and its refs to link strings.
///
/// Refs come from the refs table first, then from `ROAM_REFS` tokens.
/// `id:`, path and `roam:` refs become wikilinks when they resolve and are
/// kept verbatim (and reported) when they do not; all other refs are kept
/// as written.
pub fn resolve_metadata(note: &Note, resolver: &LinkResolver<'_>) -> ResolvedMetadata {
    let mut resolved = ResolvedMetadata::default();

    for alias in note.aliases() {
        push_unique(&mut resolved.aliases, plain_text(alias));
    }

    let declared = note
        .property("ROAM_REFS")
        .map(split_refs)
        .unwrap_or_default();
    for reference in note.refs().iter().cloned().chain(declared) {
        let target = classify_target(&reference);
        let is_note_ref = match &target {
            TargetSpec::Identifier(_) | TargetSpec::Path { .. } => true,
            TargetSpec::FuzzyTitle(_) => reference.to_ascii_lowercase().starts_with("roam:"),
            TargetSpec::WebUri(_) | TargetSpec::Heading(_) => false,
        };
        if !is_note_ref {
            push_unique(&mut resolved.refs, reference);
            continue;
        }
        match resolver.resolve(&target, None, note) {
            Resolution::Resolved(link) => push_unique(&mut resolved.refs, link.text),
            Resolution::Unresolved(reason) => {
                resolved.unresolved.push(UnresolvedLink {
                    note_id: note.id().clone(),
                    raw_target: reference.clone(),
                    reason: reason.to_string(),
                });
                push_unique(&mut resolved.refs, reference);
            }
        }
    }

    resolved
}

/// Splits a `ROAM_REFS` value on whitespace, honoring double quotes.
fn split_refs(value: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in value.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    refs.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        refs.push(current);
    }
    refs
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !value.is_empty() && !values.contains(&value) {
        values.push(value);
    }
}

/// Makes a tag acceptable to the destination: no spaces, no leading `#`.
fn sanitize_tag(tag: &str) -> String {
    tag.trim()
        .trim_start_matches('#')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Builds the frontmatter mapping for `note`.
pub fn synthesize(
    note: &Note,
    resolved_aliases: &[String],
    resolved_refs: &[String],
    conversion: &ConversionConfig,
) -> Mapping {
    let mut tags = Vec::new();
    for tag in note.tags() {
        let tag = if conversion.convert_tags {
            sanitize_tag(tag)
        } else {
            tag.clone()
        };
        push_unique(&mut tags, tag);
    }

    let sequence = |values: &[String]| {
        Value::Sequence(values.iter().cloned().map(Value::String).collect())
    };

    let mut mapping = Mapping::new();
    mapping.insert("title".into(), note.title().into());
    mapping.insert("aliases".into(), sequence(resolved_aliases));
    mapping.insert("tags".into(), sequence(&tags));
    mapping.insert("links".into(), sequence(resolved_refs));

    let modified = note
        .modified()
        .filter(|_| conversion.preserve_creation_date)
        .and_then(|time| time.format(&Rfc3339).ok());
    if let Some(modified) = modified {
        mapping.insert("modified".into(), modified.into());
    }

    for (key, value) in note.properties() {
        if SKIPPED_PROPERTIES
            .iter()
            .any(|skipped| skipped.eq_ignore_ascii_case(key))
        {
            continue;
        }
        let mut key = key.to_lowercase();
        if RESERVED_KEYS.contains(&key.as_str()) {
            key = format!("org_{key}");
        }
        let key = Value::String(key);
        if !mapping.contains_key(&key) {
            mapping.insert(key, value.as_str().into());
        }
    }

    mapping
}

/// Renders a complete Markdown document: frontmatter block, blank line,
/// body.
pub fn render_document(frontmatter: &Mapping, body: &str) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(frontmatter)?;
    let mut document = format!("---\n{yaml}---\n");
    if !body.trim().is_empty() {
        document.push('\n');
        document.push_str(body.trim_start_matches('\n'));
        if !document.ends_with('\n') {
            document.push('\n');
        }
    }
    Ok(document)
}
