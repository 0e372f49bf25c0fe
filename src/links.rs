//! Link rewriting.
//!
//! Org links in note bodies are found by [`parser`], resolved against the
//! note graph by [`resolver`], and rendered in wikilink syntax. A link that
//! cannot be resolved is left exactly as written and reported.

pub mod attachments;
pub mod parser;
pub mod resolver;

use std::ops::Range;

use serde::Serialize;

use crate::models::{Note, NoteId, TargetSpec};

pub use attachments::{AttachmentPlan, plan_attachments};
pub use parser::{classify_target, scan_links, scan_raw};
pub use resolver::{LinkResolver, NoteIndex, Resolution, ResolvedLink, UnresolvedReason};

/// A link that was left as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLink {
    pub note_id: NoteId,
    pub raw_target: String,
    pub reason: String,
}

/// Replacement text for one link occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub span: Range<usize>,
    pub text: String,
    pub resolved: bool,
}

/// Resolves every link in `body`, in order of appearance.
///
/// Unresolved occurrences get their original text as replacement, so
/// applying the result never loses a label.
pub fn plan_rewrites(
    body: &str,
    note: &Note,
    resolver: &LinkResolver<'_>,
) -> (Vec<Replacement>, Vec<UnresolvedLink>) {
    let mut replacements = Vec::new();
    let mut unresolved = Vec::new();

    for link in scan_links(body, note.id()) {
        match resolver.resolve(&link.target, link.display_text.as_deref(), note) {
            Resolution::Resolved(resolved) => replacements.push(Replacement {
                span: link.span,
                text: resolved.text,
                resolved: true,
            }),
            Resolution::Unresolved(reason) => {
                tracing::debug!(
                    note_id = %note.id(),
                    target = %link.raw_target,
                    %reason,
                    "leaving link unresolved"
                );
                unresolved.push(UnresolvedLink {
                    note_id: note.id().clone(),
                    raw_target: link.raw_target,
                    reason: reason.to_string(),
                });
                replacements.push(Replacement {
                    text: body[link.span.clone()].to_string(),
                    span: link.span,
                    resolved: false,
                });
            }
        }
    }

    (replacements, unresolved)
}

/// Substitutes non-overlapping, ordered replacements into `body`.
pub fn apply_replacements(body: &str, replacements: &[Replacement]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for replacement in replacements {
        out.push_str(&body[cursor..replacement.span.start]);
        out.push_str(&replacement.text);
        cursor = replacement.span.end;
    }
    out.push_str(&body[cursor..]);
    out
}

/// Rewrites every link in `body` without any prose conversion.
///
/// Running it again on its own output changes nothing.
pub fn rewrite_body(
    body: &str,
    note: &Note,
    resolver: &LinkResolver<'_>,
) -> (String, Vec<UnresolvedLink>) {
    let (replacements, unresolved) = plan_rewrites(body, note, resolver);
    (apply_replacements(body, &replacements), unresolved)
}

/// Reduces text that may contain org links to what a reader sees: each link
/// becomes its label, or its target without the link type.
pub fn plain_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for link in scan_raw(text) {
        out.push_str(&text[cursor..link.span.start]);
        match &link.label {
            Some(label) => out.push_str(label),
            None => match classify_target(&link.target) {
                TargetSpec::FuzzyTitle(title) => out.push_str(&title),
                TargetSpec::Heading(heading) => out.push_str(&heading),
                _ => out.push_str(&link.target),
            },
        }
        cursor = link.span.end;
    }
    out.push_str(&text[cursor..]);
    out.trim().to_string()
}
