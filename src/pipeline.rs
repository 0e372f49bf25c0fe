//! The conversion run.
//!
//! Destination paths are allocated for the whole note set first; only then
//! do workers pick notes off a shared cursor and resolve, convert and render
//! each one independently. Workers share the read-only indexes and never
//! see each other's output. Per-note failures are collected, never
//! propagated.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::config::{Config, ConversionConfig};
use crate::convert::ProseConverter;
use crate::frontmatter::{render_document, resolve_metadata, synthesize};
use crate::links::{AttachmentPlan, LinkResolver, NoteIndex, UnresolvedLink, plan_attachments};
use crate::models::{Note, NoteId};
use crate::paths::{Collision, PathAllocation, StructureError, allocate};
use crate::protect::convert_body;

/// One rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub note_id: NoteId,
    /// Relative to the vault root.
    pub path: PathBuf,
    pub content: String,
}

/// A note whose output was withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteFailure {
    pub note_id: NoteId,
    pub reason: String,
}

/// A file to copy into the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentCopy {
    pub source: PathBuf,
    /// Relative to the vault root, `/`-separated.
    pub destination: String,
}

/// Diagnostics of one run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub dry_run: bool,
    pub written: BTreeMap<NoteId, PathBuf>,
    pub unresolved_links: Vec<UnresolvedLink>,
    pub collisions: Vec<Collision>,
    pub failures: Vec<NoteFailure>,
    pub attachments: Vec<AttachmentCopy>,
}

/// Everything a run produced, ready for the vault writer.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Rendered documents in note-ID order.
    pub documents: Vec<Document>,
    pub report: MigrationReport,
}

struct Shared<'a> {
    resolver: LinkResolver<'a>,
    paths: &'a PathAllocation,
    converter: Arc<dyn ProseConverter>,
    timeout: Duration,
    conversion: &'a ConversionConfig,
}

struct NoteResult {
    note_id: NoteId,
    outcome: Result<(Document, Vec<UnresolvedLink>), String>,
}

/// Converts `notes` into vault documents.
///
/// Fails only with a [`StructureError`], before any note is converted.
pub fn run(
    notes: &[Note],
    config: &Config,
    converter: Arc<dyn ProseConverter>,
) -> Result<MigrationOutcome, StructureError> {
    let paths = allocate(notes, &config.conversion)?;
    let index = NoteIndex::new(notes);
    let attachments = plan_attachments(notes, &index, &config.attachments);

    let mut seen = HashSet::new();
    let mut work: Vec<&Note> = notes.iter().filter(|n| seen.insert(n.id())).collect();
    work.sort_by(|a, b| a.id().cmp(b.id()));

    let workers = config.workers.clamp(1, work.len().max(1));
    tracing::info!(
        notes = work.len(),
        workers,
        converter = converter.name(),
        attachments = attachments.len(),
        "converting notes"
    );

    let shared = Shared {
        resolver: LinkResolver::new(&index, &paths, &attachments, config.conversion.link_target),
        paths: &paths,
        converter,
        timeout: config.converter.timeout(),
        conversion: &config.conversion,
    };
    let mut results = convert_all(&work, &shared, workers);
    results.sort_by(|a, b| a.note_id.cmp(&b.note_id));

    let mut documents = Vec::with_capacity(results.len());
    let mut written = BTreeMap::new();
    let mut unresolved_links = Vec::new();
    let mut failures = Vec::new();

    let finished: HashSet<NoteId> = results.iter().map(|r| r.note_id.clone()).collect();
    for note in &work {
        if !finished.contains(note.id()) {
            failures.push(NoteFailure {
                note_id: note.id().clone(),
                reason: "conversion worker terminated unexpectedly".to_string(),
            });
        }
    }

    for result in results {
        match result.outcome {
            Ok((document, unresolved)) => {
                written.insert(document.note_id.clone(), document.path.clone());
                documents.push(document);
                unresolved_links.extend(unresolved);
            }
            Err(reason) => failures.push(NoteFailure {
                note_id: result.note_id,
                reason,
            }),
        }
    }
    failures.sort_by(|a, b| a.note_id.cmp(&b.note_id));

    tracing::info!(
        converted = documents.len(),
        failed = failures.len(),
        unresolved = unresolved_links.len(),
        collisions = paths.collisions().len(),
        "conversion finished"
    );

    let report = MigrationReport {
        generated_at: OffsetDateTime::now_utc(),
        dry_run: false,
        written,
        unresolved_links,
        collisions: paths.collisions().to_vec(),
        failures,
        attachments: attachment_copies(&attachments),
    };
    Ok(MigrationOutcome { documents, report })
}

fn convert_all(work: &[&Note], shared: &Shared<'_>, workers: usize) -> Vec<NoteResult> {
    let cursor = AtomicUsize::new(0);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    while let Some(note) = work.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                        local.push(NoteResult {
                            note_id: note.id().clone(),
                            outcome: convert_note(note, shared),
                        });
                    }
                    local
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    tracing::error!("conversion worker panicked");
                    Vec::new()
                })
            })
            .collect()
    })
}

fn convert_note(
    note: &Note,
    shared: &Shared<'_>,
) -> Result<(Document, Vec<UnresolvedLink>), String> {
    let path = shared
        .paths
        .get(note.id())
        .ok_or_else(|| "no destination path allocated".to_string())?
        .to_path_buf();

    let metadata = resolve_metadata(note, &shared.resolver);
    let body = convert_body(note, &shared.resolver, &shared.converter, shared.timeout)
        .map_err(|err| {
            tracing::warn!(note_id = %note.id(), error = %err, "note conversion failed");
            err.to_string()
        })?;

    let frontmatter = synthesize(note, &metadata.aliases, &metadata.refs, shared.conversion);
    let content = render_document(&frontmatter, &body.markdown)
        .map_err(|err| format!("failed to render frontmatter: {err}"))?;

    tracing::debug!(
        note_id = %note.id(),
        path = %path.display(),
        links = body.links,
        "converted note"
    );

    let mut unresolved = metadata.unresolved;
    unresolved.extend(body.unresolved);
    Ok((
        Document {
            note_id: note.id().clone(),
            path,
            content,
        },
        unresolved,
    ))
}

fn attachment_copies(plan: &AttachmentPlan) -> Vec<AttachmentCopy> {
    plan.iter()
        .map(|(source, destination)| AttachmentCopy {
            source: source.to_path_buf(),
            destination: destination.to_string(),
        })
        .collect()
}
