//! Writes a finished conversion into the destination vault.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::pipeline::{MigrationOutcome, MigrationReport};

/// What [`VaultWriter::write`] did (or, in dry-run mode, would have done).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub documents: usize,
    pub attachments: usize,
    /// Attachment sources that could not be found on disk.
    pub missing_attachments: Vec<PathBuf>,
}

pub struct VaultWriter {
    root: PathBuf,
    dry_run: bool,
}

impl VaultWriter {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes every document and copies every planned attachment.
    ///
    /// Documents are written atomically: a reader of the vault sees either
    /// the previous file or the complete new one. In dry-run mode nothing
    /// touches the filesystem.
    pub fn write(&self, outcome: &MigrationOutcome) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();

        for document in &outcome.documents {
            let target = self.root.join(&document.path);
            if self.dry_run {
                tracing::info!(note_id = %document.note_id, path = %target.display(), "would write note");
            } else {
                write_atomic(&target, document.content.as_bytes())?;
                tracing::debug!(note_id = %document.note_id, path = %target.display(), "wrote note");
            }
            summary.documents += 1;
        }

        for attachment in &outcome.report.attachments {
            let target = self.root.join(&attachment.destination);
            if !attachment.source.is_file() {
                tracing::warn!(source = %attachment.source.display(), "attachment not found, skipping");
                summary.missing_attachments.push(attachment.source.clone());
                continue;
            }
            if self.dry_run {
                tracing::info!(
                    source = %attachment.source.display(),
                    destination = %target.display(),
                    "would copy attachment"
                );
            } else {
                ensure_parent(&target)?;
                fs::copy(&attachment.source, &target).with_context(|| {
                    format!(
                        "Failed to copy attachment {} to {}",
                        attachment.source.display(),
                        target.display()
                    )
                })?;
            }
            summary.attachments += 1;
        }

        tracing::info!(
            root = %self.root.display(),
            documents = summary.documents,
            attachments = summary.attachments,
            dry_run = self.dry_run,
            "vault updated"
        );
        Ok(summary)
    }
}

/// Writes the report as pretty-printed JSON.
pub fn write_report(report: &MigrationReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    write_atomic(path, json.as_bytes())?;
    tracing::info!(path = %path.display(), "wrote migration report");
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
