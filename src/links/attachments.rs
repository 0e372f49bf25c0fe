use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::AttachmentConfig;
use crate::models::{Note, TargetSpec};
use crate::paths::{Candidate, FilenameNormalizer, assign_unique};

use super::parser::scan_links;
use super::resolver::{NoteIndex, is_note_file, resolve_source_path};

/// Source file to vault-relative destination for every linked non-note file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentPlan {
    entries: BTreeMap<PathBuf, String>,
}

impl AttachmentPlan {
    /// `/`-separated destination for an absolute, normalized source path.
    pub fn destination(&self, source: &Path) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.entries
            .iter()
            .map(|(source, dest)| (source.as_path(), dest.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects every file linked from a note body that is not itself a note and
/// gives it a unique name under the attachment folder.
///
/// Returns an empty plan when copying is disabled, which leaves such links
/// unresolved.
pub fn plan_attachments(notes: &[Note], index: &NoteIndex<'_>, config: &AttachmentConfig) -> AttachmentPlan {
    if !config.copy_attachments {
        return AttachmentPlan::default();
    }

    let mut sources = BTreeSet::new();
    for note in notes {
        for link in scan_links(note.raw_body(), note.id()) {
            let TargetSpec::Path { path, .. } = &link.target else {
                continue;
            };
            let absolute = resolve_source_path(path, note);
            if is_note_file(&absolute) || !index.notes_in_file(&absolute).is_empty() {
                continue;
            }
            sources.insert(absolute);
        }
    }

    let folder = PathBuf::from(config.attachment_folder.trim_matches('/'));
    let candidates = sources
        .into_iter()
        .map(|source| {
            let stem = source
                .file_stem()
                .map(|s| FilenameNormalizer::normalize(&s.to_string_lossy(), 120))
                .unwrap_or_default();
            let extension = source
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            Candidate {
                seed: source.to_string_lossy().into_owned(),
                key: source,
                dir: folder.clone(),
                stem,
                extension,
            }
        })
        .collect();

    let assignment = assign_unique(candidates);
    for (original, resolved, sources) in &assignment.collisions {
        tracing::debug!(
            original = %original.display(),
            resolved = %resolved.display(),
            competing = sources.len(),
            "disambiguated attachment name"
        );
    }

    AttachmentPlan {
        entries: assignment
            .paths
            .into_iter()
            .map(|(source, dest)| {
                let dest = dest
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                (source, dest)
            })
            .collect(),
    }
}
