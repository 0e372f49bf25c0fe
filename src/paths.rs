//! Destination path allocation.
//!
//! Every note gets exactly one relative `.md` path and no two notes share
//! one. Candidates come from the normalized title (optionally under the
//! note's source directory); notes whose candidates collide are all
//! disambiguated with a suffix derived from a hash of their identifier, so
//! the result never depends on the order notes arrive in.

mod normalizer;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ConversionConfig;
use crate::models::{Note, NoteId};

pub use normalizer::{EMPTY_STEM, FilenameNormalizer};

/// Configuration inconsistencies that make structure preservation
/// impossible. Fatal for the whole run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("note {note_id} at {source_path} lies outside the base path {base}")]
    OutsideBase {
        note_id: NoteId,
        source_path: PathBuf,
        base: PathBuf,
    },
}

/// Two or more notes produced the same candidate path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub original_path: PathBuf,
    pub resolved_path: PathBuf,
    /// Every note that competed for `original_path`, sorted.
    pub note_ids: Vec<NoteId>,
}

/// Total, injective mapping from note ID to relative destination path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathAllocation {
    paths: BTreeMap<NoteId, PathBuf>,
    collisions: Vec<Collision>,
}

impl PathAllocation {
    pub fn get(&self, id: &NoteId) -> Option<&Path> {
        self.paths.get(id).map(PathBuf::as_path)
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.paths.contains_key(id)
    }

    /// Entries in note-ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&NoteId, &Path)> {
        self.paths.iter().map(|(id, path)| (id, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// The destination path without its `.md` extension, `/`-separated, as
    /// used inside filename-style wikilinks.
    pub fn link_stem(&self, id: &NoteId) -> Option<String> {
        self.get(id).map(|path| to_link_stem(&path.with_extension("")))
    }
}

fn to_link_stem(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Assigns every note its destination path.
///
/// Notes are processed in identifier order so the output is reproducible.
/// Duplicate identifiers keep the first note and are logged. With
/// `preserve_structure`, each note's source directory relative to the base
/// path (configured, or inferred as the common ancestor of all source
/// directories) prefixes its file name; a note outside the configured base
/// is a [`StructureError`].
pub fn allocate(notes: &[Note], config: &ConversionConfig) -> Result<PathAllocation, StructureError> {
    let mut ordered: Vec<&Note> = notes.iter().collect();
    ordered.sort_by(|a, b| a.id().cmp(b.id()));
    ordered.dedup_by(|later, first| {
        let duplicate = later.id() == first.id();
        if duplicate {
            tracing::warn!(note_id = %later.id(), "duplicate note identifier, keeping first");
        }
        duplicate
    });

    let base = if config.preserve_structure {
        Some(match &config.base_path {
            Some(base) => normalize_path(base),
            None => infer_base(ordered.iter().map(|n| n.source_path())),
        })
    } else {
        None
    };

    let mut candidates = Vec::with_capacity(ordered.len());
    for note in &ordered {
        let dir = match &base {
            Some(base) => relative_dir(note, base)?,
            None => PathBuf::new(),
        };
        candidates.push(Candidate {
            key: note.id().clone(),
            dir,
            stem: FilenameNormalizer::normalize(note.title(), config.max_filename_length),
            extension: "md".to_string(),
            seed: note.id().as_str().to_string(),
        });
    }

    let assignment = assign_unique(candidates);
    let collisions = assignment
        .collisions
        .into_iter()
        .map(|(original_path, resolved_path, note_ids)| {
            tracing::debug!(
                original = %original_path.display(),
                resolved = %resolved_path.display(),
                "disambiguated colliding destination path"
            );
            Collision {
                original_path,
                resolved_path,
                note_ids,
            }
        })
        .collect();

    Ok(PathAllocation {
        paths: assignment.paths,
        collisions,
    })
}

fn relative_dir(note: &Note, base: &Path) -> Result<PathBuf, StructureError> {
    let outside = || StructureError::OutsideBase {
        note_id: note.id().clone(),
        source_path: note.source_path().to_path_buf(),
        base: base.to_path_buf(),
    };
    let source = normalize_path(note.source_path());
    let dir = source.parent().unwrap_or(Path::new(""));
    let relative = dir.strip_prefix(base).map_err(|_| outside())?;
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(outside());
    }
    Ok(relative.to_path_buf())
}

/// Longest common ancestor of the parents of `paths`.
fn infer_base<'a>(paths: impl Iterator<Item = &'a Path>) -> PathBuf {
    let mut common: Option<PathBuf> = None;
    for path in paths {
        let dir = normalize_path(path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        common = Some(match common {
            None => dir,
            Some(prefix) => prefix
                .components()
                .zip(dir.components())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a.as_os_str())
                .collect(),
        });
    }
    common.unwrap_or_default()
}

/// Resolves `.` and `..` lexically, without touching the filesystem.
///
/// Leading `..` components of a relative path are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// One path request for [`assign_unique`].
pub(crate) struct Candidate<K> {
    pub key: K,
    pub dir: PathBuf,
    pub stem: String,
    pub extension: String,
    /// Hashed to build the disambiguating suffix.
    pub seed: String,
}

impl<K> Candidate<K> {
    fn path_with(&self, suffix: Option<&str>) -> PathBuf {
        let name = match (suffix, self.extension.is_empty()) {
            (None, true) => self.stem.clone(),
            (None, false) => format!("{}.{}", self.stem, self.extension),
            (Some(s), true) => format!("{}-{s}", self.stem),
            (Some(s), false) => format!("{}-{s}.{}", self.stem, self.extension),
        };
        self.dir.join(name)
    }
}

pub(crate) struct Assignment<K> {
    pub paths: BTreeMap<K, PathBuf>,
    /// `(original, resolved, competing keys)` for each disambiguated entry.
    pub collisions: Vec<(PathBuf, PathBuf, Vec<K>)>,
}

/// Case-insensitive comparison key, so outputs stay distinct on
/// case-insensitive filesystems too.
fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Gives every candidate a distinct path.
///
/// Candidates whose natural path is unique keep it. All members of a
/// colliding group get `-<hash>` suffixes, lengthened until they clash with
/// nothing already taken.
pub(crate) fn assign_unique<K: Ord + Clone>(mut candidates: Vec<Candidate<K>>) -> Assignment<K> {
    candidates.sort_by(|a, b| a.key.cmp(&b.key));

    let mut groups: HashMap<String, Vec<K>> = HashMap::new();
    for candidate in &candidates {
        groups
            .entry(collision_key(&candidate.path_with(None)))
            .or_default()
            .push(candidate.key.clone());
    }

    let mut taken: HashSet<String> = groups
        .iter()
        .filter(|(_, keys)| keys.len() == 1)
        .map(|(path, _)| path.clone())
        .collect();

    let mut paths = BTreeMap::new();
    let mut collisions = Vec::new();

    for candidate in &candidates {
        let natural = candidate.path_with(None);
        let group = &groups[&collision_key(&natural)];
        if group.len() == 1 {
            paths.insert(candidate.key.clone(), natural);
            continue;
        }

        let digest = hex::encode(Sha256::digest(candidate.seed.as_bytes()));
        let mut resolved = None;
        for len in (8..=digest.len()).step_by(4) {
            let path = candidate.path_with(Some(&digest[..len]));
            if taken.insert(collision_key(&path)) {
                resolved = Some(path);
                break;
            }
        }
        let resolved = resolved.unwrap_or_else(|| {
            let mut n = 2usize;
            loop {
                let path = candidate.path_with(Some(&format!("{digest}-{n}")));
                if taken.insert(collision_key(&path)) {
                    break path;
                }
                n += 1;
            }
        });

        paths.insert(candidate.key.clone(), resolved.clone());
        collisions.push((natural, resolved, group.clone()));
    }

    Assignment { paths, collisions }
}
