use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::LinkTarget;
use crate::models::{Note, NoteId, TargetSpec};
use crate::paths::{PathAllocation, normalize_path};

use super::attachments::AttachmentPlan;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "avif"];

/// Immutable lookup tables over the note graph, built once per run and
/// shared read-only by every worker.
#[derive(Debug)]
pub struct NoteIndex<'a> {
    by_id: HashMap<&'a NoteId, &'a Note>,
    /// Lower-cased title to note IDs, sorted.
    by_title: HashMap<String, Vec<&'a NoteId>>,
    by_alias: HashMap<String, Vec<&'a NoteId>>,
    /// Normalized source path to the notes in that file, file-level node
    /// first.
    by_path: HashMap<PathBuf, Vec<&'a Note>>,
}

fn title_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl<'a> NoteIndex<'a> {
    pub fn new(notes: &'a [Note]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_title: HashMap<String, Vec<&'a NoteId>> = HashMap::new();
        let mut by_alias: HashMap<String, Vec<&'a NoteId>> = HashMap::new();
        let mut by_path: HashMap<PathBuf, Vec<&'a Note>> = HashMap::new();

        for note in notes {
            if by_id.contains_key(note.id()) {
                continue;
            }
            by_id.insert(note.id(), note);
            by_title
                .entry(title_key(note.title()))
                .or_default()
                .push(note.id());
            for alias in note.aliases() {
                by_alias.entry(title_key(alias)).or_default().push(note.id());
            }
            by_path
                .entry(normalize_path(note.source_path()))
                .or_default()
                .push(note);
        }

        for ids in by_title.values_mut().chain(by_alias.values_mut()) {
            ids.sort();
            ids.dedup();
        }
        for notes in by_path.values_mut() {
            notes.sort_by(|a, b| a.level().cmp(&b.level()).then_with(|| a.id().cmp(b.id())));
        }

        Self {
            by_id,
            by_title,
            by_alias,
            by_path,
        }
    }

    pub fn get(&self, id: &NoteId) -> Option<&'a Note> {
        self.by_id.get(id).copied()
    }

    /// Case-insensitive title match; ties go to the smallest identifier.
    /// Aliases are consulted only when no title matches.
    pub fn find_by_title(&self, title: &str) -> Option<&'a NoteId> {
        let key = title_key(title);
        self.by_title
            .get(&key)
            .or_else(|| self.by_alias.get(&key))
            .and_then(|ids| ids.first().copied())
    }

    /// Whether more than one note carries `title`, compared the way fuzzy
    /// title links are matched.
    pub fn title_is_shared(&self, title: &str) -> bool {
        self.by_title
            .get(&title_key(title))
            .is_some_and(|ids| ids.len() > 1)
    }

    /// Notes stored in `path`, file-level node first.
    pub fn notes_in_file(&self, path: &Path) -> &[&'a Note] {
        self.by_path
            .get(&normalize_path(path))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Why a link could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    UnknownIdentifier,
    UnknownPath,
    UnknownTitle,
    AttachmentsDisabled,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIdentifier => write!(f, "no note has this identifier"),
            Self::UnknownPath => write!(f, "no note is stored at this path"),
            Self::UnknownTitle => write!(f, "no note has this title"),
            Self::AttachmentsDisabled => write!(f, "attachment copying is disabled"),
        }
    }
}

/// A link that could be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// Title of the resolved note, or the target itself for non-note links.
    pub title: String,
    /// Destination-syntax replacement text.
    pub text: String,
    /// Text a reader sees: the explicit label, else `title`.
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedLink),
    Unresolved(UnresolvedReason),
}

/// Resolves link targets against the note graph and renders them in
/// destination syntax.
pub struct LinkResolver<'a> {
    index: &'a NoteIndex<'a>,
    paths: &'a PathAllocation,
    attachments: &'a AttachmentPlan,
    link_target: LinkTarget,
}

impl<'a> LinkResolver<'a> {
    pub fn new(
        index: &'a NoteIndex<'a>,
        paths: &'a PathAllocation,
        attachments: &'a AttachmentPlan,
        link_target: LinkTarget,
    ) -> Self {
        Self {
            index,
            paths,
            attachments,
            link_target,
        }
    }

    pub fn index(&self) -> &'a NoteIndex<'a> {
        self.index
    }

    /// Resolves one target as seen from `source`.
    ///
    /// Fuzzy-title and path targets first reduce to an identifier and then
    /// resolve exactly like `id:` links. Web URIs always resolve to
    /// themselves.
    pub fn resolve(&self, target: &TargetSpec, label: Option<&str>, source: &Note) -> Resolution {
        match target {
            TargetSpec::Identifier(id) => self.resolve_id(id, None, label),
            TargetSpec::FuzzyTitle(title) => match self.index.find_by_title(title) {
                Some(id) => self.resolve_id(id, None, label),
                None => Resolution::Unresolved(UnresolvedReason::UnknownTitle),
            },
            TargetSpec::Path { path, search } => self.resolve_path(path, search.as_deref(), label, source),
            TargetSpec::WebUri(uri) => Resolution::Resolved(ResolvedLink {
                title: uri.clone(),
                text: render_external(uri, label),
                display: label.unwrap_or(uri).to_string(),
            }),
            TargetSpec::Heading(heading) => {
                let anchor = sanitize_target(heading);
                let text = match label {
                    Some(label) if label != heading => {
                        format!("[[#{anchor}|{}]]", sanitize_label(label))
                    }
                    _ => format!("[[#{anchor}]]"),
                };
                Resolution::Resolved(ResolvedLink {
                    title: heading.clone(),
                    text,
                    display: label.unwrap_or(heading).to_string(),
                })
            }
        }
    }

    fn resolve_id(&self, id: &NoteId, anchor: Option<&str>, label: Option<&str>) -> Resolution {
        let (Some(note), true) = (self.index.get(id), self.paths.contains(id)) else {
            return Resolution::Unresolved(UnresolvedReason::UnknownIdentifier);
        };
        let title = if note.title().trim().is_empty() {
            self.paths.link_stem(id).unwrap_or_default()
        } else {
            note.title().to_string()
        };
        let anchor = anchor.map(|a| format!("#{}", sanitize_target(a))).unwrap_or_default();

        // A shared title cannot name one note; fall back to its unique stem.
        let link_target = if self.index.title_is_shared(note.title()) {
            LinkTarget::Filename
        } else {
            self.link_target
        };
        let text = match link_target {
            LinkTarget::Title => {
                let target = format!("{}{anchor}", sanitize_target(&title));
                match label {
                    Some(label) if label != title => {
                        format!("[[{target}|{}]]", sanitize_label(label))
                    }
                    _ => format!("[[{target}]]"),
                }
            }
            LinkTarget::Filename => {
                let stem = self.paths.link_stem(id).unwrap_or_default();
                format!("[[{stem}{anchor}|{}]]", sanitize_label(label.unwrap_or(&title)))
            }
        };

        Resolution::Resolved(ResolvedLink {
            display: label.unwrap_or(&title).to_string(),
            title,
            text,
        })
    }

    fn resolve_path(
        &self,
        path: &str,
        search: Option<&str>,
        label: Option<&str>,
        source: &Note,
    ) -> Resolution {
        let absolute = resolve_source_path(path, source);
        let in_file = self.index.notes_in_file(&absolute);

        if let Some(file_note) = in_file.first() {
            let heading = search.and_then(|s| s.strip_prefix('*')).map(str::trim);
            if let Some(heading) = heading {
                let key = title_key(heading);
                if let Some(node) = in_file
                    .iter()
                    .find(|n| n.level() > 0 && title_key(n.title()) == key)
                {
                    return self.resolve_id(node.id(), None, label);
                }
                return self.resolve_id(file_note.id(), Some(heading), label);
            }
            return self.resolve_id(file_note.id(), None, label);
        }

        if is_note_file(&absolute) {
            return Resolution::Unresolved(UnresolvedReason::UnknownPath);
        }

        match self.attachments.destination(&absolute) {
            Some(dest) => {
                let embed = label.is_none() && is_image(&absolute);
                let text = match (embed, label) {
                    (true, _) => format!("![[{dest}]]"),
                    (false, Some(label)) => format!("[[{dest}|{}]]", sanitize_label(label)),
                    (false, None) => format!("[[{dest}]]"),
                };
                Resolution::Resolved(ResolvedLink {
                    title: dest.to_string(),
                    display: label.unwrap_or(dest).to_string(),
                    text,
                })
            }
            None => Resolution::Unresolved(UnresolvedReason::AttachmentsDisabled),
        }
    }
}

/// Resolves a link path relative to the directory of `source`'s file,
/// expanding `~/`.
pub(crate) fn resolve_source_path(path: &str, source: &Note) -> PathBuf {
    let expanded = match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    };
    if expanded.is_absolute() {
        normalize_path(&expanded)
    } else {
        let dir = source.source_path().parent().unwrap_or(Path::new(""));
        normalize_path(&dir.join(expanded))
    }
}

pub(crate) fn is_note_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => ext.eq_ignore_ascii_case("org"),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| ext.eq_ignore_ascii_case(i)))
}

/// Characters that would end or split a wikilink target are replaced.
fn sanitize_target(target: &str) -> String {
    target
        .replace(['[', ']', '|', '#', '^'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn sanitize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("]]", "] ]")
}

fn render_external(uri: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => {
            let needs_brackets = uri.contains(|c: char| c.is_whitespace() || c == '(' || c == ')');
            if needs_brackets {
                format!("[{label}](<{uri}>)")
            } else {
                format!("[{label}]({uri})")
            }
        }
        None => format!("<{uri}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::links::attachments::plan_attachments;
    use crate::models::NoteBuilder;
    use crate::paths::allocate;

    fn corpus() -> Vec<Note> {
        vec![
            NoteBuilder::new()
                .id("ABC")
                .title("Target")
                .source_path("/org/target.org")
                .build(),
            NoteBuilder::new()
                .id("H1")
                .title("Deep Dive")
                .level(1)
                .source_path("/org/target.org")
                .build(),
            NoteBuilder::new()
                .id("zz")
                .title("Project")
                .source_path("/org/p2.org")
                .build(),
            NoteBuilder::new()
                .id("aa")
                .title("project")
                .aliases(vec!["Proj".to_string()])
                .source_path("/org/p1.org")
                .build(),
            NoteBuilder::new()
                .id("SRC")
                .title("Source")
                .source_path("/org/sub/source.org")
                .build(),
        ]
    }

    fn with_resolver<T>(link_target: LinkTarget, f: impl FnOnce(&LinkResolver, &Note) -> T) -> T {
        let notes = corpus();
        let paths = allocate(&notes, &ConversionConfig::default()).unwrap();
        let index = NoteIndex::new(&notes);
        let attachments = plan_attachments(&notes, &index, &Default::default());
        let resolver = LinkResolver::new(&index, &paths, &attachments, link_target);
        let source = notes.iter().find(|n| n.id().as_str() == "SRC").unwrap();
        f(&resolver, source)
    }

    fn text(resolution: Resolution) -> String {
        match resolution {
            Resolution::Resolved(link) => link.text,
            Resolution::Unresolved(reason) => panic!("unresolved: {reason}"),
        }
    }

    #[test]
    fn identifier_with_label_renders_piped_wikilink() {
        with_resolver(LinkTarget::Title, |r, src| {
            let spec = TargetSpec::Identifier(NoteId::new("ABC"));
            assert_eq!(text(r.resolve(&spec, Some("Example"), src)), "[[Target|Example]]");
            assert_eq!(text(r.resolve(&spec, Some("Target"), src)), "[[Target]]");
            assert_eq!(text(r.resolve(&spec, None, src)), "[[Target]]");
        });
    }

    #[test]
    fn missing_identifier_is_unresolved_not_an_error() {
        with_resolver(LinkTarget::Title, |r, src| {
            let spec = TargetSpec::Identifier(NoteId::new("MISSING"));
            assert_eq!(
                r.resolve(&spec, Some("Ghost"), src),
                Resolution::Unresolved(UnresolvedReason::UnknownIdentifier)
            );
        });
    }

    #[test]
    fn fuzzy_title_ties_go_to_smallest_identifier() {
        with_resolver(LinkTarget::Filename, |r, src| {
            let spec = TargetSpec::FuzzyTitle("PROJECT".to_string());
            for _ in 0..3 {
                match r.resolve(&spec, None, src) {
                    Resolution::Resolved(link) => {
                        assert_eq!(link.title, "project");
                        assert!(link.text.starts_with("[[project-"));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
        });
    }

    #[test]
    fn fuzzy_title_falls_back_to_aliases() {
        with_resolver(LinkTarget::Title, |r, src| {
            let spec = TargetSpec::FuzzyTitle("proj".to_string());
            let rendered = text(r.resolve(&spec, None, src));
            assert!(rendered.starts_with("[[project-"), "{rendered}");
            assert!(rendered.ends_with("|project]]"), "{rendered}");
            let missing = TargetSpec::FuzzyTitle("nothing".to_string());
            assert_eq!(
                r.resolve(&missing, None, src),
                Resolution::Unresolved(UnresolvedReason::UnknownTitle)
            );
        });
    }

    #[test]
    fn relative_paths_resolve_from_the_source_directory() {
        with_resolver(LinkTarget::Title, |r, src| {
            let spec = TargetSpec::Path {
                path: "../target.org".to_string(),
                search: None,
            };
            assert_eq!(text(r.resolve(&spec, None, src)), "[[Target]]");

            let heading = TargetSpec::Path {
                path: "/org/target.org".to_string(),
                search: Some("*Deep Dive".to_string()),
            };
            assert_eq!(text(r.resolve(&heading, None, src)), "[[Deep Dive]]");

            let anchor = TargetSpec::Path {
                path: "/org/target.org".to_string(),
                search: Some("*Usage".to_string()),
            };
            assert_eq!(text(r.resolve(&anchor, None, src)), "[[Target#Usage]]");

            let missing = TargetSpec::Path {
                path: "gone.org".to_string(),
                search: None,
            };
            assert_eq!(
                r.resolve(&missing, None, src),
                Resolution::Unresolved(UnresolvedReason::UnknownPath)
            );
        });
    }

    #[test]
    fn web_uris_resolve_to_themselves() {
        with_resolver(LinkTarget::Title, |r, src| {
            let spec = TargetSpec::WebUri("https://example.com".to_string());
            assert_eq!(text(r.resolve(&spec, None, src)), "<https://example.com>");
            assert_eq!(
                text(r.resolve(&spec, Some("site"), src)),
                "[site](https://example.com)"
            );
            let spaced = TargetSpec::WebUri("file:///a b".to_string());
            assert_eq!(text(r.resolve(&spaced, Some("x"), src)), "[x](<file:///a b>)");
        });
    }

    #[test]
    fn heading_references_stay_in_file() {
        with_resolver(LinkTarget::Title, |r, src| {
            let spec = TargetSpec::Heading("Setup".to_string());
            assert_eq!(text(r.resolve(&spec, None, src)), "[[#Setup]]");
            assert_eq!(text(r.resolve(&spec, Some("here"), src)), "[[#Setup|here]]");
        });
    }

    #[test]
    fn filename_target_uses_allocated_stem() {
        with_resolver(LinkTarget::Filename, |r, src| {
            let spec = TargetSpec::Identifier(NoteId::new("ABC"));
            assert_eq!(text(r.resolve(&spec, None, src)), "[[target|Target]]");
            assert_eq!(text(r.resolve(&spec, Some("ex"), src)), "[[target|ex]]");
        });
    }

    fn index_pair(first: (&str, &str), second: (&str, &str)) -> Vec<Note> {
        [("a", first), ("b", second)]
            .into_iter()
            .map(|(id, (title, path))| {
                NoteBuilder::new()
                    .id(id)
                    .title(title)
                    .source_path(path)
                    .build()
            })
            .collect()
    }

    fn rewrite_in_structure(notes: &[Note], body: &str) -> String {
        let config = ConversionConfig {
            preserve_structure: true,
            base_path: Some(PathBuf::from("/org")),
            ..ConversionConfig::default()
        };
        let paths = allocate(notes, &config).unwrap();
        assert!(paths.collisions().is_empty());
        let index = NoteIndex::new(notes);
        let attachments = AttachmentPlan::default();
        let resolver = LinkResolver::new(&index, &paths, &attachments, LinkTarget::Title);
        let source = NoteBuilder::new()
            .id("src")
            .source_path("/org/src.org")
            .raw_body(body)
            .build();
        crate::links::rewrite_body(body, &source, &resolver).0
    }

    #[test]
    fn shared_titles_in_separate_directories_link_by_path() {
        let notes = index_pair(("Index", "/org/work/a.org"), ("Index", "/org/home/b.org"));

        let rewritten = rewrite_in_structure(&notes, "[[id:a]] [[id:b]]");

        assert_eq!(rewritten, "[[work/index|Index]] [[home/index|Index]]");
    }

    #[test]
    fn case_variant_titles_rewrite_idempotently() {
        let notes = index_pair(("Foo", "/org/work/a.org"), ("foo", "/org/home/b.org"));

        let once = rewrite_in_structure(&notes, "[[id:b]]");
        let twice = rewrite_in_structure(&notes, &once);

        assert_eq!(once, "[[home/foo|foo]]");
        assert_eq!(once, twice);
    }

    #[test]
    fn title_sharing_ignores_case_and_spacing() {
        let notes = index_pair(("Deep  Work", "/org/a.org"), ("deep work", "/org/b.org"));
        let index = NoteIndex::new(&notes);
        assert!(index.title_is_shared("DEEP WORK"));
        assert!(!index.title_is_shared("Shallow"));
    }

    #[test]
    fn wikilink_breaking_characters_are_sanitized() {
        assert_eq!(sanitize_target("C# [draft] | v2"), "C draft v2");
        assert_eq!(sanitize_label("a]]b\n c"), "a] ]b c");
    }
}
