//! Org link scanner.
//!
//! Finds `[[target]]` and `[[target][label]]` occurrences in a single
//! left-to-right pass, so spans never overlap. Text inside source, example
//! and export blocks is not scanned.

use std::ops::Range;

use crate::models::{LinkOccurrence, NoteId, TargetSpec};

/// Link types treated as external references and passed through untouched.
const EXTERNAL_SCHEMES: &[&str] = &[
    "http", "https", "ftp", "ftps", "mailto", "tel", "news", "irc", "doi", "cite", "info", "help",
    "elisp", "shell", "bibtex", "zotero", "isbn", "arxiv", "ssh",
];

/// Link types that name a file on disk.
const FILE_SCHEMES: &[&str] = &["file", "attachment", "file+sys", "file+emacs"];

/// A link as it appears in text, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub span: Range<usize>,
    pub target: String,
    pub label: Option<String>,
}

/// Scans `text` and classifies every link found.
pub fn scan_links(text: &str, source_note_id: &NoteId) -> Vec<LinkOccurrence> {
    scan_raw(text)
        .into_iter()
        .map(|raw| LinkOccurrence {
            source_note_id: source_note_id.clone(),
            target: classify_target(&raw.target),
            raw_target: raw.target,
            display_text: raw.label,
            span: raw.span,
        })
        .collect()
}

/// Scans `text` for link syntax without classifying targets.
pub fn scan_raw(text: &str) -> Vec<RawLink> {
    let excluded = literal_blocks(text);
    let bytes = text.as_bytes();
    let mut links = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if let Some(block) = excluded.iter().find(|r| r.contains(&i)) {
            i = block.end;
            continue;
        }
        if bytes[i] == b'[' && bytes[i + 1] == b'[' {
            match parse_link_at(text, i) {
                Some(Parsed::Link(link)) => {
                    i = link.span.end;
                    links.push(link);
                    continue;
                }
                Some(Parsed::Skip(end)) => {
                    i = end;
                    continue;
                }
                None => {}
            }
        }
        i += 1;
    }

    links
}

enum Parsed {
    Link(RawLink),
    /// Well-formed bracket syntax that is not a source link.
    Skip(usize),
}

fn parse_link_at(text: &str, start: usize) -> Option<Parsed> {
    let bytes = text.as_bytes();
    let target_start = start + 2;
    let mut j = target_start;

    while j < bytes.len() {
        match bytes[j] {
            b'\\' if matches!(bytes.get(j + 1), Some(b'[') | Some(b']')) => j += 2,
            b'\n' | b'[' => return None,
            b']' => break,
            _ => j += 1,
        }
    }
    if j >= bytes.len() || j == target_start {
        return None;
    }

    let raw_target = &text[target_start..j];
    let target = raw_target.replace("\\[", "[").replace("\\]", "]");

    match bytes.get(j + 1) {
        Some(b']') => {
            let end = j + 2;
            // `[[Title|Label]]` is already destination syntax.
            if target.contains('|') {
                return Some(Parsed::Skip(end));
            }
            Some(Parsed::Link(RawLink {
                span: start..end,
                target: target.trim().to_string(),
                label: None,
            }))
        }
        Some(b'[') => {
            let label_start = j + 2;
            let close = text[label_start..].find("]]")? + label_start;
            let label = collapse_whitespace(&text[label_start..close]);
            Some(Parsed::Link(RawLink {
                span: start..close + 2,
                target: target.trim().to_string(),
                label: (!label.is_empty()).then_some(label),
            }))
        }
        _ => None,
    }
}

/// Byte ranges of `#+begin_src`, `#+begin_example` and `#+begin_export`
/// blocks, delimiter lines included. An unterminated block runs to the end.
fn literal_blocks(text: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, String)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let lower = line.trim().to_ascii_lowercase();
        match &open {
            None => {
                for kind in ["src", "example", "export"] {
                    let marker = format!("#+begin_{kind}");
                    let is_start = lower == marker
                        || lower
                            .strip_prefix(&marker)
                            .is_some_and(|rest| rest.starts_with(char::is_whitespace));
                    if is_start {
                        open = Some((offset, format!("#+end_{kind}")));
                        break;
                    }
                }
            }
            Some((start, end_marker)) => {
                if lower.starts_with(end_marker.as_str()) {
                    blocks.push(*start..offset + line.len());
                    open = None;
                }
            }
        }
        offset += line.len();
    }
    if let Some((start, _)) = open {
        blocks.push(start..text.len());
    }
    blocks
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classifies a link target.
///
/// Precedence: identifier (`id:`), then path (`file:`-like types or a
/// target starting with `/`, `./`, `../`, `~/`), then external URI (a known
/// link type), then in-file heading (`*Heading`, `#custom-id`), then fuzzy
/// title (`roam:` or anything else).
pub fn classify_target(target: &str) -> TargetSpec {
    let target = target.trim();

    if let Some((scheme, rest)) = target.split_once(':') {
        let scheme = scheme.to_ascii_lowercase();
        if scheme == "id" {
            let id = rest.split("::").next().unwrap_or(rest).trim();
            return TargetSpec::Identifier(NoteId::new(id));
        }
        if FILE_SCHEMES.contains(&scheme.as_str()) {
            return path_spec(rest);
        }
    }

    if ["/", "./", "../", "~/"].iter().any(|p| target.starts_with(p)) {
        return path_spec(target);
    }

    if let Some((scheme, _)) = target.split_once(':') {
        let scheme = scheme.to_ascii_lowercase();
        if EXTERNAL_SCHEMES.contains(&scheme.as_str()) {
            return TargetSpec::WebUri(target.to_string());
        }
        if scheme == "roam" {
            return TargetSpec::FuzzyTitle(target[5..].trim().to_string());
        }
    }

    if let Some(heading) = target.strip_prefix('*') {
        return TargetSpec::Heading(heading.trim_start_matches('*').trim().to_string());
    }
    if let Some(custom_id) = target.strip_prefix('#') {
        return TargetSpec::Heading(custom_id.trim().to_string());
    }

    TargetSpec::FuzzyTitle(target.to_string())
}

fn path_spec(rest: &str) -> TargetSpec {
    let (path, search) = match rest.split_once("::") {
        Some((path, search)) => (path, Some(search.trim().to_string())),
        None => (rest, None),
    };
    TargetSpec::Path {
        path: path.trim().to_string(),
        search: search.filter(|s| !s.is_empty()),
    }
}
