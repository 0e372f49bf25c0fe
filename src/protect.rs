//! Protected body conversion.
//!
//! The prose converter never sees link syntax: every link occurrence is
//! swapped for an opaque placeholder before conversion and swapped back for
//! its rewritten form afterwards. Placeholders are built from Unicode
//! private-use characters that neither Org nor Markdown give any meaning
//! to, with a per-body salt chosen so the marker does not already occur in
//! the text. The placeholder count is verified on the way back; a converter
//! that drops, duplicates or splits one fails the note.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::convert::{ConvertError, Dialect, ProseConverter, convert_with_timeout};
use crate::links::{LinkResolver, Replacement, UnresolvedLink, plan_rewrites};
use crate::models::Note;

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error(
        "placeholder integrity violated: expected {expected}, found {found} \
         ({missing} missing, {duplicated} duplicated, {unknown} unknown)"
    )]
    Integrity {
        expected: usize,
        found: usize,
        missing: usize,
        duplicated: usize,
        unknown: usize,
    },

    #[error("malformed placeholder at byte {offset} of converted text")]
    Malformed { offset: usize },
}

/// Why one note's body could not be produced.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Placeholder(#[from] PlaceholderError),
}

/// Body text with every link replaced by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    text: String,
    prefix: String,
    links: Vec<String>,
}

impl Protected {
    /// The placeholder-substituted text to hand to a converter.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of placeholders.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn token(&self, n: usize) -> String {
        format!("{}{n}{CLOSE}", self.prefix)
    }

    /// Replaces each placeholder in `converted` with its link text.
    ///
    /// Every placeholder must appear exactly once; anything else is an
    /// error and no partial output is returned.
    pub fn restore(&self, converted: &str) -> Result<String, PlaceholderError> {
        let mut out = String::with_capacity(converted.len());
        let mut seen = vec![0usize; self.links.len()];
        let mut found = 0;
        let mut unknown = 0;
        let mut rest = converted;

        while let Some(pos) = rest.find(&self.prefix) {
            let offset = converted.len() - rest.len() + pos;
            out.push_str(&rest[..pos]);
            let after = &rest[pos + self.prefix.len()..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 || !after[digits..].starts_with(CLOSE) {
                return Err(PlaceholderError::Malformed { offset });
            }
            let n: usize = after[..digits]
                .parse()
                .map_err(|_| PlaceholderError::Malformed { offset })?;

            found += 1;
            match self.links.get(n) {
                Some(link) => {
                    seen[n] += 1;
                    if in_table_row(&out) {
                        out.push_str(&link.replace('|', "\\|"));
                    } else {
                        out.push_str(link);
                    }
                }
                None => unknown += 1,
            }
            rest = &after[digits + CLOSE.len_utf8()..];
        }
        out.push_str(rest);

        let missing = seen.iter().filter(|&&c| c == 0).count();
        let duplicated = seen.iter().filter(|&&c| c > 1).count();
        if missing > 0 || duplicated > 0 || unknown > 0 {
            return Err(PlaceholderError::Integrity {
                expected: self.links.len(),
                found,
                missing,
                duplicated,
                unknown,
            });
        }
        Ok(out)
    }
}

/// Whether the last line of `out` is a pipe-table row, where a bare `|`
/// would split the cell.
fn in_table_row(out: &str) -> bool {
    let line_start = out.rfind('\n').map_or(0, |i| i + 1);
    out[line_start..].trim_start().starts_with('|')
}

/// Substitutes each replacement span in `body` with a placeholder.
pub fn protect(body: &str, replacements: &[Replacement]) -> Protected {
    let mut salt = 0u32;
    let prefix = loop {
        let candidate = format!("{OPEN}L{salt}x");
        if !body.contains(&candidate) {
            break candidate;
        }
        salt += 1;
    };

    let mut protected = Protected {
        text: String::with_capacity(body.len()),
        prefix,
        links: Vec::with_capacity(replacements.len()),
    };
    let mut cursor = 0;
    for (n, replacement) in replacements.iter().enumerate() {
        protected.text.push_str(&body[cursor..replacement.span.start]);
        let token = protected.token(n);
        protected.text.push_str(&token);
        protected.links.push(replacement.text.clone());
        cursor = replacement.span.end;
    }
    protected.text.push_str(&body[cursor..]);
    protected
}

/// Removes what the frontmatter already carries from the top of a body.
///
/// For a file-level node (`level == 0`) that is the leading property drawer
/// and the `#+title:` / `#+filetags:` keywords before the first heading.
/// For a heading node it is the heading line itself and the property drawer
/// under it.
pub fn strip_preamble(body: &str, level: u32) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0;

    if level > 0 {
        if lines.first().is_some_and(|l| l.starts_with('*')) {
            i = 1;
        }
        while i < lines.len() && is_planning(lines[i]) {
            kept.push(lines[i]);
            i += 1;
        }
        i = skip_drawer(&lines, i);
        kept.extend(&lines[i..]);
    } else {
        let first_content = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
        kept.extend(&lines[..first_content]);
        i = skip_drawer(&lines, first_content);
        let mut in_preamble = true;
        for line in &lines[i..] {
            if is_heading(line) {
                in_preamble = false;
            }
            if in_preamble && is_frontmatter_keyword(line) {
                continue;
            }
            kept.push(line);
        }
    }

    let start = kept.iter().position(|l| !l.trim().is_empty()).unwrap_or(kept.len());
    let mut out = kept[start..].join("\n");
    if !out.is_empty() && body.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn is_heading(line: &str) -> bool {
    let stars = line.bytes().take_while(|&b| b == b'*').count();
    stars > 0 && line[stars..].starts_with(' ')
}

fn is_planning(line: &str) -> bool {
    let trimmed = line.trim_start();
    ["SCHEDULED:", "DEADLINE:", "CLOSED:"]
        .iter()
        .any(|k| trimmed.starts_with(k))
}

fn is_frontmatter_keyword(line: &str) -> bool {
    let lower = line.trim_start().to_ascii_lowercase();
    lower.starts_with("#+title:") || lower.starts_with("#+filetags:")
}

/// Index after a `:PROPERTIES:` drawer starting at `start`, or `start`.
fn skip_drawer(lines: &[&str], start: usize) -> usize {
    let opens = lines
        .get(start)
        .is_some_and(|l| l.trim().eq_ignore_ascii_case(":PROPERTIES:"));
    if !opens {
        return start;
    }
    lines[start + 1..]
        .iter()
        .position(|l| l.trim().eq_ignore_ascii_case(":END:"))
        .map(|offset| start + offset + 2)
        .unwrap_or(start)
}

/// A converted body and the links that could not be resolved in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedBody {
    pub markdown: String,
    pub unresolved: Vec<UnresolvedLink>,
    /// Link occurrences substituted back after conversion.
    pub links: usize,
}

/// Produces the Markdown body of `note`: preamble stripped, links rewritten,
/// prose converted, with links shielded from the converter.
pub fn convert_body(
    note: &Note,
    resolver: &LinkResolver<'_>,
    converter: &Arc<dyn ProseConverter>,
    timeout: Duration,
) -> Result<ConvertedBody, BodyError> {
    let body = strip_preamble(note.raw_body(), note.level());
    let (replacements, unresolved) = plan_rewrites(&body, note, resolver);
    let protected = protect(&body, &replacements);

    let converted = if protected.text().trim().is_empty() {
        String::new()
    } else {
        convert_with_timeout(
            converter,
            protected.text().to_string(),
            Dialect::Org,
            Dialect::Markdown,
            timeout,
        )?
    };

    let markdown = protected.restore(&converted)?;
    Ok(ConvertedBody {
        markdown,
        unresolved,
        links: protected.len(),
    })
}
