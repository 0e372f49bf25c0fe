//! Built-in Org to Markdown converter.
//!
//! Line oriented: block structure (headings, lists, tables, blocks, drawers)
//! is decided per line, then inline markup is rewritten inside prose lines.
//! Covers the subset of Org that org-roam notes use in practice; anything
//! it does not recognize is passed through as text.

use std::sync::LazyLock;

use regex::Regex;

use super::{ConvertError, Dialect, ProseConverter};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\*+)\s+(.*?)(?:\s+(:[\w@#%:]+:))?\s*$").expect("valid heading regex"));
static DRAWER_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*:[A-Za-z_-]+:\s*$").expect("valid drawer regex"));
static DRAWER_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*:END:\s*$").expect("valid drawer end regex"));
static BLOCK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*#\+begin_(\w+)(?:\s+(\S+))?").expect("valid block regex"));
static KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#\+\w+:").expect("valid keyword regex"));
static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([-+]|\s\*|(\d+)[.)])\s+(\[[ xX-]\]\s+)?(.*)$").expect("valid list regex")
});
static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-{5,}\s*$").expect("valid rule regex"));
static PLANNING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:SCHEDULED|DEADLINE|CLOSED):").expect("valid planning regex"));

/// Converts Org text to GitHub-flavored Markdown without external tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrgConverter;

impl ProseConverter for OrgConverter {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn convert(&self, text: &str, from: Dialect, to: Dialect) -> Result<String, ConvertError> {
        match (from, to) {
            (Dialect::Org, Dialect::Markdown) => Ok(org_to_markdown(text)),
            (from, to) if from == to => Ok(text.to_string()),
            (from, to) => Err(ConvertError::Unsupported {
                converter: self.name(),
                from,
                to,
            }),
        }
    }
}

enum Block {
    Fenced,
    Quote,
    Raw,
    Dropped,
    Plain,
}

fn org_to_markdown(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        if let Some(caps) = BLOCK_START_RE.captures(line) {
            let kind = caps[1].to_ascii_lowercase();
            let arg = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
            let end_marker = format!("#+end_{kind}");
            let block = match kind.as_str() {
                "src" | "example" => Block::Fenced,
                "quote" => Block::Quote,
                "export" => match arg.as_deref() {
                    Some("md" | "markdown" | "gfm" | "html") => Block::Raw,
                    _ => Block::Dropped,
                },
                _ => Block::Plain,
            };

            let start = i + 1;
            let mut end = start;
            while end < lines.len() && !lines[end].trim().to_ascii_lowercase().starts_with(&end_marker) {
                end += 1;
            }
            let body = &lines[start..end.min(lines.len())];

            match block {
                Block::Fenced => {
                    let lang = if kind == "src" { arg.unwrap_or_default() } else { String::new() };
                    out.push(format!("```{lang}"));
                    out.extend(body.iter().map(|l| unescape_literal(l)));
                    out.push("```".to_string());
                }
                Block::Quote => out.extend(body.iter().map(|l| {
                    let converted = convert_inline(l.trim());
                    if converted.is_empty() { ">".to_string() } else { format!("> {converted}") }
                })),
                Block::Raw => out.extend(body.iter().map(|l| l.to_string())),
                Block::Dropped => {}
                Block::Plain => out.extend(body.iter().map(|l| convert_inline(l))),
            }
            i = end + 1;
            continue;
        }

        if DRAWER_START_RE.is_match(line) && !DRAWER_END_RE.is_match(line) {
            if let Some(offset) = lines[i + 1..].iter().position(|l| DRAWER_END_RE.is_match(l)) {
                i += offset + 2;
                continue;
            }
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps[1].len().min(6);
            out.push(format!("{} {}", "#".repeat(level), convert_inline(caps[2].trim())));
            i += 1;
            continue;
        }

        if KEYWORD_RE.is_match(line) || PLANNING_RE.is_match(line) || is_comment(trimmed) {
            i += 1;
            continue;
        }

        if trimmed.starts_with('|') {
            let start = i;
            while i < lines.len() && lines[i].trim_start().starts_with('|') {
                i += 1;
            }
            out.extend(convert_table(&lines[start..i]));
            continue;
        }

        if RULE_RE.is_match(line) {
            out.push("---".to_string());
            i += 1;
            continue;
        }

        if let Some(caps) = LIST_RE.captures(line) {
            out.push(convert_list_item(&caps));
            i += 1;
            continue;
        }

        out.push(convert_inline(line));
        i += 1;
    }

    let mut markdown = out.join("\n");
    if text.ends_with('\n') {
        markdown.push('\n');
    }
    markdown
}

fn is_comment(trimmed: &str) -> bool {
    trimmed == "#" || trimmed.starts_with("# ")
}

/// Org escapes a leading `*` or `#+` in literal blocks with a comma.
fn unescape_literal(line: &str) -> String {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    match rest.strip_prefix(',') {
        Some(tail) if tail.starts_with('*') || tail.starts_with("#+") => {
            format!("{}{}", &line[..indent], tail)
        }
        _ => line.to_string(),
    }
}

fn convert_list_item(caps: &regex::Captures<'_>) -> String {
    let indent = &caps[1];
    let marker = match caps.get(3) {
        Some(number) => format!("{}.", number.as_str()),
        None => "-".to_string(),
    };
    let checkbox = caps.get(4).map(|m| match m.as_str().trim() {
        "[ ]" | "[-]" => "[ ] ",
        _ => "[x] ",
    });
    let indent = if caps[2].starts_with(char::is_whitespace) {
        format!("{indent} ")
    } else {
        indent.to_string()
    };

    let content = &caps[5];
    let content = match content.split_once(" :: ") {
        Some((term, description)) if checkbox.is_none() => {
            format!("**{}**: {}", convert_inline(term.trim()), convert_inline(description))
        }
        _ => convert_inline(content),
    };
    format!("{indent}{marker} {}{content}", checkbox.unwrap_or(""))
}

fn convert_table(rows: &[&str]) -> Vec<String> {
    let cells = |row: &str| -> Vec<String> {
        row.trim()
            .trim_matches('|')
            .split('|')
            .map(|c| convert_inline(c.trim()))
            .collect()
    };
    let is_separator = |row: &str| row.trim().starts_with("|-");

    let width = rows
        .iter()
        .filter(|r| !is_separator(r))
        .map(|r| cells(r).len())
        .max()
        .unwrap_or(1);
    let separator = format!("|{}", "---|".repeat(width));
    let render = |row: &str| {
        let mut cols = cells(row);
        cols.resize(width, String::new());
        format!("| {} |", cols.join(" | "))
    };

    let mut out = Vec::with_capacity(rows.len() + 1);
    let mut header_done = false;
    for (idx, row) in rows.iter().enumerate() {
        if is_separator(row) {
            if !header_done && idx > 0 {
                out.push(separator.clone());
                header_done = true;
            }
            continue;
        }
        out.push(render(row));
        if idx == 0 && !rows.get(1).is_some_and(|r| is_separator(r)) {
            out.push(separator.clone());
            header_done = true;
        }
    }
    out
}

/// Characters allowed right before an opening emphasis marker.
fn is_pre(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || "-('\"{".contains(c),
    }
}

/// Characters allowed right after a closing emphasis marker.
fn is_post(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || "-.,;:!?')\"}[]\\".contains(c),
    }
}

fn convert_inline(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let prev = i.checked_sub(1).map(|p| chars[p]);
        if "*/=~+_".contains(c) && is_pre(prev) {
            if let Some(close) = find_close(&chars, i) {
                let inner: String = chars[i + 1..close].iter().collect();
                match c {
                    '*' => out.push_str(&format!("**{}**", convert_inline(&inner))),
                    '/' => out.push_str(&format!("*{}*", convert_inline(&inner))),
                    '+' => out.push_str(&format!("~~{}~~", convert_inline(&inner))),
                    '_' => out.push_str(&format!("<u>{}</u>", convert_inline(&inner))),
                    _ => out.push_str(&code_span(&inner)),
                }
                i = close + 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn find_close(chars: &[char], open: usize) -> Option<usize> {
    let marker = chars[open];
    let first = *chars.get(open + 1)?;
    if first.is_whitespace() || first == marker {
        return None;
    }
    (open + 2..chars.len()).find(|&j| {
        chars[j] == marker && !chars[j - 1].is_whitespace() && is_post(chars.get(j + 1).copied())
    })
}

fn code_span(inner: &str) -> String {
    if inner.contains('`') {
        format!("`` {inner} ``")
    } else {
        format!("`{inner}`")
    }
}
