//! Splits an org file into the bodies of the nodes it contains.
//!
//! A file-level node owns the whole file and a heading node owns its
//! subtree. Any subtree that belongs to another node is cut out of the
//! enclosing body and replaced by a link line pointing at that node, so each
//! piece of text ends up in exactly one note.

use std::ops::Range;

/// Position of one node inside its file.
#[derive(Debug, Clone)]
pub(crate) struct NodeSpan<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub level: u32,
    /// Emacs point: 1-based character offset of the node's heading.
    pub pos: i64,
}

/// Returns the body of each node in `nodes`, in the same order.
pub(crate) fn split_bodies(text: &str, nodes: &[NodeSpan<'_>]) -> Vec<String> {
    let ranges: Vec<Range<usize>> = nodes.iter().map(|node| node_range(text, node)).collect();

    nodes
        .iter()
        .enumerate()
        .map(|(idx, _)| {
            let own = &ranges[idx];
            let mut children: Vec<usize> = (0..nodes.len())
                .filter(|&other| {
                    other != idx
                        && ranges[other].start > own.start
                        && ranges[other].end <= own.end
                })
                .collect();
            children.sort_by_key(|&other| (ranges[other].start, std::cmp::Reverse(ranges[other].end)));

            let mut body = String::with_capacity(own.len());
            let mut cursor = own.start;
            for child in children {
                let range = &ranges[child];
                if range.start < cursor {
                    continue;
                }
                body.push_str(&text[cursor..range.start]);
                body.push_str(&child_link(&nodes[child]));
                cursor = range.end;
            }
            body.push_str(&text[cursor..own.end]);
            body
        })
        .collect()
}

fn child_link(node: &NodeSpan<'_>) -> String {
    let label = node.title.replace("]]", "] ]");
    format!("[[id:{}][{}]]\n", node.id, label)
}

fn node_range(text: &str, node: &NodeSpan<'_>) -> Range<usize> {
    if node.level == 0 {
        return 0..text.len();
    }
    let start = line_start(text, char_to_byte(text, node.pos));
    let after_heading = text[start..]
        .find('\n')
        .map(|n| start + n + 1)
        .unwrap_or(text.len());

    let mut offset = after_heading;
    for line in text[after_heading..].split_inclusive('\n') {
        if heading_level(line).is_some_and(|level| level <= node.level) {
            return start..offset;
        }
        offset += line.len();
    }
    start..text.len()
}

/// Byte offset of the 1-based character position `pos`, clamped to the text.
fn char_to_byte(text: &str, pos: i64) -> usize {
    let index = usize::try_from(pos.saturating_sub(1)).unwrap_or(0);
    text.char_indices()
        .nth(index)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

fn line_start(text: &str, byte: usize) -> usize {
    text[..byte].rfind('\n').map(|n| n + 1).unwrap_or(0)
}

fn heading_level(line: &str) -> Option<u32> {
    let stars = line.bytes().take_while(|&b| b == b'*').count();
    let rest = &line[stars..];
    (stars > 0 && (rest.starts_with(' ') || rest.starts_with('\t')))
        .then(|| u32::try_from(stars).unwrap_or(u32::MAX))
}
