//! Source graph health checks.
//!
//! Provides the `check` command: reads an org-roam database without
//! converting anything and lists the problems a migration would stumble
//! over:
//! - `id` links in the link table whose destination node no longer exists
//! - notes without a title
//! - tracked files that are gone from disk

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::db::{LinkRecord, OrgRoamDatabase};
use crate::models::NoteId;

// ANSI color codes for terminal output
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const MAX_LISTED: usize = 20;

/// Counts of what the database holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub files: usize,
    pub notes: usize,
    pub links: usize,
}

/// Findings of one check run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub stats: GraphStats,
    pub dangling_links: Vec<LinkRecord>,
    pub untitled_notes: Vec<NoteId>,
    pub missing_files: Vec<PathBuf>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_links.is_empty()
            && self.untitled_notes.is_empty()
            && self.missing_files.is_empty()
    }

    pub fn problem_count(&self) -> usize {
        self.dangling_links.len() + self.untitled_notes.len() + self.missing_files.len()
    }
}

/// Inspects every note, link and file of `db`.
pub fn check_graph(db: &OrgRoamDatabase) -> Result<CheckReport> {
    let notes = db.read_notes().context("Failed to read notes")?;
    let node_ids = db.node_ids().context("Failed to read node identifiers")?;
    let files = db.read_files().context("Failed to read tracked files")?;

    let mut report = CheckReport {
        stats: GraphStats {
            files: files.len(),
            notes: notes.len(),
            links: 0,
        },
        ..CheckReport::default()
    };

    let mut ids: Vec<&NoteId> = notes.iter().map(|n| n.id()).collect();
    ids.sort();
    ids.dedup();
    for id in ids {
        let links = db
            .read_links(id)
            .with_context(|| format!("Failed to read links of {id}"))?;
        report.stats.links += links.len();
        for link in links {
            if link.link_type == "id" && !node_ids.contains(&NoteId::new(link.dest.as_str())) {
                tracing::debug!(note_id = %link.source, target = %link.dest, "dangling link");
                report.dangling_links.push(link);
            }
        }
    }

    report.untitled_notes = notes
        .iter()
        .filter(|n| n.title().trim().is_empty())
        .map(|n| n.id().clone())
        .collect();
    report.untitled_notes.sort();

    report.missing_files = files
        .into_iter()
        .filter(|f| !f.path.is_file())
        .map(|f| f.path)
        .collect();

    tracing::info!(
        notes = report.stats.notes,
        problems = report.problem_count(),
        "checked org-roam graph"
    );
    Ok(report)
}

/// Prints the findings to stdout.
pub fn print_check_report(report: &CheckReport) {
    println!("{}org-roam graph{}", BOLD, RESET);
    println!("  Files: {}", report.stats.files);
    println!("  Notes: {}", report.stats.notes);
    println!("  Links: {}", report.stats.links);
    println!();

    if report.is_clean() {
        println!("{}No problems found{}", GREEN, RESET);
        return;
    }

    print_section(
        "Dangling links",
        report
            .dangling_links
            .iter()
            .map(|l| {
                let place = if l.outline.is_empty() {
                    format!("pos {}", l.pos)
                } else {
                    l.outline.join(" > ")
                };
                format!("{} -> id:{} {}({}){}", l.source, l.dest, DIM, place, RESET)
            }),
    );
    print_section(
        "Notes without a title",
        report.untitled_notes.iter().map(ToString::to_string),
    );
    print_section(
        "Missing files",
        report.missing_files.iter().map(|p| p.display().to_string()),
    );
}

fn print_section(heading: &str, items: impl ExactSizeIterator<Item = String>) {
    let total = items.len();
    if total == 0 {
        return;
    }
    println!("{}{} ({}){}:", YELLOW, heading, total, RESET);
    for item in items.take(MAX_LISTED) {
        println!("  - {}", item);
    }
    if total > MAX_LISTED {
        println!("  ... and {} more", total - MAX_LISTED);
    }
    println!();
}
