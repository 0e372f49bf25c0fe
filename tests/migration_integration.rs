mod common;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use common::RoamGraph;
use roam2md::config::ConverterKind;
use roam2md::pipeline::Document;
use roam2md::{Config, MigrationOutcome, NoteId, VaultWriter, convert, write_report};

fn config() -> Config {
    Config {
        workers: 2,
        ..Config::default()
    }
}

fn migrate(graph: &RoamGraph, config: &Config) -> Result<MigrationOutcome> {
    let db = graph.open()?;
    let notes = db.read_notes()?;
    Ok(roam2md::run(&notes, config, convert::build(&config.converter))?)
}

fn document<'a>(outcome: &'a MigrationOutcome, id: &str) -> &'a Document {
    outcome
        .documents
        .iter()
        .find(|d| d.note_id.as_str() == id)
        .unwrap_or_else(|| panic!("no document for {id}"))
}

fn stem(outcome: &MigrationOutcome, id: &str) -> String {
    outcome.report.written[&NoteId::new(id)]
        .with_extension("")
        .to_string_lossy()
        .into_owned()
}

#[test]
fn test_duplicate_titles_get_distinct_linkable_files() -> Result<()> {
    // Arrange: two notes titled "Project" and a note linking to each
    let graph = RoamGraph::new()?;
    graph.file_note("id-1", "Project", "p1.org", "first\n")?;
    graph.file_note("id-2", "Project", "p2.org", "second\n")?;
    graph.file_note(
        "index",
        "Index",
        "index.org",
        "[[id:id-1][First]] and [[id:id-2][Second]]\n",
    )?;

    // Act
    let outcome = migrate(&graph, &config())?;

    // Assert: distinct disambiguated paths, each linked precisely
    let p1 = &outcome.report.written[&NoteId::new("id-1")];
    let p2 = &outcome.report.written[&NoteId::new("id-2")];
    assert_ne!(p1, p2);
    assert!(p1.to_string_lossy().starts_with("project-"));
    assert!(p2.to_string_lossy().starts_with("project-"));
    assert_eq!(outcome.report.collisions.len(), 2);

    let index = &document(&outcome, "index").content;
    assert!(index.contains(&format!("[[{}|First]]", stem(&outcome, "id-1"))));
    assert!(index.contains(&format!("[[{}|Second]]", stem(&outcome, "id-2"))));

    Ok(())
}

#[test]
fn test_refs_become_links_and_aliases_stay_a_list() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("n", "Note", "note.org", "")?;
    graph.reference("n", "https://example.com")?;

    let outcome = migrate(&graph, &config())?;

    assert_eq!(
        document(&outcome, "n").content,
        "---\ntitle: Note\naliases: []\ntags: []\nlinks:\n- https://example.com\nmodified: 2023-12-30T11:33:20Z\n---\n"
    );

    let mut config = config();
    config.conversion.preserve_creation_date = false;
    let outcome = migrate(&graph, &config)?;
    assert!(!document(&outcome, "n").content.contains("modified:"));
    Ok(())
}

#[test]
fn test_identifier_link_becomes_titled_wikilink() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("ABC", "Target", "target.org", "target body\n")?;
    graph.file_note("src", "Source", "source.org", "See [[id:ABC][Example]] here.\n")?;

    let outcome = migrate(&graph, &config())?;

    assert!(
        document(&outcome, "src")
            .content
            .contains("See [[Target|Example]] here.")
    );
    assert!(outcome.report.unresolved_links.is_empty());
    Ok(())
}

#[test]
fn test_dangling_identifier_is_kept_and_reported() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("src", "Source", "source.org", "Before [[id:MISSING][Ghost]] after.\n")?;

    let outcome = migrate(&graph, &config())?;

    assert!(
        document(&outcome, "src")
            .content
            .contains("Before [[id:MISSING][Ghost]] after.")
    );
    assert_eq!(outcome.report.unresolved_links.len(), 1);
    let unresolved = &outcome.report.unresolved_links[0];
    assert_eq!(unresolved.note_id, NoteId::new("src"));
    assert_eq!(unresolved.raw_target, "id:MISSING");
    assert!(!unresolved.reason.is_empty());
    assert!(outcome.report.failures.is_empty());
    Ok(())
}

#[test]
fn test_fuzzy_title_tie_resolves_to_smallest_identifier() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("b-id", "Project", "b.org", "")?;
    graph.file_note("a-id", "Project", "a.org", "")?;
    graph.file_note("src", "Source", "source.org", "see [[Project]]\n")?;

    let first = migrate(&graph, &config())?;
    let second = migrate(&graph, &Config { workers: 1, ..config() })?;

    let expected = format!("see [[{}|Project]]", stem(&first, "a-id"));
    assert!(document(&first, "src").content.contains(&expected));
    assert_eq!(document(&first, "src"), document(&second, "src"));
    Ok(())
}

#[test]
fn test_paths_are_unique_even_with_case_variants() -> Result<()> {
    let graph = RoamGraph::new()?;
    for (i, title) in ["Rust", "rust", "RUST", "Rust!", "Other", "other"]
        .iter()
        .enumerate()
    {
        graph.file_note(&format!("n{i}"), title, &format!("n{i}.org"), "")?;
    }

    let outcome = migrate(&graph, &config())?;

    assert_eq!(outcome.report.written.len(), 6);
    let mut seen = HashSet::new();
    for path in outcome.report.written.values() {
        assert!(seen.insert(path.to_string_lossy().to_lowercase()), "{path:?}");
    }
    Ok(())
}

#[test]
fn test_destination_syntax_passes_through_unchanged() -> Result<()> {
    let graph = RoamGraph::new()?;
    let body = "Already [[Target]] and [[Target|alias]] here.\n";
    graph.file_note("t", "Target", "target.org", "")?;
    graph.file_note("n", "Note", "note.org", body)?;
    let config = Config {
        converter: roam2md::config::ConverterConfig {
            kind: ConverterKind::None,
            ..Default::default()
        },
        ..config()
    };

    let outcome = migrate(&graph, &config)?;

    assert!(document(&outcome, "n").content.ends_with(&format!("\n{body}")));
    assert!(outcome.report.unresolved_links.is_empty());
    Ok(())
}

#[test]
fn test_renamed_target_uses_current_title() -> Result<()> {
    let graph = RoamGraph::new()?;
    let path = graph.file(
        "b.org",
        ":PROPERTIES:\n:ID: b\n:END:\n#+title: Old Name\n\nbody\n",
    )?;
    graph.node("b", &path, 0, 1, "New Name")?;
    graph.file_note("a", "Linker", "a.org", "[[id:b]]\n")?;

    let outcome = migrate(&graph, &config())?;

    let linker = &document(&outcome, "a").content;
    assert!(linker.contains("[[New Name]]"));
    assert!(!linker.contains("Old Name"));
    assert_eq!(
        outcome.report.written[&NoteId::new("b")],
        PathBuf::from("new-name.md")
    );
    Ok(())
}

#[test]
fn test_every_extracted_link_is_reinserted() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("t", "Target", "t.org", "")?;
    graph.file_note(
        "n",
        "Note",
        "n.org",
        "* Setup\n- [[id:t]]\n- /[[id:t][emph label]]/\n- [[https://example.com][site]]\n- [[*Setup][up]]\n- [[id:nope][gone]]\n",
    )?;

    let outcome = migrate(&graph, &config())?;
    let content = &document(&outcome, "n").content;

    assert!(content.contains("# Setup"));
    assert!(content.contains("- [[Target]]"));
    assert!(content.contains("*[[Target|emph label]]*"));
    assert!(content.contains("- [site](https://example.com)"));
    assert!(content.contains("- [[#Setup|up]]"));
    assert!(content.contains("- [[id:nope][gone]]"));
    assert_eq!(content.matches("[[").count(), 4);
    assert_eq!(outcome.report.unresolved_links.len(), 1);
    Ok(())
}

#[test]
fn test_heading_nodes_become_their_own_notes() -> Result<()> {
    let graph = RoamGraph::new()?;
    let text = ":PROPERTIES:\n:ID: parent\n:END:\n#+title: Parent\n\nIntro\n* Child\n:PROPERTIES:\n:ID: child\n:END:\nChild text\n* Plain\ntail\n";
    let path = graph.file("parent.org", text)?;
    let child_pos = text[..text.find("* Child").unwrap()].chars().count() as i64 + 1;
    graph.node("parent", &path, 0, 1, "Parent")?;
    graph.node("child", &path, 1, child_pos, "Child")?;
    graph.tag("child", "deep work")?;
    graph.alias("child", "Kid")?;

    let outcome = migrate(&graph, &config())?;

    let parent = &document(&outcome, "parent").content;
    assert!(parent.contains("Intro"));
    assert!(parent.contains("[[Child]]"));
    assert!(!parent.contains("Child text"));
    assert!(parent.contains("# Plain"));

    let child = &document(&outcome, "child").content;
    assert!(child.starts_with("---\ntitle: Child\naliases:\n- Kid\ntags:\n- deep-work\n"));
    assert!(child.contains("Child text"));
    assert!(!child.contains(":PROPERTIES:"));
    Ok(())
}

#[test]
fn test_preserve_structure_mirrors_directories() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("d", "Today", "daily/today.org", "")?;
    graph.file_note("t", "Top", "top.org", "[[file:daily/today.org][today]]\n")?;
    let mut config = config();
    config.conversion.preserve_structure = true;
    config.conversion.base_path = Some(graph.org_dir());

    let outcome = migrate(&graph, &config)?;

    assert_eq!(
        outcome.report.written[&NoteId::new("d")],
        Path::new("daily").join("today.md")
    );
    assert!(document(&outcome, "t").content.contains("[[Today|today]]"));
    Ok(())
}

#[test]
fn test_note_outside_base_aborts_run() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("n", "Note", "note.org", "")?;
    let mut config = config();
    config.conversion.preserve_structure = true;
    config.conversion.base_path = Some(graph.org_dir().join("elsewhere"));

    let err = migrate(&graph, &config).unwrap_err();
    assert!(err.downcast_ref::<roam2md::StructureError>().is_some());
    Ok(())
}

#[test]
fn test_converter_failure_is_isolated_per_note() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("empty", "Empty", "empty.org", "")?;
    graph.file_note("full", "Full", "full.org", "some prose\n")?;
    let mut config = config();
    config.converter.kind = ConverterKind::Pandoc;
    config.converter.pandoc_path = "/nonexistent/roam2md-pandoc".to_string();

    let outcome = migrate(&graph, &config)?;

    assert_eq!(outcome.documents.len(), 1);
    assert_eq!(outcome.documents[0].note_id, NoteId::new("empty"));
    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].note_id, NoteId::new("full"));
    assert!(!outcome.report.written.contains_key(&NoteId::new("full")));
    Ok(())
}

#[test]
fn test_vault_write_copies_attachments() -> Result<()> {
    let graph = RoamGraph::new()?;
    fs::create_dir_all(graph.org_dir().join("img"))?;
    fs::write(graph.org_dir().join("img/Diagram.PNG"), b"png")?;
    graph.file_note("n", "Note", "note.org", "[[file:img/Diagram.PNG]]\n")?;

    let outcome = migrate(&graph, &config())?;
    let vault = graph.vault_dir();
    let summary = VaultWriter::new(&vault, false).write(&outcome)?;

    assert!(document(&outcome, "n").content.contains("![[assets/diagram.png]]"));
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.attachments, 1);
    assert_eq!(fs::read(vault.join("assets/diagram.png"))?, b"png");
    assert!(fs::read_to_string(vault.join("note.md"))?.starts_with("---\ntitle: Note\n"));
    Ok(())
}

#[test]
fn test_dry_run_writes_report_but_no_notes() -> Result<()> {
    let graph = RoamGraph::new()?;
    graph.file_note("n", "Note", "note.org", "[[id:gone][x]]\n")?;

    let mut outcome = migrate(&graph, &config())?;
    outcome.report.dry_run = true;
    let vault = graph.vault_dir();
    let summary = VaultWriter::new(&vault, true).write(&outcome)?;
    let report_path = graph.root().join("report.json");
    write_report(&outcome.report, &report_path)?;

    assert_eq!(summary.documents, 1);
    assert!(!vault.exists());
    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report_path)?)?;
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["written"]["n"], "note.md");
    assert_eq!(report["unresolved_links"][0]["raw_target"], "id:gone");
    Ok(())
}
