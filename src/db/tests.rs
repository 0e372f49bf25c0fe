use super::*;
use std::fs;
use tempfile::{TempDir, tempdir};

fn q(s: &str) -> String {
    Expr::Str(s.to_string()).to_string()
}

struct Fixture {
    dir: TempDir,
    db: OrgRoamDatabase,
}

impl Fixture {
    fn new() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ORG_ROAM_SCHEMA).unwrap();
        conn.execute_batch("PRAGMA foreign_keys = OFF;").unwrap();
        Self {
            dir: tempdir().unwrap(),
            db: OrgRoamDatabase::from_connection(conn),
        }
    }

    fn file(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, text).unwrap();
        self.db
            .connection()
            .execute(
                "INSERT INTO files (file, hash, atime, mtime) VALUES (?1, ?2, ?3, ?4)",
                [
                    q(&path.to_string_lossy()),
                    q("abc123"),
                    "(26000 0 0 0)".to_string(),
                    "(26000 1 0 0)".to_string(),
                ],
            )
            .unwrap();
        path
    }

    fn node(&self, id: &str, file: &Path, level: i64, pos: i64, title: &str, properties: &str) {
        self.db
            .connection()
            .execute(
                "INSERT INTO nodes (id, file, level, pos, title, properties) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![q(id), q(&file.to_string_lossy()), level, pos, q(title), properties],
            )
            .unwrap();
    }

    fn exec(&self, sql: &str, params: &[String]) {
        self.db
            .connection()
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .unwrap();
    }
}

#[test]
fn open_missing_database_is_not_found() {
    let dir = tempdir().unwrap();
    let err = OrgRoamDatabase::open(dir.path().join("org-roam.db"))
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<SourceError>(),
        Some(SourceError::NotFound(_))
    ));
}

#[test]
fn open_existing_database_read_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("org-roam.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(ORG_ROAM_SCHEMA).unwrap();
    }

    let db = OrgRoamDatabase::open(&path).unwrap();
    assert!(db.read_notes().unwrap().is_empty());
    let write = db
        .connection()
        .execute("INSERT INTO tags (node_id, tag) VALUES ('a', 'b')", []);
    assert!(write.is_err());
}

#[test]
fn reads_nodes_with_metadata() {
    let fx = Fixture::new();
    let path = fx.file(
        "note.org",
        ":PROPERTIES:\n:ID: n1\n:END:\n#+title: First Note\nHello\n",
    );
    fx.node(
        "n1",
        &path,
        0,
        1,
        "First Note",
        r#"(("CATEGORY" . "note") ("ID" . "n1") ("STATUS" . "draft"))"#,
    );
    fx.exec(
        "INSERT INTO tags (node_id, tag) VALUES (?1, ?2)",
        &[q("n1"), q("rust")],
    );
    fx.exec(
        "INSERT INTO tags (node_id, tag) VALUES (?1, ?2)",
        &[q("n1"), q("notes")],
    );
    fx.exec(
        "INSERT INTO aliases (node_id, alias) VALUES (?1, ?2)",
        &[q("n1"), q("Premier")],
    );
    fx.exec(
        "INSERT INTO refs (node_id, ref, type) VALUES (?1, ?2, ?3)",
        &[q("n1"), q("//example.com"), q("https")],
    );

    let notes = fx.db.read_notes().unwrap();
    assert_eq!(notes.len(), 1);
    let note = &notes[0];
    assert_eq!(note.id().as_str(), "n1");
    assert_eq!(note.title(), "First Note");
    assert_eq!(note.source_path(), path.as_path());
    assert_eq!(note.level(), 0);
    assert_eq!(note.tags(), ["rust", "notes"]);
    assert_eq!(note.aliases(), ["Premier"]);
    assert_eq!(note.refs(), ["https://example.com"]);
    assert_eq!(note.property("status"), Some("draft"));
    assert!(note.raw_body().ends_with("Hello\n"));
    assert_eq!(
        note.modified().map(|t| t.unix_timestamp()),
        Some(26000 * 65536 + 1)
    );
}

#[test]
fn heading_nodes_get_their_subtree() {
    let fx = Fixture::new();
    let text = "#+title: Parent\nIntro\n* Child\n:PROPERTIES:\n:ID: c\n:END:\nChild body\n* Other\nmore\n";
    let path = fx.file("parent.org", text);
    let child_pos = text.find("* Child").unwrap() as i64 + 1;
    fx.node("p", &path, 0, 1, "Parent", "nil");
    fx.node("c", &path, 1, child_pos, "Child", r#"(("ID" . "c"))"#);

    let notes = fx.db.read_notes().unwrap();
    let ids: Vec<&str> = notes.iter().map(|n| n.id().as_str()).collect();
    assert_eq!(ids, vec!["p", "c"]);
    assert_eq!(
        notes[0].raw_body(),
        "#+title: Parent\nIntro\n[[id:c][Child]]\n* Other\nmore\n"
    );
    assert_eq!(
        notes[1].raw_body(),
        "* Child\n:PROPERTIES:\n:ID: c\n:END:\nChild body\n"
    );
}

#[test]
fn missing_note_file_yields_empty_body() {
    let fx = Fixture::new();
    let path = fx.dir.path().join("gone.org");
    fx.node("g", &path, 0, 1, "Gone", "nil");

    let notes = fx.db.read_notes().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].raw_body(), "");
    assert!(notes[0].modified().is_none());
}

#[test]
fn undecodable_nodes_are_skipped() {
    let fx = Fixture::new();
    let path = fx.file("ok.org", "ok\n");
    fx.node("ok", &path, 0, 1, "Ok", "nil");
    fx.exec(
        "INSERT INTO nodes (id, file, level, pos, title) VALUES (?1, ?2, 'x', 1, ?3)",
        &[q("bad"), q(&path.to_string_lossy()), q("Bad")],
    );

    let notes = fx.db.read_notes().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id().as_str(), "ok");
}

#[test]
fn unquoted_legacy_values_are_accepted() {
    let fx = Fixture::new();
    let path = fx.file("legacy.org", "body\n");
    fx.exec(
        "INSERT INTO nodes (id, file, level, pos, title) VALUES ('legacy-id', ?1, 0, 1, 'Legacy Title')",
        &[q(&path.to_string_lossy())],
    );

    let notes = fx.db.read_notes().unwrap();
    assert_eq!(notes[0].id().as_str(), "legacy-id");
    assert_eq!(notes[0].title(), "Legacy Title");
}

#[test]
fn read_links_returns_rows_for_source() {
    let fx = Fixture::new();
    let path = fx.file("a.org", "[[id:b][B]]\n");
    fx.node("a", &path, 0, 1, "A", "nil");
    fx.exec(
        "INSERT INTO links (pos, source, dest, type, properties) VALUES (20, ?1, ?2, ?3, '(:outline nil)')",
        &[q("a"), q("gone"), q("id")],
    );
    fx.exec(
        "INSERT INTO links (pos, source, dest, type, properties) VALUES (5, ?1, ?2, ?3, '(:outline (\"Top\" \"Sub\"))')",
        &[q("a"), q("b"), q("id")],
    );
    fx.exec(
        "INSERT INTO links (pos, source, dest, type, properties) VALUES (1, ?1, ?2, ?3, '(:outline nil)')",
        &[q("other"), q("a"), q("id")],
    );

    let links = fx.db.read_links(&NoteId::new("a")).unwrap();
    let dests: Vec<&str> = links.iter().map(|l| l.dest.as_str()).collect();
    assert_eq!(dests, vec!["b", "gone"]);
    assert_eq!(links[0].link_type, "id");
    assert_eq!(links[0].pos, 5);
    assert_eq!(links[0].outline, vec!["Top", "Sub"]);
    assert!(links[1].outline.is_empty());
}

#[test]
fn node_ids_and_files() {
    let fx = Fixture::new();
    let path = fx.file("x.org", "x\n");
    fx.node("x", &path, 0, 1, "X", "nil");

    let ids = fx.db.node_ids().unwrap();
    assert!(ids.contains(&NoteId::new("x")));

    let files = fx.db.read_files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, path);
    assert_eq!(files[0].hash, "abc123");
    assert_eq!(
        files[0].modified.map(|t| t.unix_timestamp()),
        Some(26000 * 65536 + 1)
    );
}
