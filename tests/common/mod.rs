//! A throwaway org-roam graph: org files plus a matching database.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use roam2md::OrgRoamDatabase;
use roam2md::db::ORG_ROAM_SCHEMA;
use roam2md::elisp::Expr;
use rusqlite::Connection;
use tempfile::{TempDir, tempdir};

/// Elisp-printed string, the way org-roam stores text columns.
pub fn q(s: &str) -> String {
    Expr::Str(s.to_string()).to_string()
}

pub struct RoamGraph {
    dir: TempDir,
    db_path: PathBuf,
    conn: Connection,
}

impl RoamGraph {
    pub fn new() -> Result<Self> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("org"))?;
        let db_path = dir.path().join("org-roam.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(ORG_ROAM_SCHEMA)?;
        Ok(Self { dir, db_path, conn })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn org_dir(&self) -> PathBuf {
        self.dir.path().join("org")
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.dir.path().join("vault")
    }

    /// Writes `name` under the org directory and registers it.
    pub fn file(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.org_dir().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
        self.conn.execute(
            "INSERT INTO files (file, hash, atime, mtime) VALUES (?1, ?2, ?3, ?4)",
            [
                q(&path.to_string_lossy()),
                q("0000"),
                "(26000 0 0 0)".to_string(),
                "(26000 0 0 0)".to_string(),
            ],
        )?;
        Ok(path)
    }

    /// A file-level note: properties drawer, title keyword, then `body`.
    pub fn file_note(&self, id: &str, title: &str, name: &str, body: &str) -> Result<PathBuf> {
        let text = format!(":PROPERTIES:\n:ID:       {id}\n:END:\n#+title: {title}\n\n{body}");
        let path = self.file(name, &text)?;
        self.node(id, &path, 0, 1, title)?;
        Ok(path)
    }

    pub fn node(&self, id: &str, file: &Path, level: i64, pos: i64, title: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO nodes (id, file, level, pos, title, properties) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                q(id),
                q(&file.to_string_lossy()),
                level,
                pos,
                q(title),
                format!("((\"ID\" . {}))", q(id)),
            ],
        )?;
        Ok(())
    }

    pub fn alias(&self, id: &str, alias: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO aliases (node_id, alias) VALUES (?1, ?2)",
            [q(id), q(alias)],
        )?;
        Ok(())
    }

    pub fn tag(&self, id: &str, tag: &str) -> Result<()> {
        self.conn
            .execute("INSERT INTO tags (node_id, tag) VALUES (?1, ?2)", [q(id), q(tag)])?;
        Ok(())
    }

    /// `reference` is split org-roam style: `https://x` becomes type `https`
    /// and ref `//x`.
    pub fn reference(&self, id: &str, reference: &str) -> Result<()> {
        let (kind, rest) = reference.split_once(':').unwrap_or(("cite", reference));
        self.conn.execute(
            "INSERT INTO refs (node_id, ref, type) VALUES (?1, ?2, ?3)",
            [q(id), q(rest), q(kind)],
        )?;
        Ok(())
    }

    pub fn link(&self, source: &str, dest: &str, kind: &str, pos: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO links (pos, source, dest, type, properties) VALUES (?1, ?2, ?3, ?4, '(:outline nil)')",
            rusqlite::params![pos, q(source), q(dest), q(kind)],
        )?;
        Ok(())
    }

    /// Opens the database the way the CLI does.
    pub fn open(&self) -> Result<OrgRoamDatabase> {
        OrgRoamDatabase::open(&self.db_path)
    }
}
