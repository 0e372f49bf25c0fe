/// The org-roam (v2) database schema.
///
/// The reader never creates tables in a user's database; this is used to
/// build fixture databases. Columns are untyped because org-roam stores the
/// printed Elisp form of every value.
pub const ORG_ROAM_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    file UNIQUE PRIMARY KEY,
    title,
    hash NOT NULL,
    atime NOT NULL,
    mtime NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id NOT NULL PRIMARY KEY,
    file NOT NULL,
    level NOT NULL,
    pos NOT NULL,
    todo,
    priority,
    scheduled TEXT,
    deadline TEXT,
    title,
    properties,
    olp,
    FOREIGN KEY (file) REFERENCES files (file) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS aliases (
    node_id NOT NULL,
    alias,
    FOREIGN KEY (node_id) REFERENCES nodes (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS refs (
    node_id NOT NULL,
    ref NOT NULL,
    type NOT NULL,
    FOREIGN KEY (node_id) REFERENCES nodes (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tags (
    node_id NOT NULL,
    tag,
    FOREIGN KEY (node_id) REFERENCES nodes (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS links (
    pos NOT NULL,
    source NOT NULL,
    dest NOT NULL,
    type NOT NULL,
    properties NOT NULL,
    FOREIGN KEY (source) REFERENCES nodes (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS alias_node_id ON aliases (node_id);
CREATE INDEX IF NOT EXISTS refs_node_id ON refs (node_id);
CREATE INDEX IF NOT EXISTS tags_node_id ON tags (node_id);
"#;
