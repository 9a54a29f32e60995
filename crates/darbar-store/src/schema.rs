/// SQL DDL for the scripture database.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS compositions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lines (
    id TEXT PRIMARY KEY,
    composition_id TEXT NOT NULL REFERENCES compositions(id),
    order_id INTEGER NOT NULL,
    gurmukhi TEXT NOT NULL,
    first_letters TEXT NOT NULL,
    english_translation TEXT,
    punjabi_translation TEXT,
    transliteration TEXT,
    source_page INTEGER
);

CREATE TABLE IF NOT EXISTS banis (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bani_lines (
    bani_id TEXT NOT NULL REFERENCES banis(id),
    line_id TEXT NOT NULL REFERENCES lines(id),
    position INTEGER NOT NULL,
    PRIMARY KEY (bani_id, position)
);

CREATE INDEX IF NOT EXISTS idx_lines_composition_order ON lines(composition_id, order_id);
CREATE INDEX IF NOT EXISTS idx_lines_first_letters ON lines(first_letters);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

/// Applied to databases this process writes to. Rollback journal rather
/// than WAL: the file is later opened read-only, which cannot create a -shm.
pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = DELETE;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

/// Applied to the scripture database when served read-only.
pub const READ_ONLY_PRAGMAS: &str = r#"
PRAGMA busy_timeout = 5000;
PRAGMA query_only = ON;
"#;
