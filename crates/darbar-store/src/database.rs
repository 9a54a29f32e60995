use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::error::StoreError;
use crate::schema;

/// Thread-safe SQLite connection wrapper.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create a writable database at the given path, creating the
    /// schema if it is missing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        init_schema(&conn)?;

        info!(path = %path.display(), "scripture database opened");

        Ok(Self::wrap(conn, path.to_owned()))
    }

    /// Open an existing scripture database without write access.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "scripture database {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(schema::READ_ONLY_PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;

        info!(path = %path.display(), "scripture database opened read-only");

        Ok(Self::wrap(conn, path.to_owned()))
    }

    /// Open an empty in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::wrap(conn, PathBuf::from(":memory:")))
    }

    fn wrap(conn: Connection, path: PathBuf) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        }
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure inside a transaction, committing on `Ok`.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::PRAGMAS)
        .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
    conn.execute_batch(schema::CREATE_TABLES)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();
    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [schema::SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.path(), Path::new(":memory:"));
    }

    #[test]
    fn schema_version_set() {
        let db = Database::in_memory().unwrap();
        let version: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn tables_created() {
        let db = Database::in_memory().unwrap();
        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;
                Ok(names)
            })
            .unwrap();
        for table in ["bani_lines", "banis", "compositions", "lines"] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
    }

    #[test]
    fn reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scripture.sqlite");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        drop(db);
        let again = Database::open(&path).unwrap();
        let rows: u32 = again
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn read_only_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Database::open_read_only(&dir.path().join("absent.sqlite"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripture.sqlite");
        drop(Database::open(&path).unwrap());

        let db = Database::open_read_only(&path).unwrap();
        let result = db.with_conn(|conn| {
            conn.execute("INSERT INTO compositions (id, name) VALUES ('X', 'x')", [])?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn with_tx_rolls_back_on_error() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), StoreError> = db.with_tx(|tx| {
            tx.execute("INSERT INTO compositions (id, name) VALUES ('G', 'Guru Granth Sahib')", [])?;
            Err(StoreError::Database("boom".into()))
        });
        assert!(result.is_err());
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM compositions", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
