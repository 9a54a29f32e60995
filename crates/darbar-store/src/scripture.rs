use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use darbar_core::errors::SourceError;
use darbar_core::scripture::{Bani, LineRecord, ScriptureSource};

use crate::banis::BaniRepo;
use crate::database::Database;
use crate::error::StoreError;
use crate::lines::LineRepo;

/// [`ScriptureSource`] backed by the SQLite scripture database.
///
/// Every query runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteScripture {
    lines: Arc<LineRepo>,
    banis: Arc<BaniRepo>,
    search_limit: usize,
}

impl SqliteScripture {
    pub fn new(db: Database, search_limit: usize) -> Self {
        Self {
            lines: Arc::new(LineRepo::new(db.clone())),
            banis: Arc::new(BaniRepo::new(db)),
            search_limit,
        }
    }

    /// Open the database read-only. A missing file yields an empty
    /// in-memory catalogue so the server can still run.
    pub fn open_or_empty(path: &Path, search_limit: usize) -> Result<Self, StoreError> {
        let db = match Database::open_read_only(path) {
            Ok(db) => db,
            Err(StoreError::NotFound(what)) => {
                warn!(path = %path.display(), %what, "scripture database missing, serving an empty catalogue");
                Database::in_memory()?
            }
            Err(e) => return Err(e),
        };
        Ok(Self::new(db, search_limit))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(SourceError::from)
}

#[async_trait]
impl ScriptureSource for SqliteScripture {
    async fn search_lines(&self, query: &str) -> Result<Vec<LineRecord>, SourceError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let lines = self.lines.clone();
        let query = query.to_string();
        let limit = self.search_limit;
        blocking(move || lines.search(&query, limit)).await
    }

    async fn banis(&self) -> Result<Vec<Bani>, SourceError> {
        let banis = self.banis.clone();
        blocking(move || banis.list()).await
    }
}
