use tracing::instrument;

use darbar_core::ids::{CompositionId, LineId};
use darbar_core::scripture::LineRecord;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{contains_pattern, get, get_opt};

const LINE_COLUMNS: &str = "id, composition_id, order_id, gurmukhi, first_letters, \
     english_translation, punjabi_translation, transliteration, source_page";

fn map_line(row: &rusqlite::Row<'_>) -> Result<LineRecord, StoreError> {
    Ok(LineRecord {
        id: LineId::from_raw(get::<String>(row, 0, "lines", "id")?),
        composition_id: CompositionId::from_raw(get::<String>(row, 1, "lines", "composition_id")?),
        order_id: get(row, 2, "lines", "order_id")?,
        gurmukhi: get(row, 3, "lines", "gurmukhi")?,
        first_letters: get(row, 4, "lines", "first_letters")?,
        english_translation: get_opt(row, 5, "lines", "english_translation")?,
        punjabi_translation: get_opt(row, 6, "lines", "punjabi_translation")?,
        transliteration: get_opt(row, 7, "lines", "transliteration")?,
        source_page: get_opt(row, 8, "lines", "source_page")?,
    })
}

pub struct LineRepo {
    db: Database,
}

impl LineRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// First-letter search. The query is trimmed; an empty query matches
    /// nothing and never reaches the database.
    #[instrument(skip(self))]
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LineRecord>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM lines \
             WHERE first_letters LIKE ?1 ESCAPE '\\' \
             ORDER BY composition_id, order_id \
             LIMIT ?2"
        );
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut rows = stmt.query(rusqlite::params![contains_pattern(query), limit as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(map_line(row)?);
            }
            Ok(out)
        })
    }

    /// Insert a composition header. Existing ids are left untouched.
    pub fn insert_composition(&self, id: &CompositionId, name: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO compositions (id, name) VALUES (?1, ?2)",
                rusqlite::params![id.as_str(), name],
            )?;
            Ok(())
        })
    }

    pub fn insert(&self, line: &LineRecord) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO lines ({LINE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                rusqlite::params![
                    line.id.as_str(),
                    line.composition_id.as_str(),
                    line.order_id,
                    line.gurmukhi,
                    line.first_letters,
                    line.english_translation,
                    line.punjabi_translation,
                    line.transliteration,
                    line.source_page,
                ],
            )?;
            Ok(())
        })
    }
}
