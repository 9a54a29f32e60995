use tracing::instrument;

use darbar_core::ids::{BaniId, LineId};
use darbar_core::scripture::Bani;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::get;

pub struct BaniRepo {
    db: Database,
}

impl BaniRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every reading list ordered by id, each with its lines in position order.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<Bani>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT b.id, b.name, bl.line_id \
                 FROM banis b LEFT JOIN bani_lines bl ON bl.bani_id = b.id \
                 ORDER BY b.id, bl.position",
            )?;
            let mut rows = stmt.query([])?;
            let mut banis: Vec<Bani> = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = get(row, 0, "banis", "id")?;
                let line: Option<String> = get(row, 2, "bani_lines", "line_id")?;
                let is_new = banis.last().map_or(true, |b| b.id.as_str() != id);
                if is_new {
                    banis.push(Bani {
                        id: BaniId::from_raw(id),
                        name: get(row, 1, "banis", "name")?,
                        line_references: Vec::new(),
                    });
                }
                if let (Some(line), Some(bani)) = (line, banis.last_mut()) {
                    bani.line_references.push(LineId::from_raw(line));
                }
            }
            Ok(banis)
        })
    }

    /// Insert a reading list and its line references atomically.
    pub fn insert(&self, bani: &Bani) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO banis (id, name) VALUES (?1, ?2)",
                rusqlite::params![bani.id.as_str(), bani.name],
            )?;
            let mut stmt = tx.prepare_cached(
                "INSERT INTO bani_lines (bani_id, line_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, line) in bani.line_references.iter().enumerate() {
                stmt.execute(rusqlite::params![bani.id.as_str(), line.as_str(), position as i64])?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::tests::line;
    use crate::lines::LineRepo;
    use darbar_core::ids::CompositionId;

    fn seeded() -> (Database, BaniRepo) {
        let db = Database::in_memory().unwrap();
        let lines = LineRepo::new(db.clone());
        lines.insert_composition(&CompositionId::from_raw("A"), "A").unwrap();
        for (i, id) in ["A1", "A2", "A3"].iter().enumerate() {
            lines.insert(&line("A", id, i as i64 + 1, "x")).unwrap();
        }
        (db.clone(), BaniRepo::new(db))
    }

    fn bani(id: &str, name: &str, lines: &[&str]) -> Bani {
        Bani {
            id: BaniId::from_raw(id),
            name: name.into(),
            line_references: lines.iter().map(|l| LineId::from_raw(*l)).collect(),
        }
    }

    #[test]
    fn list_empty() {
        let (_db, repo) = seeded();
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn list_preserves_position_order() {
        let (_db, repo) = seeded();
        repo.insert(&bani("2", "Rehras Sahib", &["A3", "A1"])).unwrap();
        repo.insert(&bani("1", "Japji Sahib", &["A1", "A2", "A3"])).unwrap();

        let banis = repo.list().unwrap();
        assert_eq!(banis.len(), 2);
        assert_eq!(banis[0], bani("1", "Japji Sahib", &["A1", "A2", "A3"]));
        assert_eq!(banis[1], bani("2", "Rehras Sahib", &["A3", "A1"]));
    }

    #[test]
    fn bani_without_lines_is_listed() {
        let (_db, repo) = seeded();
        repo.insert(&bani("7", "Empty", &[])).unwrap();
        let banis = repo.list().unwrap();
        assert_eq!(banis, vec![bani("7", "Empty", &[])]);
    }

    #[test]
    fn insert_with_unknown_line_is_atomic() {
        let (_db, repo) = seeded();
        assert!(repo.insert(&bani("3", "Broken", &["A1", "missing"])).is_err());
        assert!(repo.list().unwrap().is_empty());
    }
}
