use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get a nullable column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    get(row, idx, table, column)
}

/// Escape LIKE special characters. Pair with `ESCAPE '\'` in the query.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `%query%` pattern with the query escaped.
pub fn contains_pattern(s: &str) -> String {
    format!("%{}%", escape_like(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn escape_like_special_chars() {
        assert_eq!(escape_like("hsggh"), "hsggh");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("foo_bar"), "foo\\_bar");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("%_\\"), "\\%\\_\\\\");
    }

    #[test]
    fn contains_pattern_wraps_escaped_query() {
        assert_eq!(contains_pattern("ik"), "%ik%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn get_reports_table_and_column() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT 'text'", [], |row| {
                Ok(get::<i64>(row, 0, "lines", "order_id"))
            })
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptRow { table: "lines", column: "order_id", .. }
        ));
    }

    #[test]
    fn get_opt_reads_null() {
        let conn = Connection::open_in_memory().unwrap();
        let value = conn
            .query_row("SELECT NULL", [], |row| {
                Ok(get_opt::<String>(row, 0, "lines", "transliteration"))
            })
            .unwrap()
            .unwrap();
        assert!(value.is_none());
    }
}
