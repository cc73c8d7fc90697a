//! SQL templates for namespace tables.
//!
//! Table names cannot be bound as parameters, so every template takes a
//! name that already passed `validate_namespace` and quotes it.

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create a namespace table and its source index if missing.
pub(crate) fn create_table(table: &str) -> String {
    let index = quote_ident(&format!("idx_{}_source", table));
    let table = quote_ident(table);
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    source TEXT NOT NULL DEFAULT 'Unknown'
);
CREATE INDEX IF NOT EXISTS {index} ON {table}(source);
"#
    )
}

pub(crate) fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(table))
}

pub(crate) fn insert_row(table: &str) -> String {
    format!(
        "INSERT INTO {} (content, embedding, source) VALUES (?1, ?2, ?3)",
        quote_ident(table)
    )
}

/// Top-k by cosine distance. `?1` is the query blob, `?2` a JSON array of
/// allowed sources (NULL matches all), `?3` the limit. Rows whose distance
/// is undefined (zero-norm embeddings) are skipped.
pub(crate) fn search(table: &str) -> String {
    format!(
        r#"
SELECT content, distance, source
FROM (
    SELECT content, vec_distance_cosine(embedding, ?1) AS distance, source
    FROM {}
    WHERE ?2 IS NULL OR source IN (SELECT value FROM json_each(?2))
)
WHERE distance IS NOT NULL
ORDER BY distance
LIMIT ?3
"#,
        quote_ident(table)
    )
}

/// Byte length of any stored embedding, used to recover the dimension.
pub(crate) fn embedding_width(table: &str) -> String {
    format!("SELECT length(embedding) FROM {} LIMIT 1", quote_ident(table))
}

pub(crate) fn delete_by_source(table: &str) -> String {
    format!("DELETE FROM {} WHERE source = ?1", quote_ident(table))
}

pub(crate) const TABLE_EXISTS: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("docs"), "\"docs\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_search_is_parameterized() {
        let sql = search("docs");
        assert!(sql.contains("FROM \"docs\""));
        assert!(sql.contains("json_each(?2)"));
        assert!(sql.contains("LIMIT ?3"));
        assert!(sql.contains("distance IS NOT NULL"));
    }
}
