//! Relational backend: one SQLite table per namespace, searched with sqlite-vec.

use std::path::Path;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use rusqlite::{ffi::sqlite3_auto_extension, params, Connection, OpenFlags, OptionalExtension};
use sqlite_vec::sqlite3_vec_init;
use tracing::{debug, info};

use ragbot_core::{
    validate_namespace, BackendKind, Capabilities, RagError, RawHit, RawScore, RecordBatch,
    Result, SourceFilter, VectorBackend,
};

use crate::schema;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    });
}

/// SQLite-backed vector store.
///
/// Records live in `(id, content, embedding, source)` tables. Identifiers are
/// assigned by `AUTOINCREMENT` and never reused. Embeddings are stored as
/// little-endian `f32` blobs and compared exactly with `vec_distance_cosine`.
pub struct SqliteVecStore {
    /// Connection wrapped in blocking Mutex.
    conn: Mutex<Connection>,

    /// Active table.
    table: String,

    /// Dimensionality of the active table, once a record exists.
    dimension: Option<usize>,
}

impl SqliteVecStore {
    /// Open or create a database at the given path and bind `namespace`.
    ///
    /// With `reset` the namespace table is dropped and recreated empty.
    pub fn open(path: impl AsRef<Path>, namespace: &str, reset: bool) -> Result<Self> {
        let path = path.as_ref();

        if path == Path::new(":memory:") {
            return Self::open_memory(namespace, reset);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        register_vec_extension();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::unavailable("sqlite", format!("Failed to open database: {}", e)))?;

        info!("Database opened at {:?}", path);
        Self::init(conn, namespace, reset)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory(namespace: &str, reset: bool) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory().map_err(|e| {
            RagError::unavailable("sqlite", format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, namespace, reset)
    }

    fn init(conn: Connection, namespace: &str, reset: bool) -> Result<Self> {
        validate_namespace(namespace)?;
        Self::configure_connection(&conn)?;

        let version: String = conn
            .query_row("SELECT vec_version()", [], |row| row.get(0))
            .map_err(|e| RagError::database(format!("sqlite-vec extension unavailable: {}", e)))?;
        debug!("sqlite-vec {} loaded", version);

        let mut store = Self {
            conn: Mutex::new(conn),
            table: namespace.to_string(),
            dimension: None,
        };

        if reset {
            store.recreate_table()?;
        } else {
            store.bind_table(namespace)?;
        }

        Ok(store)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        f(&conn)
    }

    fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(schema::TABLE_EXISTS, params![table], |row| row.get(0))
            .map_err(|e| RagError::database(e.to_string()))?;
        Ok(count > 0)
    }

    fn stored_dimension(conn: &Connection, table: &str) -> Result<Option<usize>> {
        let width: Option<i64> = conn
            .query_row(&schema::embedding_width(table), [], |row| row.get(0))
            .optional()
            .map_err(|e| RagError::database(e.to_string()))?;
        Ok(width.map(|bytes| bytes as usize / std::mem::size_of::<f32>()))
    }

    /// Create `table` if missing and make it active.
    fn bind_table(&mut self, table: &str) -> Result<()> {
        let dimension = self.with_conn(|conn| {
            conn.execute_batch(&schema::create_table(table))
                .map_err(|e| RagError::database(format!("Failed to create table: {}", e)))?;
            Self::stored_dimension(conn, table)
        })?;

        self.table = table.to_string();
        self.dimension = dimension;
        debug!("Bound table {} (dimension {:?})", table, dimension);
        Ok(())
    }

    /// Drop and recreate the active table.
    fn recreate_table(&mut self) -> Result<()> {
        let table = self.table.clone();
        self.with_conn(|conn| {
            conn.execute_batch(&format!(
                "{}\n{}",
                schema::drop_table(&table),
                schema::create_table(&table)
            ))
            .map_err(|e| RagError::database(format!("Failed to reset table: {}", e)))
        })?;

        self.dimension = None;
        info!("Reset table {}", table);
        Ok(())
    }

    /// Convert f32 vector to bytes (little-endian).
    fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Bind value for the source filter: NULL matches everything.
    fn filter_param(filter: &SourceFilter) -> Result<Option<String>> {
        if filter.is_match_all() {
            Ok(None)
        } else {
            Ok(Some(serde_json::to_string(&filter.to_vec())?))
        }
    }
}

#[async_trait]
impl VectorBackend for SqliteVecStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delete_by_source: true,
            exact_search: true,
            synchronous_writes: true,
        }
    }

    fn namespace(&self) -> &str {
        &self.table
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    async fn insert_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        if let Some(expected) = self.dimension {
            if expected != batch.dimension() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: batch.dimension(),
                });
            }
        }

        let table = self.table.clone();
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            tx.execute_batch(&schema::create_table(&table))
                .map_err(|e| RagError::database(format!("Failed to create table: {}", e)))?;

            {
                let mut stmt = tx
                    .prepare(&schema::insert_row(&table))
                    .map_err(|e| RagError::database(e.to_string()))?;

                for (content, embedding, source) in batch.rows() {
                    stmt.execute(params![content, Self::vec_to_bytes(embedding), source])
                        .map_err(|e| RagError::database(format!("Failed to insert row: {}", e)))?;
                }
            }

            tx.commit().map_err(|e| RagError::database(e.to_string()))
        })?;

        self.dimension = Some(batch.dimension());
        debug!("Inserted {} rows into {}", batch.len(), table);
        Ok(())
    }

    async fn search(&self, query: &[f32], filter: &SourceFilter, k: usize) -> Result<Vec<RawHit>> {
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let query_bytes = Self::vec_to_bytes(query);
        let filter_json = Self::filter_param(filter)?;

        self.with_conn(|conn| {
            if !Self::table_exists(conn, &self.table)? {
                return Err(RagError::namespace_not_found(self.table.clone()));
            }

            let mut stmt = conn
                .prepare(&schema::search(&self.table))
                .map_err(|e| RagError::database(e.to_string()))?;

            let hits = stmt
                .query_map(params![query_bytes, filter_json, k as i64], |row| {
                    let distance: f64 = row.get(1)?;
                    Ok(RawHit {
                        content: row.get(0)?,
                        score: RawScore::Distance(distance as f32),
                        source: row.get(2)?,
                    })
                })
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            debug!("Search in {} returned {} rows", self.table, hits.len());
            Ok(hits)
        })
    }

    async fn switch_namespace(&mut self, name: &str) -> Result<()> {
        validate_namespace(name)?;
        self.bind_table(name)
    }

    async fn reset_namespace(&mut self) -> Result<()> {
        self.recreate_table()
    }

    async fn delete_by_source(&mut self, source: &str) -> Result<u64> {
        let source = source.to_string();
        self.with_conn(|conn| {
            if !Self::table_exists(conn, &self.table)? {
                return Err(RagError::namespace_not_found(self.table.clone()));
            }

            let deleted = conn
                .execute(&schema::delete_by_source(&self.table), params![source])
                .map_err(|e| RagError::database(e.to_string()))?;

            debug!("Deleted {} rows with source {} from {}", deleted, source, self.table);
            Ok(deleted as u64)
        })
    }
}
