//! SQLite document store
//!
//! Read-only access to the cleaned document tables, one table per dataset.

use super::{DocumentStore, TableSpec};
use crate::dataset::Dataset;
use crate::error::{Result, RetrievalError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite keeps at most this many host parameters per statement on old builds
const MAX_IN_PARAMS: usize = 500;

/// Document store backed by a pooled SQLite database
pub struct SqliteDocumentStore {
    pool: DbPool,
    tables: HashMap<Dataset, TableSpec>,
}

impl SqliteDocumentStore {
    /// Open an existing database
    ///
    /// `tables` overrides the default table layout per dataset; datasets not
    /// present use [`TableSpec::for_dataset`].
    pub fn open(db_path: &Path, tables: HashMap<Dataset, TableSpec>) -> Result<Self> {
        if !db_path.exists() {
            return Err(RetrievalError::configuration(format!(
                "Document database not found: {}",
                db_path.display()
            )));
        }

        for spec in tables.values() {
            validate_identifier(&spec.table)?;
            validate_identifier(&spec.id_column)?;
            validate_identifier(&spec.text_column)?;
        }

        // Applied to every pooled connection, not just the first
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA query_only = ON;
                PRAGMA busy_timeout = 5000;
                PRAGMA cache_size = -16000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| {
                RetrievalError::configuration(format!("Failed to create connection pool: {}", e))
            })?;

        tracing::debug!("Opened document store at {}", db_path.display());

        Ok(Self { pool, tables })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn table(&self, dataset: Dataset) -> TableSpec {
        self.tables
            .get(&dataset)
            .cloned()
            .unwrap_or_else(|| TableSpec::for_dataset(dataset))
    }

    /// Number of documents stored for a dataset
    pub fn count(&self, dataset: Dataset) -> Result<usize> {
        let spec = self.table(dataset);
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(&spec.table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get_documents_batch(
        &self,
        dataset: Dataset,
        doc_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        let mut documents = HashMap::with_capacity(doc_ids.len());
        if doc_ids.is_empty() {
            return Ok(documents);
        }

        let spec = self.table(dataset);
        let conn = self.get_conn()?;

        for batch in doc_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "SELECT {id}, {text} FROM {table} WHERE {id} IN ({placeholders})",
                id = quote(&spec.id_column),
                text = quote(&spec.text_column),
                table = quote(&spec.table),
            );

            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(batch.iter()), |row| {
                Ok((row.get::<_, Value>(0)?, row.get::<_, Value>(1)?))
            })?;

            for row in rows {
                let (id, text) = row?;
                if let (Some(id), Some(text)) = (value_to_string(id), value_to_string(text)) {
                    documents.insert(id, text);
                }
            }
        }

        tracing::debug!(
            "Fetched {}/{} documents from {}",
            documents.len(),
            doc_ids.len(),
            spec.table
        );

        Ok(documents)
    }

    fn get_document(&self, dataset: Dataset, doc_id: &str) -> Result<Option<String>> {
        let spec = self.table(dataset);
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {text} FROM {table} WHERE {id} = ?1",
            text = quote(&spec.text_column),
            table = quote(&spec.table),
            id = quote(&spec.id_column),
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query([doc_id])?;
        match rows.next()? {
            Some(row) => Ok(value_to_string(row.get::<_, Value>(0)?)),
            None => Ok(None),
        }
    }

    fn load_doc_ids(&self, dataset: Dataset) -> Result<Vec<String>> {
        let spec = self.table(dataset);
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {id} FROM {table} ORDER BY rowid",
            id = quote(&spec.id_column),
            table = quote(&spec.table),
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, Value>(0))?;

        let mut doc_ids = Vec::new();
        for value in rows {
            match value_to_string(value?) {
                Some(id) => doc_ids.push(id),
                None => {
                    return Err(RetrievalError::configuration(format!(
                        "NULL document id in {} at position {}",
                        spec.table,
                        doc_ids.len()
                    )))
                }
            }
        }

        Ok(doc_ids)
    }
}

/// Ids and texts may be stored with integer or text affinity
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Table and column names come from configuration and are spliced into SQL
fn validate_identifier(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .map_err(|e| RetrievalError::configuration(format!("Invalid identifier pattern: {}", e)))?;

    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(RetrievalError::InvalidConfigValue {
            path: "datasets".to_string(),
            message: format!("'{}' is not a valid SQL identifier", name),
        })
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}
