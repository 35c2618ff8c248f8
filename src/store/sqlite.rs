//! SQLite-backed tabular store.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use super::schema::SCHEMA_SQL;
use crate::error::QueryError;
use crate::ports::{CellValue, QueryExecutor, TabularResult, DEFAULT_RENDER_ROW_CAP};

/// Executes generated SQL against the `loans` / `transactions` database.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    row_cap: usize,
}

impl SqliteStore {
    /// Opens an existing database file read-only.
    ///
    /// Generated queries run through this store, so statements that write
    /// fail with a readonly-database error instead of touching the data.
    pub async fn open(path: &str) -> Result<Self, QueryError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(false)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        tracing::info!(path = path, "Tabular store opened");
        Ok(Self::from_pool(pool))
    }

    /// Opens a private in-memory database with the dataset schema created.
    ///
    /// Uses a single connection because every SQLite in-memory connection
    /// is its own database.
    pub async fn in_memory() -> Result<Self, QueryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::from_pool(pool);
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            row_cap: DEFAULT_RENDER_ROW_CAP,
        }
    }

    /// Overrides how many rows a result rendering includes.
    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the `loans` and `transactions` tables if they are missing.
    pub async fn initialize_schema(&self) -> Result<(), QueryError> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Executes one or more statements without collecting rows.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), QueryError> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for SqliteStore {
    async fn execute_query(&self, query: &str) -> Result<TabularResult, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let decoded = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(rows = decoded.len(), columns = columns.len(), "Query executed");
        Ok(TabularResult::new(columns, decoded, self.row_cap))
    }
}

/// Decodes a row by each value's runtime storage class, since generated
/// queries produce arbitrary expression columns with no declared type.
fn decode_row(row: &SqliteRow) -> Result<Vec<CellValue>, QueryError> {
    (0..row.columns().len())
        .map(|index| decode_cell(row, index))
        .collect()
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<CellValue, QueryError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();

    let cell = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => CellValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => CellValue::Real(row.try_get_unchecked::<f64, _>(index)?),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => {
            CellValue::Text(row.try_get_unchecked::<String, _>(index)?)
        }
        other => {
            let column = row.columns()[index].name().to_string();
            return Err(QueryError::Decode {
                column,
                message: format!("storage class {}", other),
            });
        }
    };
    Ok(cell)
}
