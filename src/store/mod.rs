//! Tabular store adapter over the SQLite dataset.

pub mod schema;
pub mod sqlite;

pub use schema::{describe_table, LOANS_COLUMNS, SCHEMA_SQL, TRANSACTIONS_COLUMNS};
pub use sqlite::SqliteStore;
