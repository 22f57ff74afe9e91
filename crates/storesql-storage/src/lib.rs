//! storesql storage crate: SQLite connection, tabular loader, schema
//! snapshot and the guarded database accessor.

pub mod accessor;
pub mod db;
pub mod guard;
pub mod loader;
pub mod render;
pub mod schema;

pub use accessor::{DatabaseAccessor, SqliteAccessor};
pub use db::Database;
pub use guard::QueryGuard;
pub use loader::{load_csv, load_csv_reader, ColumnType, LoadReport};
pub use render::QueryOutput;
pub use schema::{ColumnInfo, SchemaSnapshot, TableSchema};
