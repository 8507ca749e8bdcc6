//! Registry data layer: models, schema migrations, and the libsql-backed
//! store implementation.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Registry, ScheduleStore, ServiceStore, SortDir, SortField};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
