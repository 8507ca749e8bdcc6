use anyhow::Result;
use libsql::Connection;

use crate::watchdog::WATCHDOG_ENTRY_NAME;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Run database migrations.
///
/// Single source of truth for the database schema; safe to call on every
/// startup.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Initial schema").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: services registry and watchdog schedule tables.
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            host_kind TEXT NOT NULL,
            host_value TEXT NOT NULL,
            port TEXT NOT NULL,
            proto TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unknown',
            created INTEGER NOT NULL,
            edited INTEGER NOT NULL,
            last_tested INTEGER,
            last_responded INTEGER
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules (
            name TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL DEFAULT 0,
            interval_seconds INTEGER NOT NULL DEFAULT 30
        )",
        (),
    )
    .await?;

    conn.execute("CREATE UNIQUE INDEX IF NOT EXISTS idx_services_name ON services(name)", ())
        .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_services_status ON services(status)", ()).await?;

    // Seed the watchdog schedule entry, disabled until started via the API.
    conn.execute(
        "INSERT OR IGNORE INTO schedules (name, enabled, interval_seconds) VALUES (?, 0, 30)",
        libsql::params![WATCHDOG_ENTRY_NAME],
    )
    .await?;

    Ok(())
}
