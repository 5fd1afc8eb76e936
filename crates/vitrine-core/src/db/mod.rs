//! SQLite catalog: the system of record for product data.
//!
//! Connections are opened with:
//! - `journal_mode = WAL` so search readers never block the indexer
//! - `busy_timeout = 5s` to absorb transient lock contention
//! - `foreign_keys = ON` so deleting a record drops its stored vector

pub mod migrations;
pub mod pool;
pub mod records;
pub mod schema;
pub mod sqlite_vec;
pub mod vectors;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};
use tracing::debug;

pub use pool::{ConnectionPool, PooledConnection};

/// Busy timeout used for catalog connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the catalog database, apply runtime pragmas and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening, configuring or migrating the database fails.
pub fn open_catalog(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create catalog directory {}", parent.display()))?;
    }

    let mut conn = open_configured(path)?;
    migrations::migrate(&mut conn).context("apply catalog migrations")?;
    Ok(conn)
}

/// Open an existing catalog without creating or migrating it.
///
/// # Errors
///
/// Returns an error if the file is missing or cannot be configured.
pub fn open_existing(path: &Path) -> Result<Connection> {
    if !path.exists() {
        anyhow::bail!("catalog database not found at {}", path.display());
    }
    open_configured(path)
}

fn open_configured(path: &Path) -> Result<Connection> {
    if let Err(reason) = sqlite_vec::register_auto_extension() {
        debug!("sqlite-vec unavailable: {reason}");
    }

    let conn = Connection::open(path)
        .with_context(|| format!("open catalog database {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}
