//! Small bounded pool of catalog connections.
//!
//! Connections are checked out with [`ConnectionPool::get`] and returned on
//! drop. A connection returned with an open transaction is rolled back
//! first, so a failed request never leaks an aborted transaction to the
//! next borrower.

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Reusable catalog connections shared across request handlers.
#[derive(Debug)]
pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl ConnectionPool {
    /// Open the catalog at `path` (creating and migrating it if needed) and
    /// keep up to `size` idle connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be opened.
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        let first = super::open_catalog(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            idle: Mutex::new(vec![first]),
            max_idle: size.max(1),
        })
    }

    /// Path of the catalog this pool serves.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out a connection, opening a new one when none are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool lock is poisoned or a new connection
    /// cannot be opened.
    pub fn get(&self) -> Result<PooledConnection<'_>> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| anyhow!("catalog connection pool lock poisoned"))?
            .pop();

        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!(path = %self.path.display(), "opening additional catalog connection");
                super::open_existing(&self.path)?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
        })
    }

    fn release(&self, conn: Connection) {
        if !conn.is_autocommit() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                warn!("dropping catalog connection after failed rollback: {err}");
                return;
            }
        }

        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(conn);
            }
        }
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or_default()
    }
}

/// A checked-out connection; returns itself to the pool on drop.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
