//! `DuckDB` connection pooling.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::Connection;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    /// A database file on disk.
    File(PathBuf),
    /// A private in-memory database shared by every pooled connection.
    Memory,
}

struct PoolInner {
    location: DbLocation,
    max_idle: usize,
    // Every pooled connection is cloned from this one so they all see the same database,
    // including the in-memory case.
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// A small connection pool for `DuckDB` connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open the database and create a pool around it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(location: DbLocation, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let root = match &location {
            DbLocation::File(path) => Connection::open(path)?,
            DbLocation::Memory => Connection::open_in_memory()?,
        };
        configure_connection(&root)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                location,
                max_idle: max_idle.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Acquire a connection, reusing an idle one when available.
    ///
    /// # Errors
    /// Returns an error if a fresh connection cannot be cloned from the root connection.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let connection = match reused {
            Some(connection) => connection,
            None => {
                let root = self
                    .inner
                    .root
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let connection = root.try_clone()?;
                configure_connection(&connection)?;
                connection
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Path of the database file, `None` for in-memory databases.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        match &self.inner.location {
            DbLocation::File(path) => Some(path.as_path()),
            DbLocation::Memory => None,
        }
    }

    /// Number of idle connections currently parked in the pool.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = self
            .pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.pool.max_idle {
            idle.push(connection);
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_return_to_the_pool_on_drop() {
        let pool = ConnectionPool::open(DbLocation::Memory, 2).expect("pool should open");
        assert_eq!(pool.idle_len(), 0);

        {
            let first = pool.acquire().expect("first connection");
            let second = pool.acquire().expect("second connection");
            first.execute_batch("SELECT 1;").expect("query runs");
            second.execute_batch("SELECT 1;").expect("query runs");
        }

        assert_eq!(pool.idle_len(), 2);
        assert!(pool.db_path().is_none());
    }

    #[test]
    fn in_memory_connections_share_one_database() {
        let pool = ConnectionPool::open(DbLocation::Memory, 2).expect("pool should open");
        let writer = pool.acquire().expect("writer");
        writer
            .execute_batch("CREATE TABLE shared (id INTEGER); INSERT INTO shared VALUES (7);")
            .expect("setup runs");

        let reader = pool.acquire().expect("reader");
        let value: i64 = reader
            .query_row("SELECT id FROM shared", [], |row| row.get(0))
            .expect("row is visible to the second connection");
        assert_eq!(value, 7);
    }
}
