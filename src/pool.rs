//! Connection pool.
//!
//! Multiplexes many concurrent callers onto a bounded set of connections.
//! Internal state mutations are serialized behind a mutex; the semaphore is
//! both the size cap and the release signal for waiting acquirers. A
//! connection is never visible to two callers at once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::CommandTag;
use crate::rows::{ConnectionHandle, Rows, ScanTarget};
use crate::types::PgValue;

struct PoolInner {
    config: ConnectionConfig,
    max_size: usize,
    /// Live connections waiting for a caller, oldest first.
    idle: Mutex<VecDeque<Connection>>,
    /// Pool-level prepared statements (name -> sql). Every vended
    /// connection is primed with these before the caller sees it.
    statements: Mutex<HashMap<String, String>>,
    semaphore: Arc<Semaphore>,
}

/// A bounded pool of PostgreSQL connections.
///
/// Connections are created lazily, up to `max_size`; acquirers beyond that
/// wait for a release. Cloning the pool is cheap and shares the same set of
/// connections.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool that will open at most `max_size` connections with
    /// `config`. No connection is dialed until the first acquire.
    pub fn new(config: ConnectionConfig, max_size: usize) -> Pool {
        Pool {
            inner: Arc::new(PoolInner {
                config,
                max_size: max_size.max(1),
                idle: Mutex::new(VecDeque::new()),
                statements: Mutex::new(HashMap::new()),
                semaphore: Arc::new(Semaphore::new(max_size.max(1))),
            }),
        }
    }

    /// Maximum number of connections this pool will hold.
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Number of idle connections currently held.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Check a connection out of the pool, waiting for a release when all
    /// `max_size` are in use. Dead idle connections are discarded and
    /// replaced; vended connections carry every pool-level prepared
    /// statement.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Usage("pool is closed".to_string()))?;

        loop {
            let candidate = self.inner.idle.lock().pop_front();
            let mut conn = match candidate {
                Some(conn) if conn.is_alive() => conn,
                Some(dead) => {
                    debug!(cause = ?dead.cause_of_death(), "discarding dead pooled connection");
                    continue;
                }
                None => Connection::connect(self.inner.config.clone()).await?,
            };

            match self.prime(&mut conn).await {
                Ok(()) => {
                    return Ok(PooledConnection {
                        conn: Some(conn),
                        pool: Arc::clone(&self.inner),
                        _permit: permit,
                    })
                }
                Err(err) => {
                    // The failure marked the connection dead; dropping it
                    // removes it from the pool.
                    warn!(error = %err, "discarding connection that failed priming");
                }
            }
        }
    }

    /// Drain any leftover protocol state and prepare missing pool-level
    /// statements. Connections that were checked out while
    /// [`Pool::prepare`] ran catch up here.
    async fn prime(&self, conn: &mut Connection) -> Result<()> {
        conn.ensure_ready().await?;
        let missing: Vec<(String, String)> = {
            let statements = self.inner.statements.lock();
            statements
                .iter()
                .filter(|(name, _)| conn.prepared_statement(name).is_none())
                .map(|(name, sql)| (name.clone(), sql.clone()))
                .collect()
        };
        for (name, sql) in missing {
            conn.prepare(&name, &sql).await?;
        }
        Ok(())
    }

    /// Run a query on a pooled connection and stream its rows. The
    /// connection rides inside the cursor and returns to the pool when the
    /// cursor finishes.
    pub async fn query(&self, sql: &str, params: &[PgValue]) -> Result<Rows<PooledConnection>> {
        let conn = self.acquire().await?;
        Rows::start(conn, sql, params).await
    }

    /// Single-row convenience over [`Pool::query`].
    pub async fn query_row(
        &self,
        sql: &str,
        params: &[PgValue],
        targets: &mut [ScanTarget<'_>],
    ) -> Result<()> {
        let mut conn = self.acquire().await?;
        conn.connection().query_row(sql, params, targets).await
    }

    /// Execute `sql` on a pooled connection and return its completion tag.
    pub async fn exec(&self, sql: &str, params: &[PgValue]) -> Result<CommandTag> {
        let mut conn = self.acquire().await?;
        conn.connection().exec(sql, params).await
    }

    /// Register a prepared statement pool-wide: it is prepared on every
    /// idle connection now and on every other connection before it is next
    /// vended. A preparation failure kills that connection and drops it
    /// from the pool.
    pub async fn prepare(&self, name: &str, sql: &str) -> Result<()> {
        self.inner
            .statements
            .lock()
            .insert(name.to_string(), sql.to_string());

        let mut idle = {
            let mut guard = self.inner.idle.lock();
            std::mem::take(&mut *guard)
        };
        let mut first_err = None;
        while let Some(mut conn) = idle.pop_front() {
            let prepared = conn.prepare(name, sql).await.map(|_| ());
            match prepared {
                Ok(()) => self.inner.idle.lock().push_back(conn),
                Err(err) => {
                    warn!(name, error = %err, "dropping connection that failed to prepare");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove a pool-level prepared statement, deallocating it on every
    /// idle connection.
    pub async fn deallocate(&self, name: &str) -> Result<()> {
        self.inner.statements.lock().remove(name);

        let mut idle = {
            let mut guard = self.inner.idle.lock();
            std::mem::take(&mut *guard)
        };
        let mut first_err = None;
        while let Some(mut conn) = idle.pop_front() {
            if conn.prepared_statement(name).is_none() {
                self.inner.idle.lock().push_back(conn);
                continue;
            }
            match conn.deallocate(name).await {
                Ok(()) => self.inner.idle.lock().push_back(conn),
                Err(err) => {
                    warn!(name, error = %err, "dropping connection that failed to deallocate");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Close every idle connection and refuse future acquires. Checked-out
    /// connections die when their handles drop.
    pub async fn close(&self) {
        self.inner.semaphore.close();
        let mut idle = {
            let mut guard = self.inner.idle.lock();
            std::mem::take(&mut *guard)
        };
        while let Some(mut conn) = idle.pop_front() {
            let _ = conn.close().await;
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("max_size", &self.inner.max_size)
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

/// A connection checked out of a [`Pool`].
///
/// This is the owned handle the cursor machinery rides on: dropping it
/// returns the connection to the pool when it is still alive (dead
/// connections are simply dropped) and wakes one waiting acquirer.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// The underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        match self.conn.as_mut() {
            Some(conn) => conn,
            // The slot is only vacated by drop.
            None => unreachable!("connection already returned to the pool"),
        }
    }
}

impl ConnectionHandle for PooledConnection {
    fn conn(&mut self) -> &mut Connection {
        self.connection()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self.conn.as_ref() {
            Some(conn) => conn,
            None => unreachable!("connection already returned to the pool"),
        }
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_alive() {
                self.pool.idle.lock().push_back(conn);
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_floor_is_one() {
        let pool = Pool::new(ConnectionConfig::new("localhost"), 0);
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn pool_starts_empty() {
        let pool = Pool::new(ConnectionConfig::new("localhost"), 4);
        assert_eq!(pool.idle_count(), 0);
    }
}
