//! Fixed-size blocking connection pool
//!
//! All connections are opened when the pool is built. `acquire` hands one out
//! or waits on a condition variable until another thread releases one.
//!
//! # Timeouts
//!
//! An acquire timeout of [`Duration::ZERO`] means "try once": the call fails
//! with `PoolTimeout` immediately if nothing is idle. [`Duration::MAX`] (or any
//! timeout too large to represent as a deadline) waits without bound.
//!
//! # Example
//!
//! ```no_run
//! use rust_sql_pool::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let pool = ConnectionPool::from_config(
//!     SqliteDriver::new(),
//!     PoolConfig::new("app.db").with_connections(4),
//! )?;
//!
//! let names = pool.with_connection(Duration::from_secs(1), |conn| {
//!     conn.query_all("SELECT name FROM users", params![])
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::core::config::{PoolConfig, DEFAULT_ACQUIRE_TIMEOUT};
use crate::core::connection::{Connection, Connector};
use crate::core::driver::{Driver, IsolationLevel, PhysicalConnection};
use crate::core::error::{Result, SqlError};
use crate::core::executor::DEFAULT_BATCH_SIZE;
use crate::core::transaction::Transaction;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

type PooledPhysical<D> = <D as Driver>::Connection;

struct PoolState<D: Driver> {
    available: VecDeque<Connection<PooledPhysical<D>>>,
    in_use: HashSet<u64>,
    closed: bool,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections the pool was built with
    pub total: usize,
    /// Idle connections
    pub available: usize,
    /// Checked-out connections
    pub in_use: usize,
    pub closed: bool,
}

/// A connection [`ConnectionPool::release`] refused to take back
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct ReleaseError<C: PhysicalConnection> {
    connection: Connection<C>,
    error: SqlError,
}

impl<C: PhysicalConnection> ReleaseError<C> {
    /// The refused connection, in the state it was passed in
    pub fn connection(&self) -> &Connection<C> {
        &self.connection
    }

    pub fn error(&self) -> &SqlError {
        &self.error
    }

    pub fn into_parts(self) -> (Connection<C>, SqlError) {
        (self.connection, self.error)
    }
}

impl<C: PhysicalConnection> std::fmt::Debug for ReleaseError<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseError")
            .field("connection", &self.connection)
            .field("error", &self.error)
            .finish()
    }
}

impl<C: PhysicalConnection> From<ReleaseError<C>> for SqlError {
    fn from(rejected: ReleaseError<C>) -> Self {
        rejected.error
    }
}

/// A bounded set of connections shared across threads
pub struct ConnectionPool<D: Driver> {
    connector: Connector<D>,
    state: Mutex<PoolState<D>>,
    released: Condvar,
    total: usize,
    acquire_timeout: Duration,
    batch_size: usize,
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl<D: Driver> ConnectionPool<D> {
    /// Open `connections` connections up front
    ///
    /// # Errors
    ///
    /// Returns `PoolConnection` if any connection cannot be opened; the ones
    /// already opened are closed again.
    pub fn new(connector: Connector<D>, connections: usize) -> Result<Self> {
        Self::build(connector, connections, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_BATCH_SIZE)
    }

    /// Build a pool from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns the validation error or `PoolConnection`.
    pub fn from_config(driver: D, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let connector = Connector::new(driver, config.url).with_credentials(config.credentials);
        Self::build(
            connector,
            config.connections,
            config.acquire_timeout,
            config.batch_size,
        )
    }

    fn build(
        connector: Connector<D>,
        connections: usize,
        acquire_timeout: Duration,
        batch_size: usize,
    ) -> Result<Self> {
        let mut available = VecDeque::with_capacity(connections);
        for _ in 0..connections {
            match connector.connect() {
                Ok(connection) => available.push_back(connection.with_batch_size(batch_size)),
                Err(e) => {
                    for mut opened in available {
                        if let Err(close) = opened.close() {
                            debug!(connection = opened.id(), error = %close, "close after failed pool build");
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!(url = connector.url(), connections, "connection pool created");
        Ok(Self {
            connector,
            state: Mutex::new(PoolState {
                available,
                in_use: HashSet::with_capacity(connections),
                closed: false,
            }),
            released: Condvar::new(),
            total: connections,
            acquire_timeout,
            batch_size,
        })
    }

    /// Check out a connection, waiting up to `timeout`
    ///
    /// A connection whose session is found closed is reopened before it is
    /// handed out.
    ///
    /// # Errors
    ///
    /// - `PoolTimeout` if nothing became idle in time
    /// - `PoolClosed` if the pool was already closed
    /// - `Interrupted` if the pool was closed while waiting
    /// - `PoolConnection` if reopening a closed session failed
    pub fn acquire(&self, timeout: Duration) -> Result<Connection<PooledPhysical<D>>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut waited = false;
        let mut state = self.state.lock();

        let mut connection = loop {
            if state.closed {
                return Err(if waited {
                    SqlError::interrupted("connection pool closed while waiting")
                } else {
                    SqlError::PoolClosed
                });
            }
            if let Some(connection) = state.available.pop_front() {
                break connection;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Err(SqlError::pool_timeout(millis(timeout)));
                    }
                    self.released.wait_until(&mut state, deadline);
                }
                None => self.released.wait(&mut state),
            }
            waited = true;
        };
        state.in_use.insert(connection.id());
        drop(state);

        if connection.is_closed() {
            match self.connector.connect_physical() {
                Ok(physical) => {
                    connection.replace_physical(physical);
                    debug!(connection = connection.id(), "replaced closed connection");
                }
                Err(e) => {
                    self.check_in(connection);
                    return Err(e);
                }
            }
        }

        trace!(connection = connection.id(), "connection acquired");
        Ok(connection)
    }

    /// Return a connection to the idle set and wake a waiter
    ///
    /// A transaction leaked on the connection is rolled back first. Releasing
    /// into a closed pool closes the connection.
    ///
    /// # Errors
    ///
    /// Returns a [`ReleaseError`] wrapping `InvariantViolation` if this pool
    /// did not hand out the connection. The connection comes back untouched
    /// inside the error so it can be returned to the pool that owns it.
    pub fn release(
        &self,
        mut connection: Connection<PooledPhysical<D>>,
    ) -> std::result::Result<(), ReleaseError<PooledPhysical<D>>> {
        if !self.state.lock().in_use.contains(&connection.id()) {
            let error = SqlError::invariant(format!(
                "connection {} is not checked out from this pool",
                connection.id()
            ));
            return Err(ReleaseError { connection, error });
        }

        if let Err(e) = connection.end_transaction() {
            debug!(connection = connection.id(), error = %e, "cleanup of abandoned transaction failed");
        }
        self.check_in(connection);
        Ok(())
    }

    /// Move a checked-out connection back to the idle set
    fn check_in(&self, mut connection: Connection<PooledPhysical<D>>) {
        let mut state = self.state.lock();
        state.in_use.remove(&connection.id());
        if state.closed {
            drop(state);
            if let Err(e) = connection.close() {
                debug!(connection = connection.id(), error = %e, "close on release after pool close failed");
            }
            return;
        }
        trace!(connection = connection.id(), "connection released");
        state.available.push_back(connection);
        drop(state);
        self.released.notify_one();
    }

    /// Check out a connection that returns itself to the pool when dropped
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionPool::acquire`].
    pub fn get(&self, timeout: Duration) -> Result<PooledConnection<'_, D>> {
        let connection = self.acquire(timeout)?;
        Ok(PooledConnection {
            pool: self,
            connection: Some(connection),
        })
    }

    /// Run `f` with a pooled connection; the connection is always released
    ///
    /// Release also happens if `f` panics.
    pub fn with_connection<R, F>(&self, timeout: Duration, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection<PooledPhysical<D>>) -> Result<R>,
    {
        let mut pooled = self.get(timeout)?;
        f(&mut *pooled)
    }

    /// Run `f` in a transaction on a pooled connection
    ///
    /// An unfinished transaction is aborted when `f` returns.
    pub fn with_transaction<R, F>(&self, timeout: Duration, level: IsolationLevel, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, PooledPhysical<D>>) -> Result<R>,
    {
        self.with_connection(timeout, |connection| connection.with_transaction(level, f))
    }

    /// [`ConnectionPool::with_connection`] on the blocking thread pool
    ///
    /// # Errors
    ///
    /// Returns `Other` if the blocking task panicked or was cancelled.
    pub async fn with_connection_async<R, F>(self: &Arc<Self>, timeout: Duration, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection<PooledPhysical<D>>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.with_connection(timeout, f))
            .await
            .map_err(|e| SqlError::other(format!("Task join error: {}", e)))?
    }

    /// Close every idle connection and refuse further acquires
    ///
    /// Connections still checked out are closed as they are released.
    /// Threads waiting in `acquire` fail with `Interrupted`. Individual close
    /// failures are ignored.
    pub fn close(&self) {
        let idle: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.available.drain(..).collect()
        };
        self.released.notify_all();

        for mut connection in idle {
            if let Err(e) = connection.close() {
                debug!(connection = connection.id(), error = %e, "close failed during pool shutdown");
            }
        }
        info!(url = self.connector.url(), "connection pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total: self.total,
            available: state.available.len(),
            in_use: state.in_use.len(),
            closed: state.closed,
        }
    }

    pub fn available_count(&self) -> usize {
        self.state.lock().available.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    pub fn total_count(&self) -> usize {
        self.total
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Timeout from the pool's configuration
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<D: Driver> Drop for ConnectionPool<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection checked out with [`ConnectionPool::get`]
///
/// Dereferences to [`Connection`] and goes back to the pool on drop.
pub struct PooledConnection<'p, D: Driver> {
    pool: &'p ConnectionPool<D>,
    connection: Option<Connection<PooledPhysical<D>>>,
}

impl<D: Driver> Deref for PooledConnection<'_, D> {
    type Target = Connection<PooledPhysical<D>>;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("connection already returned")
    }
}

impl<D: Driver> DerefMut for PooledConnection<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("connection already returned")
    }
}

impl<D: Driver> Drop for PooledConnection<'_, D> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(rejected) = self.pool.release(connection) {
                debug!(error = %rejected, "returning pooled connection failed");
            }
        }
    }
}
