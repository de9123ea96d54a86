//! Logical connections and the shared query surface
//!
//! A [`Connection`] owns one physical driver session. While a
//! [`Transaction`] is open on it, the connection itself refuses to run
//! statements; the borrow checker normally makes that impossible anyway, and
//! the runtime check covers transactions leaked with `mem::forget`.

use crate::core::config::Credentials;
use crate::core::driver::{Driver, IsolationLevel, PhysicalConnection};
use crate::core::error::{Result, SqlError};
use crate::core::executor::{self, DEFAULT_BATCH_SIZE};
use crate::core::profile::Record;
use crate::core::row::{ResultRow, ResultSet};
use crate::core::transaction::Transaction;
use crate::core::value::SqlValue;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Statement surface shared by [`Connection`] and [`Transaction`]
///
/// Parameters bind positionally; [`params!`](crate::params) builds the slice.
pub trait SqlCallable {
    /// Session to run statements on, if this callable may run them now
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` when the callable is in the wrong state.
    fn handle(&mut self) -> Result<&mut dyn PhysicalConnection>;

    /// Chunk size used by [`SqlCallable::batch_execute_default`]
    fn default_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// First row of a read query, if any
    fn query_row(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<ResultRow>> {
        executor::query_row(self.handle()?, sql, params)
    }

    /// First row of a read query mapped onto `T`
    fn query_row_as<T: Record>(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<T>>
    where
        Self: Sized,
    {
        executor::query_row_as(self.handle()?, sql, params)
    }

    /// Every row of a read query
    fn query_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        executor::query_all(self.handle()?, sql, params)
    }

    /// Every row of a read query mapped onto `T`
    ///
    /// Columns without a matching member are ignored.
    fn query_all_as<T: Record>(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<T>>
    where
        Self: Sized,
    {
        executor::query_all_as(self.handle()?, sql, params)
    }

    /// Run a write; the result carries the affected count and generated keys
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        executor::execute(self.handle()?, sql, params)
    }

    /// Run one statement per parameter set, `granularity` sets per round trip
    ///
    /// Returns one affected count per parameter set, in input order.
    fn batch_execute(
        &mut self,
        sql: &str,
        granularity: usize,
        param_sets: &[Vec<SqlValue>],
    ) -> Result<Vec<u64>> {
        executor::batch_execute(self.handle()?, sql, granularity, param_sets)
    }

    fn batch_execute_default(&mut self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Vec<u64>> {
        let granularity = self.default_batch_size();
        self.batch_execute(sql, granularity, param_sets)
    }

    /// Like [`SqlCallable::batch_execute`], but keeps each set's generated keys
    fn batch_execute_results(
        &mut self,
        sql: &str,
        param_sets: &[Vec<SqlValue>],
    ) -> Result<Vec<ResultSet>> {
        executor::batch_execute_results(self.handle()?, sql, param_sets)
    }
}

/// Connection state captured when a transaction opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SavedState {
    pub(crate) auto_commit: bool,
    pub(crate) isolation: IsolationLevel,
}

/// One logical connection over a physical session
pub struct Connection<C: PhysicalConnection> {
    id: u64,
    pub(crate) physical: C,
    pub(crate) saved: Option<SavedState>,
    batch_size: usize,
}

impl<C: PhysicalConnection> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl<C: PhysicalConnection> Connection<C> {
    /// Wrap a physical session
    pub fn new(physical: C) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            physical,
            saved: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the chunk size for default batches
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Process-unique identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a transaction currently owns this connection
    pub fn in_transaction(&self) -> bool {
        self.saved.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.physical.is_closed()
    }

    /// Read-only access to the driver session
    pub fn physical(&self) -> &C {
        &self.physical
    }

    pub fn auto_commit(&self) -> Result<bool> {
        self.physical.auto_commit()
    }

    pub fn isolation_level(&self) -> Result<IsolationLevel> {
        self.physical.isolation_level()
    }

    /// Open a transaction at `level`
    ///
    /// The current auto-commit flag and isolation level are saved and put
    /// back when the transaction ends, however it ends.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if a transaction is already open or `level` is
    /// [`IsolationLevel::None`], or the driver's error if the session cannot
    /// be switched.
    pub fn begin_transaction(&mut self, level: IsolationLevel) -> Result<Transaction<'_, C>> {
        if self.saved.is_some() {
            return Err(SqlError::illegal_state(
                "A transaction is already active on this connection",
            ));
        }
        if level == IsolationLevel::None {
            return Err(SqlError::illegal_state(
                "A transaction needs an isolation level other than NONE",
            ));
        }

        let saved = SavedState {
            auto_commit: self.physical.auto_commit()?,
            isolation: self.physical.isolation_level()?,
        };
        let switched = self
            .physical
            .set_auto_commit(false)
            .and_then(|_| self.physical.set_isolation_level(level));
        if let Err(e) = switched {
            if let Err(restore) = restore_state(&mut self.physical, saved) {
                debug!(connection = self.id, error = %restore, "failed to restore state after aborted begin");
            }
            return Err(e);
        }

        self.saved = Some(saved);
        trace!(connection = self.id, %level, "transaction started");
        Ok(Transaction::new(self))
    }

    /// Run `f` inside a transaction
    ///
    /// If `f` returns without committing or aborting, the transaction is
    /// aborted. `f`'s error wins over an abort failure.
    pub fn with_transaction<R, F>(&mut self, level: IsolationLevel, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, C>) -> Result<R>,
    {
        let mut transaction = self.begin_transaction(level)?;
        let result = f(&mut transaction);
        if !transaction.is_finished() {
            let aborted = transaction.abort();
            if result.is_ok() {
                aborted?;
            }
        }
        result
    }

    /// Roll back and restore a transaction that was leaked instead of finished
    pub(crate) fn end_transaction(&mut self) -> Result<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        debug!(connection = self.id, "rolling back abandoned transaction");
        let rolled_back = self.physical.rollback();
        let restored = restore_state(&mut self.physical, saved);
        rolled_back.and(restored)
    }

    /// Swap in a fresh session, closing the old one
    pub(crate) fn replace_physical(&mut self, physical: C) {
        if let Err(e) = self.physical.close() {
            debug!(connection = self.id, error = %e, "closing replaced session failed");
        }
        self.physical = physical;
        self.saved = None;
    }

    /// End any open transaction and close the session
    pub fn close(&mut self) -> Result<()> {
        if let Err(e) = self.end_transaction() {
            debug!(connection = self.id, error = %e, "transaction cleanup before close failed");
        }
        if self.physical.is_closed() {
            return Ok(());
        }
        self.physical.close()
    }
}

/// Put back isolation level, then auto-commit; both are attempted
pub(crate) fn restore_state<C: PhysicalConnection + ?Sized>(
    physical: &mut C,
    saved: SavedState,
) -> Result<()> {
    let isolation = physical.set_isolation_level(saved.isolation);
    let auto_commit = physical.set_auto_commit(saved.auto_commit);
    isolation.and(auto_commit)
}

impl<C: PhysicalConnection> SqlCallable for Connection<C> {
    fn handle(&mut self) -> Result<&mut dyn PhysicalConnection> {
        if self.saved.is_some() {
            return Err(SqlError::illegal_state(
                "A transaction is active and must be closed before this can be called",
            ));
        }
        Ok(&mut self.physical)
    }

    fn default_batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Opens unpooled connections from a driver, URL and credentials
pub struct Connector<D: Driver> {
    driver: D,
    url: String,
    credentials: Credentials,
}

impl<D: Driver> Connector<D> {
    pub fn new(driver: D, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            credentials: Credentials::None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Open a physical session
    ///
    /// # Errors
    ///
    /// Returns `PoolConnection` wrapping the driver failure.
    pub fn connect_physical(&self) -> Result<D::Connection> {
        self.driver
            .connect(&self.url, &self.credentials)
            .map_err(|e| {
                SqlError::pool_connection_with_source(
                    format!("Failed to connect to {}", self.url),
                    Box::new(e),
                )
            })
    }

    /// Open a new connection
    ///
    /// # Errors
    ///
    /// Returns `PoolConnection` wrapping the driver failure.
    pub fn connect(&self) -> Result<Connection<D::Connection>> {
        self.connect_physical().map(Connection::new)
    }

    /// Open a connection, run `f` on it, then close it
    pub fn with_connection<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection<D::Connection>) -> Result<R>,
    {
        let mut connection = self.connect()?;
        let result = f(&mut connection);
        if let Err(e) = connection.close() {
            debug!(connection = connection.id(), error = %e, "closing one-shot connection failed");
        }
        result
    }
}
