//! Scoped transactions with state restoration
//!
//! A [`Transaction`] borrows its [`Connection`] exclusively. Ending it, by
//! commit, abort or drop, puts the connection's isolation level and
//! auto-commit flag back to what they were before it started.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = conn.begin_transaction(IsolationLevel::Serializable)?;
//! tx.execute("UPDATE accounts SET balance = balance - 100 WHERE id = ?", params![1])?;
//! tx.execute("UPDATE accounts SET balance = balance + 100 WHERE id = ?", params![2])?;
//! tx.commit()?;
//! ```
//!
//! If neither `commit()` nor `abort()` is called, the transaction is rolled
//! back when dropped.

use crate::core::connection::{restore_state, Connection, SqlCallable};
use crate::core::driver::{PhysicalConnection, Savepoint};
use crate::core::error::{Result, SqlError};
use tracing::{debug, trace, warn};

/// An open transaction on a borrowed connection
pub struct Transaction<'c, C: PhysicalConnection> {
    connection: &'c mut Connection<C>,
    finished: bool,
}

impl<C: PhysicalConnection> std::fmt::Debug for Transaction<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.connection)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'c, C: PhysicalConnection> Transaction<'c, C> {
    pub(crate) fn new(connection: &'c mut Connection<C>) -> Self {
        Self {
            connection,
            finished: false,
        }
    }

    fn verify_unfinished(&self) -> Result<()> {
        if self.finished {
            return Err(SqlError::illegal_state("This transaction is already finished"));
        }
        Ok(())
    }

    /// Whether commit or abort has already been called
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Commit all work and end the transaction
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if already finished. A commit failure is
    /// returned after the connection state has been restored.
    pub fn commit(&mut self) -> Result<()> {
        self.verify_unfinished()?;
        let committed = self.connection.physical.commit();
        let restored = self.finish();
        committed.and(restored)
    }

    /// Roll back all work and end the transaction
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if already finished. A rollback failure is
    /// returned after the connection state has been restored.
    pub fn abort(&mut self) -> Result<()> {
        self.verify_unfinished()?;
        let rolled_back = self.connection.physical.rollback();
        let restored = self.finish();
        rolled_back.and(restored)
    }

    /// Commit the work so far and keep the transaction open
    pub fn commit_in_place(&mut self) -> Result<()> {
        self.verify_unfinished()?;
        self.connection.physical.commit()
    }

    /// Roll back the work so far and keep the transaction open
    pub fn rollback_in_place(&mut self) -> Result<()> {
        self.verify_unfinished()?;
        self.connection.physical.rollback()
    }

    /// Mark a point that [`Transaction::rollback_to`] can return to
    pub fn set_savepoint(&mut self, name: Option<&str>) -> Result<Savepoint> {
        self.verify_unfinished()?;
        self.connection.physical.set_savepoint(name)
    }

    /// Undo the work done since `savepoint`
    pub fn rollback_to(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.verify_unfinished()?;
        self.connection.physical.rollback_to_savepoint(savepoint)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let restored = match self.connection.saved.take() {
            Some(saved) => restore_state(&mut self.connection.physical, saved),
            None => Ok(()),
        };
        trace!(connection = self.connection.id(), "transaction finished");
        restored
    }
}

impl<C: PhysicalConnection> SqlCallable for Transaction<'_, C> {
    fn handle(&mut self) -> Result<&mut dyn PhysicalConnection> {
        self.verify_unfinished()?;
        Ok(&mut self.connection.physical)
    }

    fn default_batch_size(&self) -> usize {
        self.connection.default_batch_size()
    }
}

impl<C: PhysicalConnection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(
            connection = self.connection.id(),
            "transaction dropped without commit or abort; rolling back"
        );
        if let Err(e) = self.abort() {
            debug!(connection = self.connection.id(), error = %e, "rollback on drop failed");
        }
    }
}
