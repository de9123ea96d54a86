//! Driver boundary
//!
//! Everything the pool and transactions need from a database driver is
//! expressed by [`Driver`] (open a session) and [`PhysicalConnection`]
//! (run statements on it). Calls are blocking.

use crate::core::config::Credentials;
use crate::core::error::Result;
use crate::core::value::SqlValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Transactions are not supported
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Levels a transaction can be opened with
    pub const TRANSACTIONAL: [IsolationLevel; 4] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::None => "NONE",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver-issued savepoint handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Rows returned by a read statement, before materialization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    /// Column names in ordinal order
    pub columns: Vec<String>,
    /// One value per column for each row
    pub rows: Vec<Vec<SqlValue>>,
}

/// Outcome of a write statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawUpdate {
    pub affected: u64,
    pub generated_keys: Vec<i64>,
}

/// A live session with the database
///
/// Parameters are bound positionally in slice order.
pub trait PhysicalConnection: Send {
    /// Whether the session has already been closed
    fn is_closed(&self) -> bool;

    /// Close the session; closing twice is not an error
    fn close(&mut self) -> Result<()>;

    fn auto_commit(&self) -> Result<bool>;

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    fn isolation_level(&self) -> Result<IsolationLevel>;

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Create a savepoint, generating a name when none is given
    fn set_savepoint(&mut self, name: Option<&str>) -> Result<Savepoint>;

    fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<()>;

    /// Run a read statement and fetch every row
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult>;

    /// Run a write statement and read back any generated keys
    fn execute_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawUpdate>;

    /// Run one prepared statement once per parameter set
    ///
    /// Returns the affected-row count of each set, in order.
    fn execute_batch(&mut self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Vec<u64>>;
}

/// Opens physical connections
pub trait Driver: Send + Sync + 'static {
    type Connection: PhysicalConnection + 'static;

    /// Open a new session
    ///
    /// # Errors
    ///
    /// Returns the driver's failure; the pool wraps it as a connection error.
    fn connect(&self, url: &str, credentials: &Credentials) -> Result<Self::Connection>;
}

impl<P: PhysicalConnection + ?Sized> PhysicalConnection for Box<P> {
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn auto_commit(&self) -> Result<bool> {
        (**self).auto_commit()
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        (**self).set_auto_commit(auto_commit)
    }

    fn isolation_level(&self) -> Result<IsolationLevel> {
        (**self).isolation_level()
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        (**self).set_isolation_level(level)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }

    fn set_savepoint(&mut self, name: Option<&str>) -> Result<Savepoint> {
        (**self).set_savepoint(name)
    }

    fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        (**self).rollback_to_savepoint(savepoint)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult> {
        (**self).query(sql, params)
    }

    fn execute_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawUpdate> {
        (**self).execute_update(sql, params)
    }

    fn execute_batch(&mut self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Vec<u64>> {
        (**self).execute_batch(sql, param_sets)
    }
}
