//! # Rust SQL Pool
//!
//! A blocking SQL access layer built around a fixed-size connection pool,
//! scoped transactions that restore connection state, and mapping of result
//! rows onto plain Rust records through a fixed set of coercion rules.
//!
//! ## Features
//!
//! - **Connection Pooling**: Eagerly opened connections, bounded waits, closed
//!   sessions replaced on checkout
//! - **Transactions**: Isolation level and auto-commit are put back however a
//!   transaction ends; dropping an unfinished transaction rolls it back
//! - **Record Mapping**: Columns are matched to registered members by alias or
//!   name, and values are coerced to the member's type
//! - **Thread Safety**: Pool state guarded with `parking_lot`
//! - **Async Support**: Pool work can be offloaded to Tokio's blocking threads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_sql_pool::prelude::*;
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Record for User {
//!     fn describe(profile: &mut ProfileBuilder<Self>) {
//!         profile.field("id", |u: &mut User, v: i64| u.id = v);
//!         profile.field("name", |u: &mut User, v: String| u.name = v);
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let pool = ConnectionPool::from_config(SqliteDriver::new(), PoolConfig::new("app.db"))?;
//!
//!     pool.with_transaction(Duration::from_secs(1), IsolationLevel::Serializable, |tx| {
//!         tx.execute("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)", params![])?;
//!         tx.execute("INSERT INTO users (name) VALUES (?)", params!["Alice"])?;
//!         tx.commit()
//!     })?;
//!
//!     let users: Vec<User> = pool.with_connection(Duration::from_secs(1), |conn| {
//!         conn.query_all_as("SELECT id, name FROM users", params![])
//!     })?;
//!     for user in users {
//!         println!("{}: {}", user.id, user.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/
//! │   ├── config.rs       # Pool configuration and credentials
//! │   ├── connection.rs   # Logical connections and the query surface
//! │   ├── convert.rs      # Coercion rules
//! │   ├── driver.rs       # Driver traits
//! │   ├── error.rs        # Error types
//! │   ├── pool.rs         # Connection pool
//! │   ├── profile.rs      # Record registration and cache
//! │   ├── row.rs          # Result rows and sets
//! │   ├── transaction.rs  # Scoped transactions
//! │   ├── types.rs        # Target types
//! │   └── value.rs        # Value model
//! └── backends/
//!     └── sqlite.rs       # SQLite driver
//! ```

/// Core types and traits
pub mod core;

/// Driver implementations
pub mod backends;

/// Build a positional parameter slice
///
/// ```
/// use rust_sql_pool::{params, SqlValue};
///
/// let p: &[SqlValue] = params![1, "two", 3.0];
/// assert_eq!(p.len(), 3);
/// assert!(params![].is_empty());
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[] as &[$crate::SqlValue]
    };
    ($($param:expr),+ $(,)?) => {
        &[$($crate::SqlValue::from($param)),+]
    };
}

/// Prelude for convenient imports
///
/// ```rust
/// use rust_sql_pool::prelude::*;
///
/// let value: i32 = convert(SqlValue::from("42")).unwrap();
/// assert_eq!(value, 42);
/// ```
pub mod prelude {
    pub use crate::core::{
        convert, Connection, ConnectionPool, Connector, Credentials, FromSqlValue,
        IsolationLevel, PoolConfig, ProfileBuilder, Record, Result, ResultRow, ResultSet,
        SqlCallable, SqlEnum, SqlError, SqlValue, Transaction,
    };
    pub use crate::params;

    #[cfg(feature = "sqlite")]
    pub use crate::backends::{SqliteConnection, SqliteDriver};
}

// Re-export at root level for convenience
pub use core::{
    convert, ColumnIndex, ColumnRef, Connection, ConnectionPool, Connector, Credentials, Driver,
    EnumDescriptor, EnumValue, FromSqlValue, IsolationLevel, LargeObject, PhysicalConnection,
    PoolConfig, PoolStats, PooledConnection, ProfileBuilder, RawResult, RawUpdate, Record,
    ReleaseError, Result,
    ResultRow, ResultSet, Savepoint, SqlCallable, SqlEnum, SqlError, SqlType, SqlValue,
    Transaction, TypeConverter, TypeProfile, UpdateResult, DEFAULT_BATCH_SIZE,
};

#[cfg(feature = "sqlite")]
pub use backends::{SqliteConnection, SqliteDriver};
