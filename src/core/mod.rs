//! Core types and traits
//!
//! This module holds everything that does not depend on a particular driver:
//! errors, the value model and coercion rules, record profiles, logical
//! connections, transactions and the pool.

pub mod config;
pub mod connection;
pub mod convert;
pub mod driver;
pub mod error;
pub(crate) mod executor;
pub mod lenient;
pub mod pool;
pub mod profile;
pub mod row;
pub mod transaction;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use config::{Credentials, PoolConfig, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CONNECTIONS};
pub use connection::{Connection, Connector, SqlCallable};
pub use convert::{convert, TypeConverter, DEFAULT_MEMBER};
pub use driver::{Driver, IsolationLevel, PhysicalConnection, RawResult, RawUpdate, Savepoint};
pub use error::{Result, SqlError};
pub use executor::DEFAULT_BATCH_SIZE;
pub use pool::{ConnectionPool, PoolStats, PooledConnection, ReleaseError};
pub use profile::{Member, MemberHint, ProfileBuilder, Record, TypeProfile};
pub use row::{ColumnIndex, ColumnRef, ResultRow, ResultSet, UpdateResult};
pub use transaction::Transaction;
pub use types::{EnumDescriptor, FromSqlValue, SqlEnum, SqlType};
pub use value::{EnumValue, LargeObject, SqlValue};
