//! Driver implementations
//!
//! Each backend implements [`Driver`](crate::Driver) and
//! [`PhysicalConnection`](crate::PhysicalConnection) for one database.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteDriver};
