//! Error types for the SQL access layer
//!
//! Every failure is returned to the caller as a value; nothing in this crate
//! logs an error before handing it back.

/// Result type alias for SQL operations
pub type Result<T> = std::result::Result<T, SqlError>;

/// Error types for pool, transaction, query and conversion operations
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    /// No connection became available within the acquire bound
    #[error("No available connections after {timeout_ms}ms")]
    PoolTimeout { timeout_ms: u64 },

    /// A physical (re)connection attempt failed
    #[error("Connection failed: {message}")]
    PoolConnection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The pool was closed before the request
    #[error("Connection pool is closed")]
    PoolClosed,

    /// A waiting request was woken without being handed a connection
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// A pool bookkeeping rule was broken by the caller
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Operation invoked in the wrong connection/transaction state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// No coercion rule matched
    #[error("Object could not be converted: {member} is {source_type}, target is {target_type}")]
    TypeConversion {
        member: String,
        source_type: String,
        target_type: String,
    },

    /// A BLOB/CLOB could not be drained into memory
    #[error("Large object read failed for {member}: {source}")]
    LargeObjectRead {
        member: String,
        #[source]
        source: std::io::Error,
    },

    /// Query execution error reported by a driver
    #[error("Query execution error: {0}")]
    Query(String),

    /// Invalid configuration document
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl SqlError {
    /// Create a pool timeout error
    pub fn pool_timeout(timeout_ms: u64) -> Self {
        SqlError::PoolTimeout { timeout_ms }
    }

    /// Create a connection error without an underlying cause
    pub fn pool_connection<S: Into<String>>(message: S) -> Self {
        SqlError::PoolConnection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping the driver failure
    pub fn pool_connection_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SqlError::PoolConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an interruption error
    pub fn interrupted<S: Into<String>>(msg: S) -> Self {
        SqlError::Interrupted(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        SqlError::InvariantViolation(msg.into())
    }

    /// Create an illegal state error
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        SqlError::IllegalState(msg.into())
    }

    /// Create a type conversion error
    pub fn type_conversion(member: &str, source_type: &str, target_type: &str) -> Self {
        SqlError::TypeConversion {
            member: member.to_string(),
            source_type: source_type.to_string(),
            target_type: target_type.to_string(),
        }
    }

    /// Create a large object read error
    pub fn large_object(member: &str, source: std::io::Error) -> Self {
        SqlError::LargeObjectRead {
            member: member.to_string(),
            source,
        }
    }

    /// Create a query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        SqlError::Query(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SqlError::Other(msg.into())
    }

    /// Whether retrying the same call later can succeed.
    ///
    /// Only an acquire timeout is recoverable; state violations and
    /// conversion failures are caller bugs and connection failures are fatal
    /// for the call that hit them.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SqlError::PoolTimeout { .. })
    }
}
