//! Pool configuration
//!
//! Configuration can be built in code with the `with_*` methods or loaded
//! from JSON:
//!
//! ```
//! use rust_sql_pool::PoolConfig;
//!
//! let config = PoolConfig::from_json(r#"{
//!     "url": "app.db",
//!     "connections": 4,
//!     "acquire_timeout_ms": 250,
//!     "credentials": { "type": "user_password", "username": "app", "password": "secret" }
//! }"#).unwrap();
//! assert_eq!(config.connections, 4);
//! ```

use crate::core::error::{Result, SqlError};
use crate::core::executor::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default time to wait for a free connection
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of pooled connections
pub const DEFAULT_CONNECTIONS: usize = 4;

/// How a driver authenticates a new session
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Nothing beyond the URL
    #[default]
    None,
    /// Username and password pair
    UserPassword { username: String, password: String },
    /// Driver-specific property bag
    Properties(BTreeMap<String, String>),
}

impl Credentials {
    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::UserPassword {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Look up a property; only property bags carry any
    pub fn property(&self, key: &str) -> Option<&str> {
        match self {
            Credentials::Properties(props) => props.get(key).map(String::as_str),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Properties(props) => f
                .debug_tuple("Properties")
                .field(&props.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connection string handed to the driver
    pub url: String,
    /// Number of connections opened up front
    pub connections: usize,
    /// How long `acquire` waits for a free connection
    #[serde(rename = "acquire_timeout_ms", with = "duration_ms")]
    pub acquire_timeout: Duration,
    /// Default chunk size for batch statements
    pub batch_size: usize,
    pub credentials: Credentials,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connections: DEFAULT_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            credentials: Credentials::None,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the number of pooled connections
    pub fn with_connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    /// Set the acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the default batch chunk size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// Returns `Config` for malformed JSON and `Other` for invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pool cannot work with
    ///
    /// # Errors
    ///
    /// Returns `Other` naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.connections == 0 {
            return Err(SqlError::other(
                "Invalid pool configuration: connections must be at least 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(SqlError::other(
                "Invalid pool configuration: batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}
