//! SQLite driver
//!
//! SQLite has no session-level auto-commit switch or isolation levels, so
//! both are emulated here:
//!
//! - auto-commit off means a `BEGIN IMMEDIATE` is open. `commit` and
//!   `rollback` end it; the next one begins with the next statement, so the
//!   write lock is not held between a commit and the restore that follows it.
//!   The lock is taken up front so that concurrent writers wait on
//!   `busy_timeout_ms` instead of failing on lock upgrade
//! - every level behaves as serializable except `ReadUncommitted`, which
//!   turns on the `read_uncommitted` pragma
//!
//! Recognized credential properties:
//!
//! | Property | Default | Effect |
//! |----------|---------|--------|
//! | `foreign_keys` | `on` | `PRAGMA foreign_keys` |
//! | `busy_timeout_ms` | unset | How long to wait on a locked database |

use crate::core::config::Credentials;
use crate::core::driver::{
    Driver, IsolationLevel, PhysicalConnection, RawResult, RawUpdate, Savepoint,
};
use crate::core::error::{Result, SqlError};
use crate::core::lenient;
use crate::core::value::{SqlValue, DATE_FORMAT, TIMESTAMP_FORMAT};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::time::Duration;
use tracing::debug;

/// Opens [`SqliteConnection`]s; the URL is a file path or `:memory:`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver
    pub fn new() -> Self {
        Self
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn connect(&self, url: &str, credentials: &Credentials) -> Result<SqliteConnection> {
        SqliteConnection::open(url, credentials)
    }
}

/// One SQLite session
pub struct SqliteConnection {
    connection: Option<Connection>,
    auto_commit: bool,
    isolation: IsolationLevel,
    next_savepoint: u64,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("open", &self.connection.is_some())
            .field("auto_commit", &self.auto_commit)
            .field("isolation", &self.isolation)
            .finish()
    }
}

impl SqliteConnection {
    /// Open a session on `url`
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the database cannot be opened or a pragma
    /// from the credentials is rejected.
    pub fn open(url: &str, credentials: &Credentials) -> Result<Self> {
        let connection = Connection::open(url)?;

        let foreign_keys = credentials
            .property("foreign_keys")
            .map_or(true, parse_flag);
        connection.pragma_update(None, "foreign_keys", foreign_keys)?;

        if let Some(ms) = credentials.property("busy_timeout_ms") {
            let ms = lenient::parse_i64(ms).max(0) as u64;
            connection.busy_timeout(Duration::from_millis(ms))?;
        }
        if let Credentials::UserPassword { username, .. } = credentials {
            debug!(url, username = username.as_str(), "sqlite ignores user credentials");
        }

        Ok(Self {
            connection: Some(connection),
            auto_commit: true,
            isolation: IsolationLevel::Serializable,
            next_savepoint: 0,
        })
    }

    fn session(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| SqlError::illegal_state("SQLite connection is closed"))
    }

    /// Whether SQLite itself has a transaction open
    pub fn in_native_transaction(&self) -> bool {
        self.connection
            .as_ref()
            .map_or(false, |conn| !conn.is_autocommit())
    }

    /// End the open transaction with `verb`
    fn finish_native(&mut self, verb: &str) -> Result<()> {
        let conn = self.session()?;
        if !conn.is_autocommit() {
            conn.execute_batch(verb)?;
        }
        Ok(())
    }

    /// Session for a statement, beginning a transaction if auto-commit is off
    /// and none is open since the last commit or rollback
    fn statement_session(&self) -> Result<&Connection> {
        let conn = self.session()?;
        if !self.auto_commit && conn.is_autocommit() {
            conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(conn)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "yes" | "1"
    )
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_insert(sql: &str) -> bool {
    let head: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    head.eq_ignore_ascii_case("insert") || head.eq_ignore_ascii_case("replace")
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Long(v),
        ValueRef::Real(v) => SqlValue::Double(v),
        ValueRef::Text(v) => SqlValue::String(String::from_utf8_lossy(v).to_string()),
        ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
    }
}

/// Convert a parameter into something SQLite can bind
///
/// Dates and timestamps are stored as text that the coercion rules parse
/// back. Enums are stored by name. Sequences and maps are stored as JSON.
fn bind_value(position: usize, value: &SqlValue) -> Result<Value> {
    let bound = match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
        SqlValue::Byte(v) => Value::Integer(i64::from(*v)),
        SqlValue::Short(v) => Value::Integer(i64::from(*v)),
        SqlValue::Int(v) => Value::Integer(i64::from(*v)),
        SqlValue::Long(v) => Value::Integer(*v),
        SqlValue::Float(v) => Value::Real(f64::from(*v)),
        SqlValue::Double(v) => Value::Real(*v),
        SqlValue::Char(v) => Value::Text(v.to_string()),
        SqlValue::String(v) => Value::Text(v.clone()),
        SqlValue::Bytes(v) => Value::Blob(v.clone()),
        SqlValue::Chars(v) => Value::Text(v.iter().collect()),
        SqlValue::Date(v) => Value::Text(v.format(DATE_FORMAT).to_string()),
        SqlValue::Timestamp(v) => Value::Text(v.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::Enum(v) => Value::Text(v.name.clone()),
        SqlValue::Array(_) | SqlValue::List(_) | SqlValue::Map(_) => {
            Value::Text(serde_json::to_string(value).map_err(|e| {
                SqlError::query(format!("Cannot bind parameter {}: {}", position, e))
            })?)
        }
        SqlValue::Blob(lob) => Value::Blob(
            lob.read_bytes()
                .map_err(|e| SqlError::large_object(&format!("parameter {}", position), e))?,
        ),
        SqlValue::Clob(lob) => Value::Text(
            lob.read_text()
                .map_err(|e| SqlError::large_object(&format!("parameter {}", position), e))?,
        ),
    };
    Ok(bound)
}

fn bind_all(params: &[SqlValue]) -> Result<Vec<Value>> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| bind_value(i + 1, value))
        .collect()
}

impl PhysicalConnection for SqliteConnection {
    fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(conn) => conn.close().map_err(|(_, e)| SqlError::from(e)),
            None => Ok(()),
        }
    }

    fn auto_commit(&self) -> Result<bool> {
        self.session()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        let conn = self.session()?;
        if auto_commit == self.auto_commit {
            return Ok(());
        }
        if auto_commit {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
        } else if conn.is_autocommit() {
            conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn isolation_level(&self) -> Result<IsolationLevel> {
        self.session()?;
        Ok(self.isolation)
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        let conn = self.session()?;
        conn.pragma_update(
            None,
            "read_uncommitted",
            level == IsolationLevel::ReadUncommitted,
        )?;
        self.isolation = level;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.finish_native("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.finish_native("ROLLBACK")
    }

    fn set_savepoint(&mut self, name: Option<&str>) -> Result<Savepoint> {
        self.session()?;
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                self.next_savepoint += 1;
                format!("sp_{}", self.next_savepoint)
            }
        };
        self.statement_session()?
            .execute_batch(&format!("SAVEPOINT {}", quote_identifier(&name)))?;
        Ok(Savepoint::new(name))
    }

    fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.session()?.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {}",
            quote_identifier(savepoint.name())
        ))?;
        Ok(())
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawResult> {
        let bound = bind_all(params)?;
        let conn = self.statement_session()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(bound))?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(read_value(row.get_ref(i)?));
            }
            rows.push(values);
        }

        Ok(RawResult { columns, rows })
    }

    fn execute_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawUpdate> {
        let bound = bind_all(params)?;
        let conn = self.statement_session()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let affected = stmt.execute(params_from_iter(bound))? as u64;

        let generated_keys = if affected > 0 && is_insert(sql) {
            vec![conn.last_insert_rowid()]
        } else {
            Vec::new()
        };
        Ok(RawUpdate {
            affected,
            generated_keys,
        })
    }

    fn execute_batch(&mut self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Vec<u64>> {
        let conn = self.statement_session()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let mut counts = Vec::with_capacity(param_sets.len());
        for params in param_sets {
            let bound = bind_all(params)?;
            counts.push(stmt.execute(params_from_iter(bound))? as u64);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn memory() -> SqliteConnection {
        let mut conn = SqliteDriver::new()
            .connect(":memory:", &Credentials::None)
            .expect("Failed to open in-memory database");
        conn.execute_update(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)",
            &[],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_open_defaults() {
        let conn = memory();
        assert!(!conn.is_closed());
        assert!(conn.auto_commit().unwrap());
        assert_eq!(conn.isolation_level().unwrap(), IsolationLevel::Serializable);
        assert!(!conn.in_native_transaction());
    }

    #[test]
    fn test_insert_returns_generated_key() {
        let mut conn = memory();
        let first = conn
            .execute_update("INSERT INTO test (value) VALUES (?)", &["a".into()])
            .unwrap();
        let second = conn
            .execute_update("  insert INTO test (value) VALUES (?)", &["b".into()])
            .unwrap();
        assert_eq!(first.affected, 1);
        assert_eq!(first.generated_keys, vec![1]);
        assert_eq!(second.generated_keys, vec![2]);

        let update = conn
            .execute_update("UPDATE test SET value = 'c'", &[])
            .unwrap();
        assert_eq!(update.affected, 2);
        assert!(update.generated_keys.is_empty());
    }

    #[test]
    fn test_query_reads_column_names_and_values() {
        let mut conn = memory();
        conn.execute_update("INSERT INTO test (value) VALUES (?)", &["x".into()])
            .unwrap();
        let raw = conn
            .query("SELECT id, value, NULL AS nothing, 1.5 AS real FROM test", &[])
            .unwrap();
        assert_eq!(raw.columns, vec!["id", "value", "nothing", "real"]);
        assert_eq!(
            raw.rows,
            vec![vec![
                SqlValue::Long(1),
                SqlValue::String("x".to_string()),
                SqlValue::Null,
                SqlValue::Double(1.5),
            ]]
        );
    }

    #[test]
    fn test_auto_commit_off_keeps_transaction_open() {
        let mut conn = memory();
        conn.set_auto_commit(false).unwrap();
        assert!(conn.in_native_transaction());

        conn.execute_update("INSERT INTO test (value) VALUES ('a')", &[])
            .unwrap();
        conn.rollback().unwrap();
        assert!(!conn.in_native_transaction());

        conn.execute_update("INSERT INTO test (value) VALUES ('b')", &[])
            .unwrap();
        assert!(conn.in_native_transaction());
        conn.commit().unwrap();
        assert!(!conn.in_native_transaction());
        conn.set_auto_commit(true).unwrap();
        assert!(!conn.in_native_transaction());

        let raw = conn.query("SELECT value FROM test", &[]).unwrap();
        assert_eq!(raw.rows, vec![vec![SqlValue::String("b".to_string())]]);
    }

    #[test]
    fn test_commit_releases_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock.db");
        let url = path.to_string_lossy();
        let driver = SqliteDriver::new();

        let mut first = driver.connect(&url, &Credentials::None).unwrap();
        first
            .execute_update("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)", &[])
            .unwrap();
        let mut second = driver.connect(&url, &Credentials::None).unwrap();

        first.set_auto_commit(false).unwrap();
        first
            .execute_update("INSERT INTO test (value) VALUES ('a')", &[])
            .unwrap();
        first.commit().unwrap();

        // The other session can write while the first is between statements
        second.set_auto_commit(false).unwrap();
        second
            .execute_update("INSERT INTO test (value) VALUES ('b')", &[])
            .unwrap();

        // Ending the first session's transaction does not need the lock
        first.commit().unwrap();
        first.set_isolation_level(IsolationLevel::Serializable).unwrap();
        first.set_auto_commit(true).unwrap();

        second.commit().unwrap();
        second.set_auto_commit(true).unwrap();
        let raw = first.query("SELECT COUNT(*) FROM test", &[]).unwrap();
        assert_eq!(raw.rows, vec![vec![SqlValue::Long(2)]]);
    }

    #[test]
    fn test_enabling_auto_commit_commits_pending_work() {
        let mut conn = memory();
        conn.set_auto_commit(false).unwrap();
        conn.execute_update("INSERT INTO test (value) VALUES ('kept')", &[])
            .unwrap();
        conn.set_auto_commit(true).unwrap();
        conn.rollback().unwrap();

        let raw = conn.query("SELECT COUNT(*) FROM test", &[]).unwrap();
        assert_eq!(raw.rows[0][0], SqlValue::Long(1));
    }

    #[test]
    fn test_isolation_level_is_remembered() {
        let mut conn = memory();
        conn.set_isolation_level(IsolationLevel::ReadUncommitted)
            .unwrap();
        assert_eq!(
            conn.isolation_level().unwrap(),
            IsolationLevel::ReadUncommitted
        );
        let raw = conn.query("PRAGMA read_uncommitted", &[]).unwrap();
        assert_eq!(raw.rows[0][0], SqlValue::Long(1));

        conn.set_isolation_level(IsolationLevel::Serializable).unwrap();
        let raw = conn.query("PRAGMA read_uncommitted", &[]).unwrap();
        assert_eq!(raw.rows[0][0], SqlValue::Long(0));
    }

    #[test]
    fn test_generated_savepoint_names() {
        let mut conn = memory();
        conn.set_auto_commit(false).unwrap();
        let first = conn.set_savepoint(None).unwrap();
        let second = conn.set_savepoint(None).unwrap();
        let named = conn.set_savepoint(Some("my \"point\"")).unwrap();
        assert_ne!(first.name(), second.name());
        assert_eq!(named.name(), "my \"point\"");
        conn.rollback_to_savepoint(&named).unwrap();
        conn.rollback_to_savepoint(&first).unwrap();
    }

    #[test]
    fn test_batch_counts_in_order() {
        let mut conn = memory();
        let sets: Vec<Vec<SqlValue>> = (0..5).map(|i| vec![format!("v{}", i).into()]).collect();
        let counts = conn
            .execute_batch("INSERT INTO test (value) VALUES (?)", &sets)
            .unwrap();
        assert_eq!(counts, vec![1; 5]);

        let counts = conn
            .execute_batch(
                "DELETE FROM test WHERE value = ?",
                &[vec!["v1".into()], vec!["missing".into()]],
            )
            .unwrap();
        assert_eq!(counts, vec![1, 0]);
    }

    #[test]
    fn test_bind_value_encodings() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), SqlValue::Int(1));

        assert_eq!(bind_value(1, &SqlValue::Bool(true)).unwrap(), Value::Integer(1));
        assert_eq!(
            bind_value(1, &SqlValue::Date(date)).unwrap(),
            Value::Text("2024-02-29".to_string())
        );
        assert_eq!(
            bind_value(1, &SqlValue::Timestamp(ts)).unwrap(),
            Value::Text("2024-02-29 12:30:00.000".to_string())
        );
        assert_eq!(
            bind_value(1, &SqlValue::Map(map)).unwrap(),
            Value::Text(r#"{"k":{"Int":1}}"#.to_string())
        );
        assert_eq!(
            bind_value(1, &SqlValue::Chars(vec!['h', 'i'])).unwrap(),
            Value::Text("hi".to_string())
        );
    }

    #[test]
    fn test_closed_connection_rejects_work() {
        let mut conn = memory();
        conn.close().unwrap();
        assert!(conn.is_closed());
        conn.close().unwrap();
        assert!(matches!(
            conn.query("SELECT 1", &[]),
            Err(SqlError::IllegalState(_))
        ));
        assert!(conn.auto_commit().is_err());
    }

    #[test]
    fn test_foreign_keys_property() {
        let mut props = BTreeMap::new();
        props.insert("foreign_keys".to_string(), "off".to_string());
        props.insert("busy_timeout_ms".to_string(), "250".to_string());
        let mut conn = SqliteDriver::new()
            .connect(":memory:", &Credentials::Properties(props))
            .unwrap();
        let raw = conn.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(raw.rows[0][0], SqlValue::Long(0));

        let mut conn = memory();
        let raw = conn.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(raw.rows[0][0], SqlValue::Long(1));
    }

    #[test]
    fn test_is_insert() {
        assert!(is_insert("INSERT INTO t VALUES (1)"));
        assert!(is_insert("\n  replace into t VALUES (1)"));
        assert!(!is_insert("UPDATE t SET a = 1"));
        assert!(!is_insert("INSERTED"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("ON"));
        assert!(parse_flag(" true "));
        assert!(!parse_flag("off"));
        assert!(!parse_flag("garbage"));
    }
}
