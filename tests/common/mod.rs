//! Scripted driver shared by integration tests
//!
//! Every session records the calls it receives into a shared log, and a
//! test can make the next call of a given kind fail.

#![allow(dead_code)]

use parking_lot::Mutex;
use rust_sql_pool::{
    Credentials, Driver, IsolationLevel, PhysicalConnection, RawResult, RawUpdate, Result,
    Savepoint, SqlError, SqlValue,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State shared between a test and every session its driver opens
#[derive(Default)]
pub struct Script {
    connects: AtomicUsize,
    closes: AtomicUsize,
    connect_limit: Mutex<Option<usize>>,
    failing: Mutex<HashSet<&'static str>>,
    canned: Mutex<Option<RawResult>>,
    log: Mutex<Vec<String>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse connects once `limit` sessions have been opened in total
    pub fn limit_connects(&self, limit: usize) {
        *self.connect_limit.lock() = Some(limit);
    }

    pub fn allow_connects(&self) {
        *self.connect_limit.lock() = None;
    }

    /// Make the next `op` call fail
    pub fn fail_next(&self, op: &'static str) {
        self.failing.lock().insert(op);
    }

    /// Rows returned by every query from now on
    pub fn set_rows(&self, columns: &[&str], rows: Vec<Vec<SqlValue>>) {
        *self.canned.lock() = Some(RawResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing.lock().remove(op) {
            return Err(SqlError::query(format!("scripted {} failure", op)));
        }
        Ok(())
    }
}

pub struct ScriptedDriver {
    script: Arc<Script>,
}

impl ScriptedDriver {
    pub fn new(script: &Arc<Script>) -> Self {
        Self {
            script: Arc::clone(script),
        }
    }
}

impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;

    fn connect(&self, url: &str, _credentials: &Credentials) -> Result<ScriptedConnection> {
        let limit = *self.script.connect_limit.lock();
        if let Some(limit) = limit {
            if self.script.connects() >= limit {
                return Err(SqlError::query(format!("refused connection to {}", url)));
            }
        }
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConnection {
            script: Arc::clone(&self.script),
            closed: false,
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            savepoints: 0,
        })
    }
}

pub struct ScriptedConnection {
    script: Arc<Script>,
    closed: bool,
    auto_commit: bool,
    isolation: IsolationLevel,
    savepoints: u64,
}

impl PhysicalConnection for ScriptedConnection {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.script.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.script.check("set_auto_commit")?;
        self.script.record(format!("auto_commit={}", auto_commit));
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn isolation_level(&self) -> Result<IsolationLevel> {
        Ok(self.isolation)
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.script.check("set_isolation_level")?;
        self.script.record(format!("isolation={}", level));
        self.isolation = level;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.script.check("commit")?;
        self.script.record("commit".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.script.check("rollback")?;
        self.script.record("rollback".to_string());
        Ok(())
    }

    fn set_savepoint(&mut self, name: Option<&str>) -> Result<Savepoint> {
        self.savepoints += 1;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("sp{}", self.savepoints));
        self.script.record(format!("savepoint {}", name));
        Ok(Savepoint::new(name))
    }

    fn rollback_to_savepoint(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.script
            .record(format!("rollback to {}", savepoint.name()));
        Ok(())
    }

    fn query(&mut self, sql: &str, _params: &[SqlValue]) -> Result<RawResult> {
        self.script.check("query")?;
        self.script.record(format!("query {}", sql));
        Ok(self.script.canned.lock().clone().unwrap_or_default())
    }

    fn execute_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawUpdate> {
        self.script.check("execute_update")?;
        self.script.record(format!("update {}", sql));
        Ok(RawUpdate {
            affected: 1,
            generated_keys: params
                .iter()
                .filter_map(|p| match p {
                    SqlValue::Long(key) => Some(*key),
                    _ => None,
                })
                .collect(),
        })
    }

    fn execute_batch(&mut self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Vec<u64>> {
        self.script.check("execute_batch")?;
        self.script
            .record(format!("batch {} x{}", sql, param_sets.len()));
        Ok(param_sets.iter().map(|set| set.len() as u64).collect())
    }
}
