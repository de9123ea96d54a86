//! Pool and transaction behavior against a scripted driver

mod common;

use common::{Script, ScriptedDriver};
use rust_sql_pool::prelude::*;
use rust_sql_pool::{ProfileBuilder, Record};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn scripted_pool(script: &Arc<Script>, connections: usize) -> ConnectionPool<ScriptedDriver> {
    ConnectionPool::new(
        Connector::new(ScriptedDriver::new(script), "scripted://test"),
        connections,
    )
    .expect("Failed to create pool")
}

#[test]
fn test_pool_opens_connections_eagerly() {
    let script = Script::new();
    let pool = scripted_pool(&script, 3);
    assert_eq!(script.connects(), 3);
    assert_eq!(pool.total_count(), 3);
    assert_eq!(pool.available_count(), 3);
}

#[test]
fn test_failed_build_closes_opened_connections() {
    let script = Script::new();
    script.limit_connects(2);
    let result = ConnectionPool::new(
        Connector::new(ScriptedDriver::new(&script), "scripted://test"),
        4,
    );
    assert!(matches!(result, Err(SqlError::PoolConnection { .. })));
    assert_eq!(script.closes(), 2);
}

#[test]
fn test_from_config_rejects_empty_pool() {
    let script = Script::new();
    let result = ConnectionPool::from_config(
        ScriptedDriver::new(&script),
        PoolConfig::new("scripted://test").with_connections(0),
    );
    assert!(matches!(result, Err(SqlError::Other(_))));
    assert_eq!(script.connects(), 0);
}

#[test]
fn test_from_config_applies_batch_size() {
    let script = Script::new();
    let pool = ConnectionPool::from_config(
        ScriptedDriver::new(&script),
        PoolConfig::new("scripted://test")
            .with_connections(1)
            .with_batch_size(2)
            .with_acquire_timeout(Duration::from_millis(10)),
    )
    .unwrap();
    assert_eq!(pool.acquire_timeout(), Duration::from_millis(10));

    let sets: Vec<Vec<SqlValue>> = (0..5).map(|i| vec![SqlValue::Int(i)]).collect();
    let counts = pool
        .with_connection(pool.acquire_timeout(), |conn| {
            conn.batch_execute_default("INSERT INTO t VALUES (?)", &sets)
        })
        .unwrap();
    assert_eq!(counts, vec![1; 5]);
    let batches: Vec<String> = script
        .log()
        .into_iter()
        .filter(|entry| entry.starts_with("batch"))
        .collect();
    assert_eq!(
        batches,
        vec![
            "batch INSERT INTO t VALUES (?) x2",
            "batch INSERT INTO t VALUES (?) x2",
            "batch INSERT INTO t VALUES (?) x1",
        ]
    );
}

#[test]
fn test_closed_session_replaced_on_acquire() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);

    let mut conn = pool.acquire(Duration::ZERO).unwrap();
    let id = conn.id();
    conn.close().unwrap();
    assert!(conn.is_closed());
    pool.release(conn).unwrap();

    let conn = pool.acquire(Duration::ZERO).unwrap();
    assert_eq!(conn.id(), id);
    assert!(!conn.is_closed());
    assert_eq!(script.connects(), 2);
    pool.release(conn).unwrap();
}

#[test]
fn test_failed_replacement_keeps_pool_whole() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);

    let mut conn = pool.acquire(Duration::ZERO).unwrap();
    conn.close().unwrap();
    pool.release(conn).unwrap();

    script.limit_connects(1);
    let err = pool.acquire(Duration::ZERO).unwrap_err();
    assert!(matches!(err, SqlError::PoolConnection { .. }));
    assert_eq!(pool.available_count(), 1);
    assert_eq!(pool.in_use_count(), 0);

    script.allow_connects();
    let conn = pool.acquire(Duration::ZERO).unwrap();
    assert!(!conn.is_closed());
    pool.release(conn).unwrap();
}

#[test]
fn test_release_into_wrong_pool_leaves_connection_intact() {
    let script = Script::new();
    let owner = scripted_pool(&script, 1);
    let stranger = scripted_pool(&script, 1);

    let mut conn = owner.acquire(Duration::ZERO).unwrap();
    std::mem::forget(conn.begin_transaction(IsolationLevel::Serializable).unwrap());
    script.clear_log();

    let rejected = stranger.release(conn).unwrap_err();
    assert!(matches!(rejected.error(), SqlError::InvariantViolation(_)));
    assert!(script.log().is_empty());
    assert_eq!(stranger.available_count(), 1);
    assert_eq!(stranger.in_use_count(), 0);

    let (conn, _) = rejected.into_parts();
    assert!(conn.in_transaction());
    owner.release(conn).unwrap();
    assert_eq!(
        script.log(),
        vec!["rollback", "isolation=READ COMMITTED", "auto_commit=true"]
    );
    assert_eq!(owner.available_count(), 1);
    assert_eq!(owner.in_use_count(), 0);

    let conn = owner.acquire(Duration::ZERO).unwrap();
    assert!(!conn.in_transaction());
    owner.release(conn).unwrap();
}

#[test]
fn test_acquire_times_out() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    let _held = pool.get(Duration::ZERO).unwrap();

    let started = Instant::now();
    let err = pool.acquire(Duration::from_millis(50)).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(err, SqlError::PoolTimeout { timeout_ms: 50 }));
    assert_eq!(err.to_string(), "No available connections after 50ms");
}

#[test]
fn test_concurrent_checkouts_never_exceed_pool_size() {
    let script = Script::new();
    let pool = Arc::new(scripted_pool(&script, 3));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    pool.with_connection(Duration::from_secs(5), |conn| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        let result = conn.query_all("SELECT 1", params![]);
                        active.fetch_sub(1, Ordering::SeqCst);
                        result
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let stats = pool.stats();
    assert_eq!(stats.available, 3);
    assert_eq!(stats.in_use, 0);
    assert_eq!(script.connects(), 3);
}

#[test]
fn test_close_closes_idle_and_returned_connections() {
    let script = Script::new();
    let pool = scripted_pool(&script, 2);
    let held = pool.acquire(Duration::ZERO).unwrap();

    pool.close();
    assert!(pool.is_closed());
    assert_eq!(script.closes(), 1);

    pool.release(held).unwrap();
    assert_eq!(script.closes(), 2);
    assert!(matches!(
        pool.acquire(Duration::ZERO),
        Err(SqlError::PoolClosed)
    ));
}

#[test]
fn test_transaction_switches_and_restores_state() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    let mut conn = pool.get(Duration::ZERO).unwrap();
    script.clear_log();

    let mut tx = conn
        .begin_transaction(IsolationLevel::Serializable)
        .unwrap();
    tx.execute("UPDATE t SET a = 1", params![]).unwrap();
    tx.commit().unwrap();
    drop(tx);

    assert_eq!(
        script.log(),
        vec![
            "auto_commit=false",
            "isolation=SERIALIZABLE",
            "update UPDATE t SET a = 1",
            "commit",
            "isolation=READ COMMITTED",
            "auto_commit=true",
        ]
    );
    assert!(!conn.in_transaction());
}

#[test]
fn test_failed_commit_still_restores_state() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    let mut conn = pool.get(Duration::ZERO).unwrap();

    let mut tx = conn
        .begin_transaction(IsolationLevel::RepeatableRead)
        .unwrap();
    script.fail_next("commit");
    assert!(matches!(tx.commit(), Err(SqlError::Query(_))));
    assert!(tx.is_finished());
    drop(tx);

    assert!(conn.auto_commit().unwrap());
    assert_eq!(conn.isolation_level().unwrap(), IsolationLevel::ReadCommitted);
    assert!(conn.query_all("SELECT 1", params![]).is_ok());
}

#[test]
fn test_failed_begin_restores_state() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    let mut conn = pool.get(Duration::ZERO).unwrap();

    script.fail_next("set_isolation_level");
    let err = conn
        .begin_transaction(IsolationLevel::Serializable)
        .unwrap_err();
    assert!(matches!(err, SqlError::Query(_)));
    assert!(!conn.in_transaction());
    assert!(conn.auto_commit().unwrap());
}

#[test]
fn test_begin_rejects_none_level() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    let mut conn = pool.get(Duration::ZERO).unwrap();
    assert!(matches!(
        conn.begin_transaction(IsolationLevel::None),
        Err(SqlError::IllegalState(_))
    ));
}

#[test]
fn test_with_transaction_aborts_unfinished_work() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);

    let value = pool
        .with_transaction(Duration::ZERO, IsolationLevel::ReadCommitted, |tx| {
            tx.execute("UPDATE t SET a = 1", params![])?;
            Ok(7)
        })
        .unwrap();
    assert_eq!(value, 7);
    assert!(script.log().contains(&"rollback".to_string()));
    assert!(!script.log().contains(&"commit".to_string()));
}

#[test]
fn test_with_transaction_error_wins_over_abort_error() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);

    let err = pool
        .with_transaction(Duration::ZERO, IsolationLevel::ReadCommitted, |_tx| {
            script.fail_next("rollback");
            Err::<(), _>(SqlError::other("closure failed"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "closure failed");
    assert_eq!(pool.available_count(), 1);
}

#[test]
fn test_savepoints_pass_through() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    pool.with_transaction(Duration::ZERO, IsolationLevel::Serializable, |tx| {
        let first = tx.set_savepoint(None)?;
        tx.set_savepoint(Some("named"))?;
        tx.rollback_to(&first)?;
        tx.commit()
    })
    .unwrap();

    let log = script.log();
    assert!(log.contains(&"savepoint sp1".to_string()));
    assert!(log.contains(&"savepoint named".to_string()));
    assert!(log.contains(&"rollback to sp1".to_string()));
}

#[test]
fn test_generated_keys_on_update_result() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    let result = pool
        .with_connection(Duration::ZERO, |conn| {
            conn.execute("INSERT INTO t VALUES (?, ?)", params![11i64, 12i64])
        })
        .unwrap();
    assert!(result.is_update());
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.ids(), &[11, 12]);
    assert_eq!(result.id(), 11);
    assert!(result.rows().is_empty());
}

#[derive(Debug, Default, PartialEq)]
struct Fruit {
    id: i32,
    name: String,
    ripe: bool,
}

impl Record for Fruit {
    fn describe(profile: &mut ProfileBuilder<Self>) {
        profile.field("id", |f: &mut Fruit, v: i32| f.id = v);
        profile
            .field("name", |f: &mut Fruit, v: String| f.name = v)
            .alias("label");
        profile.setter("ripe", |f: &mut Fruit, v: bool| f.ripe = v);
    }
}

#[test]
fn test_query_rows_mapped_onto_records() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    script.set_rows(
        &["id", "label", "ripe", "unmapped"],
        vec![
            vec![
                SqlValue::Long(1),
                SqlValue::from("apple"),
                SqlValue::from("true"),
                SqlValue::Null,
            ],
            vec![
                SqlValue::String("2".to_string()),
                SqlValue::from("banana"),
                SqlValue::Long(0),
                SqlValue::Double(1.0),
            ],
        ],
    );

    let fruits: Vec<Fruit> = pool
        .with_connection(Duration::ZERO, |conn| {
            conn.query_all_as("SELECT * FROM fruit", params![])
        })
        .unwrap();
    assert_eq!(
        fruits,
        vec![
            Fruit {
                id: 1,
                name: "apple".to_string(),
                ripe: true,
            },
            Fruit {
                id: 2,
                name: "banana".to_string(),
                ripe: false,
            },
        ]
    );

    let first: Option<Fruit> = pool
        .with_connection(Duration::ZERO, |conn| {
            conn.query_row_as("SELECT * FROM fruit", params![])
        })
        .unwrap();
    assert_eq!(first.map(|f| f.name), Some("apple".to_string()));
}

#[test]
fn test_record_mapping_reports_bad_member() {
    let script = Script::new();
    let pool = scripted_pool(&script, 1);
    script.set_rows(&["id"], vec![vec![SqlValue::Map(Default::default())]]);

    let err = pool
        .with_connection(Duration::ZERO, |conn| {
            conn.query_all_as::<Fruit>("SELECT id FROM fruit", params![])
        })
        .unwrap_err();
    match err {
        SqlError::TypeConversion { member, .. } => assert_eq!(member, "id"),
        other => panic!("unexpected error: {other}"),
    }
}
