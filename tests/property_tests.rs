//! Property-based tests using proptest

mod common;

use common::{Script, ScriptedDriver};
use proptest::prelude::*;
use rust_sql_pool::core::lenient;
use rust_sql_pool::prelude::*;
use rust_sql_pool::ColumnIndex;
use std::collections::HashSet;
use std::time::Duration;

// ============================================================================
// Coercion rules
// ============================================================================

proptest! {
    /// Numbers become booleans by comparing against zero
    #[test]
    fn test_int_to_bool(value in any::<i32>()) {
        let converted: bool = convert(SqlValue::Int(value)).unwrap();
        prop_assert_eq!(converted, value != 0);
    }

    /// Only "true", in any case, parses as true
    #[test]
    fn test_string_to_bool(s in "[a-zA-Z]{0,6}") {
        let converted: bool = convert(SqlValue::String(s.clone())).unwrap();
        prop_assert_eq!(converted, s.eq_ignore_ascii_case("true"));
    }

    /// Integer text parses back to the same integer
    #[test]
    fn test_string_to_long_roundtrip(value in any::<i64>()) {
        let converted: i64 = convert(SqlValue::String(value.to_string())).unwrap();
        prop_assert_eq!(converted, value);
    }

    /// Malformed numeric text never fails; it becomes zero
    #[test]
    fn test_malformed_text_is_zero(s in "[a-z ]{1,12}") {
        prop_assert_eq!(lenient::parse_i32(&s), 0);
        prop_assert_eq!(lenient::parse_i64(&s), 0);
        let converted: i32 = convert(SqlValue::String(s)).unwrap();
        prop_assert_eq!(converted, 0);
    }

    /// Widening conversions keep the value
    #[test]
    fn test_int_widens_to_long_and_double(value in any::<i32>()) {
        let long: i64 = convert(SqlValue::Int(value)).unwrap();
        let double: f64 = convert(SqlValue::Int(value)).unwrap();
        prop_assert_eq!(long, value as i64);
        prop_assert_eq!(double, value as f64);
    }

    /// Bytes decode to the string they were encoded from
    #[test]
    fn test_bytes_to_string(s in "\\PC{0,24}") {
        let converted: String = convert(SqlValue::Bytes(s.clone().into_bytes())).unwrap();
        prop_assert_eq!(converted, s);
    }

    /// Null becomes the target's zero value
    #[test]
    fn test_null_is_zero(_seed in any::<u8>()) {
        prop_assert_eq!(convert::<i32>(SqlValue::Null).unwrap(), 0);
        prop_assert_eq!(convert::<bool>(SqlValue::Null).unwrap(), false);
        prop_assert_eq!(convert::<Option<i64>>(SqlValue::Null).unwrap(), None);
    }
}

// ============================================================================
// Column lookup
// ============================================================================

proptest! {
    /// Lookup ignores case
    #[test]
    fn test_column_lookup_ignores_case(names in prop::collection::hash_set("[a-z]{1,8}", 1..8)) {
        let names: Vec<String> = names.into_iter().collect();
        let index = ColumnIndex::new(names.clone());
        for (i, name) in names.iter().enumerate() {
            prop_assert_eq!(index.position(&name.to_uppercase()), Some(i));
            prop_assert_eq!(index.position(name), Some(i));
        }
    }
}

// ============================================================================
// Pool bookkeeping
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// available + in use always equals the pool size, and no connection is
    /// handed out twice
    #[test]
    fn test_pool_accounting(size in 1usize..5, ops in prop::collection::vec(any::<bool>(), 0..40)) {
        let script = Script::new();
        let pool = ConnectionPool::new(
            Connector::new(ScriptedDriver::new(&script), "scripted://prop"),
            size,
        ).unwrap();
        let mut held = Vec::new();

        for acquire in ops {
            if acquire {
                match pool.acquire(Duration::ZERO) {
                    Ok(conn) => held.push(conn),
                    Err(e) => {
                        prop_assert!(matches!(e, SqlError::PoolTimeout { .. }), "expected PoolTimeout, got {:?}", e);
                        prop_assert_eq!(held.len(), size);
                    }
                }
            } else if let Some(conn) = held.pop() {
                pool.release(conn).unwrap();
            }

            let ids: HashSet<u64> = held.iter().map(|c| c.id()).collect();
            prop_assert_eq!(ids.len(), held.len());
            let stats = pool.stats();
            prop_assert_eq!(stats.available + stats.in_use, size);
            prop_assert_eq!(stats.in_use, held.len());
        }

        for conn in held {
            pool.release(conn).unwrap();
        }
        prop_assert_eq!(pool.available_count(), size);
    }

    /// Batches return one count per parameter set, in input order
    #[test]
    fn test_batch_counts_in_order(
        widths in prop::collection::vec(0usize..4, 0..20),
        granularity in 1usize..8,
    ) {
        let script = Script::new();
        let pool = ConnectionPool::new(
            Connector::new(ScriptedDriver::new(&script), "scripted://prop"),
            1,
        ).unwrap();
        let sets: Vec<Vec<SqlValue>> = widths
            .iter()
            .map(|&w| vec![SqlValue::Null; w])
            .collect();

        let counts = pool
            .with_connection(Duration::ZERO, |conn| conn.batch_execute("INSERT", granularity, &sets))
            .unwrap();
        let expected: Vec<u64> = widths.iter().map(|&w| w as u64).collect();
        prop_assert_eq!(counts, expected);
    }
}
