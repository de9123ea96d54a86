//! Statement execution shared by connections and transactions
//!
//! Reads are materialized eagerly: every row is copied into a [`ResultRow`]
//! before the call returns, and large objects are drained on the way.

use crate::core::driver::PhysicalConnection;
use crate::core::error::Result;
use crate::core::profile::Record;
use crate::core::row::{ColumnIndex, ResultRow, ResultSet};
use crate::core::value::SqlValue;
use std::sync::Arc;

/// Default number of parameter sets submitted per batch chunk
pub const DEFAULT_BATCH_SIZE: usize = 1024;

fn materialize(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    params: &[SqlValue],
    limit: Option<usize>,
) -> Result<(Arc<ColumnIndex>, Vec<ResultRow>)> {
    let raw = physical.query(sql, params)?;
    let index = Arc::new(ColumnIndex::new(raw.columns));
    let rows = raw
        .rows
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|values| ResultRow::new(Arc::clone(&index), values))
        .collect::<Result<Vec<_>>>()?;
    Ok((index, rows))
}

pub(crate) fn query_all(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<ResultSet> {
    let (index, rows) = materialize(physical, sql, params, None)?;
    Ok(ResultSet::from_query(&index, rows))
}

pub(crate) fn query_row(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Option<ResultRow>> {
    let (_, rows) = materialize(physical, sql, params, Some(1))?;
    Ok(rows.into_iter().next())
}

pub(crate) fn query_all_as<T: Record>(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<T>> {
    let (_, rows) = materialize(physical, sql, params, None)?;
    rows.into_iter().map(ResultRow::into_record).collect()
}

pub(crate) fn query_row_as<T: Record>(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Option<T>> {
    query_row(physical, sql, params)?
        .map(ResultRow::into_record)
        .transpose()
}

pub(crate) fn execute(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<ResultSet> {
    let update = physical.execute_update(sql, params)?;
    Ok(ResultSet::from_update(update.affected, update.generated_keys))
}

/// Submit `param_sets` in chunks of `granularity`, keeping input order
pub(crate) fn batch_execute(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    granularity: usize,
    param_sets: &[Vec<SqlValue>],
) -> Result<Vec<u64>> {
    let mut counts = Vec::with_capacity(param_sets.len());
    for chunk in param_sets.chunks(granularity.max(1)) {
        counts.extend(physical.execute_batch(sql, chunk)?);
    }
    Ok(counts)
}

/// One full write per parameter set, so each keeps its generated keys
pub(crate) fn batch_execute_results(
    physical: &mut dyn PhysicalConnection,
    sql: &str,
    param_sets: &[Vec<SqlValue>],
) -> Result<Vec<ResultSet>> {
    let mut results = Vec::with_capacity(param_sets.len());
    for params in param_sets {
        results.push(execute(&mut *physical, sql, params)?);
    }
    Ok(results)
}
