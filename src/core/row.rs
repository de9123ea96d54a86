//! Materialized query results
//!
//! A [`ResultSet`] is a complete, detached copy of what a statement returned:
//! either the rows of a read query or the affected count and generated keys
//! of a write. Rows are immutable once built.

use crate::core::convert::TypeConverter;
use crate::core::error::{Result, SqlError};
use crate::core::profile::{Record, TypeProfile};
use crate::core::types::FromSqlValue;
use crate::core::value::{SqlValue, DATE_FORMAT, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Case-insensitive column name to position mapping, shared by all rows of a result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Index the given names; a repeated name resolves to its last position
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_lowercase(), i))
            .collect();
        Self { names, positions }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&name.to_lowercase()).copied()
    }

    /// Names in the order the driver reported them
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Column selector: a zero-based position or a case-insensitive name
pub trait ColumnRef {
    fn position_in(&self, index: &ColumnIndex) -> Option<usize>;
}

impl ColumnRef for usize {
    fn position_in(&self, index: &ColumnIndex) -> Option<usize> {
        (*self < index.len()).then_some(*self)
    }
}

impl ColumnRef for &str {
    fn position_in(&self, index: &ColumnIndex) -> Option<usize> {
        index.position(self)
    }
}

impl ColumnRef for String {
    fn position_in(&self, index: &ColumnIndex) -> Option<usize> {
        index.position(self)
    }
}

/// One row of a read query
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    index: Arc<ColumnIndex>,
    values: Vec<SqlValue>,
}

impl ResultRow {
    /// Build a row, reading any BLOB/CLOB values into memory
    ///
    /// BLOBs become [`SqlValue::Bytes`] and CLOBs become [`SqlValue::String`],
    /// since the driver's handles do not outlive the cursor.
    ///
    /// # Errors
    ///
    /// Returns `LargeObjectRead` if a large object cannot be drained.
    pub fn new(index: Arc<ColumnIndex>, values: Vec<SqlValue>) -> Result<Self> {
        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let column = || index.names().get(i).map(String::as_str).unwrap_or("?");
                match value {
                    SqlValue::Blob(lob) => lob
                        .read_bytes()
                        .map(SqlValue::Bytes)
                        .map_err(|e| SqlError::large_object(column(), e)),
                    SqlValue::Clob(lob) => lob
                        .read_text()
                        .map(SqlValue::String)
                        .map_err(|e| SqlError::large_object(column(), e)),
                    other => Ok(other),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { index, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        self.index.names()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Raw value of a column, or `None` if there is no such column
    pub fn get<C: ColumnRef>(&self, column: C) -> Option<&SqlValue> {
        column
            .position_in(&self.index)
            .and_then(|i| self.values.get(i))
    }

    /// Whether the column is null or missing
    pub fn is_null<C: ColumnRef>(&self, column: C) -> bool {
        self.get(column).map_or(true, SqlValue::is_null)
    }

    /// Convert a column through the coercion matrix
    ///
    /// A missing column converts like null.
    ///
    /// # Errors
    ///
    /// Returns `TypeConversion` when the value cannot become `T`.
    pub fn get_as<T: FromSqlValue, C: ColumnRef>(&self, column: C) -> Result<T> {
        let (member, value) = match column.position_in(&self.index) {
            Some(i) => (
                self.index.names()[i].as_str(),
                self.values.get(i).cloned().unwrap_or(SqlValue::Null),
            ),
            None => ("?", SqlValue::Null),
        };
        TypeConverter::convert(member, value)
    }

    pub fn get_bool<C: ColumnRef>(&self, column: C) -> bool {
        self.get_as(column).unwrap_or_default()
    }

    pub fn get_i8<C: ColumnRef>(&self, column: C) -> i8 {
        self.get_as(column).unwrap_or_default()
    }

    pub fn get_i16<C: ColumnRef>(&self, column: C) -> i16 {
        self.get_as(column).unwrap_or_default()
    }

    pub fn get_i32<C: ColumnRef>(&self, column: C) -> i32 {
        self.get_as(column).unwrap_or_default()
    }

    pub fn get_i64<C: ColumnRef>(&self, column: C) -> i64 {
        self.get_as(column).unwrap_or_default()
    }

    pub fn get_f32<C: ColumnRef>(&self, column: C) -> f32 {
        self.get_as(column).unwrap_or_default()
    }

    pub fn get_f64<C: ColumnRef>(&self, column: C) -> f64 {
        self.get_as(column).unwrap_or_default()
    }

    /// Textual form of a column; `None` for null or missing columns
    pub fn get_string<C: ColumnRef>(&self, column: C) -> Option<String> {
        self.get(column)
            .filter(|v| !v.is_null())
            .map(SqlValue::as_string)
    }

    pub fn get_bytes<C: ColumnRef>(&self, column: C) -> Option<Vec<u8>> {
        match self.get(column)? {
            SqlValue::Bytes(b) => Some(b.clone()),
            SqlValue::String(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }

    pub fn get_timestamp<C: ColumnRef>(&self, column: C) -> Option<DateTime<Utc>> {
        self.get_as(column).ok().flatten()
    }

    pub fn get_date<C: ColumnRef>(&self, column: C) -> Option<NaiveDate> {
        self.get_as(column).ok().flatten()
    }

    /// Map this row onto a new `T`, ignoring columns `T` does not register
    ///
    /// # Errors
    ///
    /// Fails on the first column whose value cannot be converted.
    pub fn to_record<T: Record>(&self) -> Result<T> {
        TypeProfile::<T>::get().populate(
            self.columns()
                .iter()
                .cloned()
                .zip(self.values.iter().cloned()),
        )
    }

    /// Like [`ResultRow::to_record`], consuming the row
    pub fn into_record<T: Record>(self) -> Result<T> {
        let names = self.index.names().to_vec();
        TypeProfile::<T>::get().populate(names.into_iter().zip(self.values))
    }
}

/// JSON-friendly view of a value: no variant tags
struct Plain<'a>(&'a SqlValue);

impl Serialize for Plain<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            SqlValue::Null | SqlValue::Blob(_) | SqlValue::Clob(_) => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Byte(v) => serializer.serialize_i8(*v),
            SqlValue::Short(v) => serializer.serialize_i16(*v),
            SqlValue::Int(v) => serializer.serialize_i32(*v),
            SqlValue::Long(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f32(*v),
            SqlValue::Double(v) => serializer.serialize_f64(*v),
            SqlValue::Char(c) => serializer.serialize_char(*c),
            SqlValue::String(s) => serializer.serialize_str(s),
            SqlValue::Bytes(b) => serializer.serialize_bytes(b),
            SqlValue::Chars(c) => serializer.serialize_str(&c.iter().collect::<String>()),
            SqlValue::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
            SqlValue::Timestamp(t) => serializer.collect_str(&t.format(TIMESTAMP_FORMAT)),
            SqlValue::Enum(e) => serializer.serialize_str(&e.name),
            SqlValue::Array(items) | SqlValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Plain(item))?;
                }
                seq.end()
            }
            SqlValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, &Plain(v))?;
                }
                map.end()
            }
        }
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.columns().iter().zip(&self.values) {
            map.serialize_entry(name, &Plain(value))?;
        }
        map.end()
    }
}

/// Outcome of one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    row_count: u64,
    generated_keys: Vec<i64>,
    is_update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<ResultRow>>,
}

impl ResultSet {
    /// Result of a read query
    pub fn from_query(index: &ColumnIndex, rows: Vec<ResultRow>) -> Self {
        Self {
            columns: index.names().to_vec(),
            row_count: rows.len() as u64,
            generated_keys: Vec::new(),
            is_update: false,
            rows: Some(rows),
        }
    }

    /// Result of a write
    pub fn from_update(affected: u64, generated_keys: Vec<i64>) -> Self {
        Self {
            columns: Vec::new(),
            row_count: affected,
            generated_keys,
            is_update: true,
            rows: None,
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Rows returned, or rows affected for a write
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn generated_keys(&self) -> &[i64] {
        &self.generated_keys
    }

    pub fn is_update(&self) -> bool {
        self.is_update
    }

    /// Rows of a read query; empty for writes
    pub fn rows(&self) -> &[ResultRow] {
        self.rows.as_deref().unwrap_or_default()
    }

    pub fn first_row(&self) -> Option<&ResultRow> {
        self.rows().first()
    }

    /// First generated key, or 0 if none
    pub fn id(&self) -> i64 {
        self.generated_keys.first().copied().unwrap_or(0)
    }

    pub fn ids(&self) -> &[i64] {
        &self.generated_keys
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows().iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = ResultRow;
    type IntoIter = std::vec::IntoIter<ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.unwrap_or_default().into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Type alias kept for callers thinking in terms of write results
pub type UpdateResult = ResultSet;
