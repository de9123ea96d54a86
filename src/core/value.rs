//! SQL value types
//!
//! This module defines the dynamically typed values that flow in and out of
//! the driver boundary and through the coercion matrix.

use crate::core::convert::{TypeConverter, DEFAULT_MEMBER};
use crate::core::types::FromSqlValue;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// Dynamically typed SQL value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 8-bit signed integer
    Byte(i8),
    /// 16-bit signed integer
    Short(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Single character
    Char(char),
    /// String value
    String(String),
    /// Byte sequence
    Bytes(Vec<u8>),
    /// Character sequence
    Chars(Vec<char>),
    /// Calendar date
    Date(NaiveDate),
    /// Instant in UTC
    Timestamp(DateTime<Utc>),
    /// Enumerated value
    Enum(EnumValue),
    /// Fixed sequence of values
    Array(Vec<SqlValue>),
    /// Ordered collection of values
    List(Vec<SqlValue>),
    /// Named members, applied to records by name
    Map(BTreeMap<String, SqlValue>),
    /// Binary large object, still unread
    #[serde(skip)]
    Blob(LargeObject),
    /// Character large object, still unread
    #[serde(skip)]
    Clob(LargeObject),
}

/// An enumerated value carried by symbolic name and ordinal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValue {
    /// Name of the enumeration type
    pub type_name: String,
    /// Symbolic name of the variant
    pub name: String,
    /// Position of the variant in declaration order
    pub ordinal: usize,
}

/// Streaming handle to a large object
///
/// Reading drains whatever content remains; a second read of the same
/// handle returns only what the first one left behind.
#[derive(Clone)]
pub struct LargeObject {
    reader: Arc<Mutex<Box<dyn Read + Send>>>,
}

impl LargeObject {
    /// Wrap a reader as a large object
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Box::new(reader))),
        }
    }

    /// Large object over an in-memory buffer
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(io::Cursor::new(bytes))
    }

    /// Read the remaining content as bytes
    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.reader.lock().read_to_end(&mut out)?;
        Ok(out)
    }

    /// Read the remaining content as UTF-8 text
    pub fn read_text(&self) -> io::Result<String> {
        let mut out = String::new();
        self.reader.lock().read_to_string(&mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for LargeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargeObject").finish_non_exhaustive()
    }
}

impl PartialEq for LargeObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader)
    }
}

impl SqlValue {
    /// Coerce a present, in-memory value with the converter's rules
    ///
    /// `Null`, undrained large objects and values no rule accepts give `None`.
    fn coerced<T: FromSqlValue>(&self) -> Option<T> {
        if self.is_null() || self.is_large_object() {
            return None;
        }
        TypeConverter::convert(DEFAULT_MEMBER, self.clone()).ok()
    }

    /// Get the value as a boolean
    ///
    /// Numbers are true when nonzero; text is true only for `"true"` in any case.
    pub fn as_bool(&self) -> Option<bool> {
        self.coerced()
    }

    /// Get the value as an i32
    ///
    /// Wider integers keep their low bits and malformed text gives `0`.
    pub fn as_int(&self) -> Option<i32> {
        self.coerced()
    }

    /// Get the value as an i64
    pub fn as_long(&self) -> Option<i64> {
        self.coerced()
    }

    /// Get the value as an f64
    pub fn as_double(&self) -> Option<f64> {
        self.coerced()
    }

    /// Get the value as a string slice (zero-copy for String values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as a string (with conversion)
    pub fn as_string(&self) -> String {
        match self {
            SqlValue::Null => "null".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::Byte(v) => v.to_string(),
            SqlValue::Short(v) => v.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Long(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Double(v) => v.to_string(),
            SqlValue::Char(c) => c.to_string(),
            SqlValue::String(s) => s.clone(),
            SqlValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            SqlValue::Chars(c) => c.iter().collect(),
            SqlValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            SqlValue::Timestamp(t) => t.format(TIMESTAMP_FORMAT).to_string(),
            SqlValue::Enum(e) => e.name.clone(),
            SqlValue::Array(_) | SqlValue::List(_) | SqlValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
            SqlValue::Blob(_) => "<blob>".to_string(),
            SqlValue::Clob(_) => "<clob>".to_string(),
        }
    }

    /// Get the value as bytes (zero-copy)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Bytes(b) => Some(b),
            SqlValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Whether the value is an unread large object
    pub fn is_large_object(&self) -> bool {
        matches!(self, SqlValue::Blob(_) | SqlValue::Clob(_))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Byte(_) => "byte",
            SqlValue::Short(_) => "short",
            SqlValue::Int(_) => "int",
            SqlValue::Long(_) => "long",
            SqlValue::Float(_) => "float",
            SqlValue::Double(_) => "double",
            SqlValue::Char(_) => "char",
            SqlValue::String(_) => "string",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Chars(_) => "chars",
            SqlValue::Date(_) => "date",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Enum(_) => "enum",
            SqlValue::Array(_) => "array",
            SqlValue::List(_) => "list",
            SqlValue::Map(_) => "map",
            SqlValue::Blob(_) => "blob",
            SqlValue::Clob(_) => "clob",
        }
    }
}

/// Canonical textual form of dates
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical textual form of timestamps
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v)
                }
            }
        )+
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
    Vec<char> => Chars,
    NaiveDate => Date,
    DateTime<Utc> => Timestamp,
    EnumValue => Enum,
    BTreeMap<String, SqlValue> => Map,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => SqlValue::Null,
        }
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Long(i),
                None => SqlValue::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::String(s),
            Value::Array(items) => SqlValue::List(items.into_iter().map(SqlValue::from).collect()),
            Value::Object(entries) => SqlValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, SqlValue::from(v)))
                    .collect(),
            ),
        }
    }
}
