//! Coercion matrix
//!
//! [`TypeConverter::coerce`] turns any [`SqlValue`] into the shape a
//! [`SqlType`] asks for. Rules are tried in a fixed order and the first one
//! whose guard matches decides the result:
//!
//! 1. null becomes the zero value of primitive targets and stays null otherwise
//! 2. values already in the target's shape pass through
//! 3. arrays (and byte/char sequences) convert element-wise, or as text
//! 4. maps become records
//! 5. lists convert element-wise into array targets
//! 6. enums become ordinals or names
//! 7. booleans
//! 8. numbers, with truncating primitive-cast semantics
//! 9. characters
//! 10. dates and timestamps
//! 11. text, parsed leniently
//! 12. large objects are drained and retried as byte/char sequences
//! 13. anything else is a `TypeConversion` error

use crate::core::error::{Result, SqlError};
use crate::core::lenient;
use crate::core::types::{FromSqlValue, SqlType};
use crate::core::value::{EnumValue, SqlValue, DATE_FORMAT, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;

/// Member name used when converting a value that does not belong to a record
pub const DEFAULT_MEMBER: &str = "source";

/// Convert a standalone value into `T`.
///
/// # Errors
///
/// Returns `TypeConversion` when no rule applies.
pub fn convert<T: FromSqlValue>(value: SqlValue) -> Result<T> {
    TypeConverter::convert(DEFAULT_MEMBER, value)
}

/// Stateless implementation of the coercion rules
pub struct TypeConverter;

/// Numeric source, widened without losing the integral/floating distinction
#[derive(Debug, Clone, Copy)]
enum Number {
    Integral(i64),
    Floating(f64),
}

impl Number {
    fn of(value: &SqlValue) -> Option<Self> {
        match *value {
            SqlValue::Byte(v) => Some(Number::Integral(v as i64)),
            SqlValue::Short(v) => Some(Number::Integral(v as i64)),
            SqlValue::Int(v) => Some(Number::Integral(v as i64)),
            SqlValue::Long(v) => Some(Number::Integral(v)),
            SqlValue::Float(v) => Some(Number::Floating(v as f64)),
            SqlValue::Double(v) => Some(Number::Floating(v)),
            _ => None,
        }
    }

    // Floating values narrow through i32 first, like a primitive cast.
    fn to_i32(self) -> i32 {
        match self {
            Number::Integral(n) => n as i32,
            Number::Floating(f) => f as i32,
        }
    }

    fn to_i64(self) -> i64 {
        match self {
            Number::Integral(n) => n,
            Number::Floating(f) => f as i64,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Number::Integral(n) => n as f64,
            Number::Floating(f) => f,
        }
    }

    fn to_f32(self) -> f32 {
        match self {
            Number::Integral(n) => n as f32,
            Number::Floating(f) => f as f32,
        }
    }
}

/// Character for a 16-bit code unit; lone surrogates become U+FFFD.
fn char_from_unit(unit: u16) -> char {
    char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn epoch_millis_of_date(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp_millis())
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(s, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(s).map(|t| t.date_naive()))
}

/// Collapse converted elements into the most specific sequence shape
fn collect_sequence(element: &SqlType, items: Vec<SqlValue>) -> SqlValue {
    match element {
        SqlType::Byte => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|item| match item {
                    SqlValue::Byte(b) => Some(*b as u8),
                    _ => None,
                })
                .collect();
            bytes.map_or(SqlValue::Array(items), SqlValue::Bytes)
        }
        SqlType::Char => {
            let chars: Option<Vec<char>> = items
                .iter()
                .map(|item| match item {
                    SqlValue::Char(c) => Some(*c),
                    _ => None,
                })
                .collect();
            chars.map_or(SqlValue::Array(items), SqlValue::Chars)
        }
        _ => SqlValue::Array(items),
    }
}

impl TypeConverter {
    /// Coerce and extract a typed value.
    ///
    /// # Errors
    ///
    /// Returns `TypeConversion` when no rule applies and `LargeObjectRead`
    /// when a BLOB/CLOB cannot be drained.
    pub fn convert<T: FromSqlValue>(member: &str, value: SqlValue) -> Result<T> {
        let coerced = Self::coerce(member, value, &T::sql_type())?;
        T::from_sql_value(member, coerced)
    }

    /// Reshape `value` to fit `target`.
    ///
    /// `member` names the value in error messages; sequence elements are
    /// reported as `member[i]` (arrays) or `member, index i` (lists).
    ///
    /// # Errors
    ///
    /// Returns `TypeConversion` when no rule applies and `LargeObjectRead`
    /// when a BLOB/CLOB cannot be drained.
    pub fn coerce(member: &str, value: SqlValue, target: &SqlType) -> Result<SqlValue> {
        if let SqlType::Nullable(inner) = target {
            return match value {
                SqlValue::Null => Ok(SqlValue::Null),
                other => Self::coerce(member, other, inner),
            };
        }
        if value.is_null() {
            return Ok(target.zero_value());
        }
        if target.accepts(&value) {
            return Ok(value);
        }

        match value {
            SqlValue::Null => Ok(target.zero_value()),
            SqlValue::Bytes(bytes) => Self::convert_bytes(member, bytes, target),
            SqlValue::Chars(chars) => Self::convert_chars(member, chars, target),
            SqlValue::Array(items) => Self::convert_elements(member, items, target, |i| {
                format!("{}[{}]", member, i)
            }),
            SqlValue::Map(entries) => Self::convert_map(member, entries, target),
            SqlValue::List(items) => Self::convert_elements(member, items, target, |i| {
                format!("{}, index {}", member, i)
            }),
            SqlValue::Enum(e) => Self::convert_enum(member, e, target),
            SqlValue::Bool(b) => Self::convert_bool(member, b, target),
            SqlValue::Byte(_)
            | SqlValue::Short(_)
            | SqlValue::Int(_)
            | SqlValue::Long(_)
            | SqlValue::Float(_)
            | SqlValue::Double(_) => Self::convert_number(member, value, target),
            SqlValue::Char(c) => Self::convert_char(member, c, target),
            SqlValue::Date(d) => Self::convert_date(member, d, target),
            SqlValue::Timestamp(t) => Self::convert_timestamp(member, t, target),
            SqlValue::String(s) => Self::convert_string(member, s, target),
            SqlValue::Blob(lob) => {
                let bytes = lob
                    .read_bytes()
                    .map_err(|e| SqlError::large_object(member, e))?;
                Self::coerce(member, SqlValue::Bytes(bytes), target)
            }
            SqlValue::Clob(lob) => {
                let text = lob
                    .read_text()
                    .map_err(|e| SqlError::large_object(member, e))?;
                Self::coerce(member, SqlValue::Chars(text.chars().collect()), target)
            }
        }
    }

    fn fail(member: &str, source_type: &str, target: &SqlType) -> SqlError {
        SqlError::type_conversion(member, source_type, &target.to_string())
    }

    /// Wrap a scalar as a one-element sequence of the target's element type
    fn single_element(member: &str, value: SqlValue, element: &SqlType) -> Result<SqlValue> {
        let item = Self::coerce(member, value, element)?;
        Ok(collect_sequence(element, vec![item]))
    }

    fn convert_elements(
        member: &str,
        items: Vec<SqlValue>,
        target: &SqlType,
        name: impl Fn(usize) -> String,
    ) -> Result<SqlValue> {
        let Some(element) = target.element_type() else {
            return Err(Self::fail(member, "sequence", target));
        };
        let converted = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Self::coerce(&name(i), item, element))
            .collect::<Result<Vec<_>>>()?;
        Ok(collect_sequence(element, converted))
    }

    fn convert_bytes(member: &str, bytes: Vec<u8>, target: &SqlType) -> Result<SqlValue> {
        match target {
            SqlType::String => Ok(SqlValue::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            SqlType::Array(element) if **element == SqlType::Char => Ok(SqlValue::Chars(
                String::from_utf8_lossy(&bytes).chars().collect(),
            )),
            _ => {
                let items = bytes.into_iter().map(|b| SqlValue::Byte(b as i8)).collect();
                Self::convert_elements(member, items, target, |i| format!("{}[{}]", member, i))
            }
        }
    }

    fn convert_chars(member: &str, chars: Vec<char>, target: &SqlType) -> Result<SqlValue> {
        match target {
            SqlType::String => Ok(SqlValue::String(chars.into_iter().collect())),
            SqlType::Array(element) if **element == SqlType::Byte => {
                let text: String = chars.into_iter().collect();
                Ok(SqlValue::Bytes(text.into_bytes()))
            }
            SqlType::Array(_) => {
                let items = chars.into_iter().map(SqlValue::Char).collect();
                Self::convert_elements(member, items, target, |i| format!("{}[{}]", member, i))
            }
            _ => Self::convert_string(member, chars.into_iter().collect(), target),
        }
    }

    fn convert_map(
        member: &str,
        entries: BTreeMap<String, SqlValue>,
        target: &SqlType,
    ) -> Result<SqlValue> {
        match target {
            // The record itself is built by the target's `FromSqlValue` impl.
            SqlType::Record(_) => Ok(SqlValue::Map(entries)),
            _ => Err(Self::fail(member, "map", target)),
        }
    }

    fn convert_enum(member: &str, e: EnumValue, target: &SqlType) -> Result<SqlValue> {
        let ordinal = e.ordinal;
        match target {
            SqlType::Byte => Ok(SqlValue::Byte(ordinal as i8)),
            SqlType::Short => Ok(SqlValue::Short(ordinal as i16)),
            SqlType::Int => Ok(SqlValue::Int(ordinal as i32)),
            SqlType::Long => Ok(SqlValue::Long(ordinal as i64)),
            SqlType::Float => Ok(SqlValue::Float(ordinal as f32)),
            SqlType::Double => Ok(SqlValue::Double(ordinal as f64)),
            SqlType::String => Ok(SqlValue::String(e.name)),
            SqlType::Enum(desc) => Ok(desc.lookup(&e.name).map_or(SqlValue::Null, SqlValue::Enum)),
            _ => Err(Self::fail(member, "enum", target)),
        }
    }

    fn convert_bool(member: &str, b: bool, target: &SqlType) -> Result<SqlValue> {
        let n = b as i32;
        match target {
            SqlType::Byte => Ok(SqlValue::Byte(n as i8)),
            SqlType::Short => Ok(SqlValue::Short(n as i16)),
            SqlType::Int => Ok(SqlValue::Int(n)),
            SqlType::Long => Ok(SqlValue::Long(n as i64)),
            SqlType::Float => Ok(SqlValue::Float(n as f32)),
            SqlType::Double => Ok(SqlValue::Double(n as f64)),
            SqlType::Char => Ok(SqlValue::Char(char_from_unit(n as u16))),
            SqlType::String => Ok(SqlValue::String(b.to_string())),
            SqlType::Array(element) => Self::single_element(member, SqlValue::Bool(b), element),
            _ => Err(Self::fail(member, "bool", target)),
        }
    }

    fn convert_number(member: &str, value: SqlValue, target: &SqlType) -> Result<SqlValue> {
        let Some(n) = Number::of(&value) else {
            return Err(Self::fail(member, value.type_name(), target));
        };
        match target {
            SqlType::Bool => Ok(SqlValue::Bool(n.to_i32() != 0)),
            SqlType::Byte => Ok(SqlValue::Byte(n.to_i32() as i8)),
            SqlType::Short => Ok(SqlValue::Short(n.to_i32() as i16)),
            SqlType::Int => Ok(SqlValue::Int(n.to_i32())),
            SqlType::Long => Ok(SqlValue::Long(n.to_i64())),
            SqlType::Float => Ok(SqlValue::Float(n.to_f32())),
            SqlType::Double => Ok(SqlValue::Double(n.to_f64())),
            SqlType::Char => Ok(SqlValue::Char(char_from_unit(n.to_i32() as i16 as u16))),
            SqlType::String => Ok(SqlValue::String(value.as_string())),
            SqlType::Timestamp => DateTime::from_timestamp_millis(n.to_i64())
                .map(SqlValue::Timestamp)
                .ok_or_else(|| Self::fail(member, value.type_name(), target)),
            SqlType::Date => DateTime::from_timestamp_millis(n.to_i64())
                .map(|t| SqlValue::Date(t.date_naive()))
                .ok_or_else(|| Self::fail(member, value.type_name(), target)),
            SqlType::Array(element) => Self::single_element(member, value, element),
            _ => Err(Self::fail(member, value.type_name(), target)),
        }
    }

    fn convert_char(member: &str, c: char, target: &SqlType) -> Result<SqlValue> {
        let code = c as u32;
        match target {
            SqlType::Bool => Ok(SqlValue::Bool(code != 0)),
            SqlType::Byte => Ok(SqlValue::Byte(code as i8)),
            SqlType::Short => Ok(SqlValue::Short(code as i16)),
            SqlType::Int => Ok(SqlValue::Int(code as i32)),
            SqlType::Long => Ok(SqlValue::Long(code as i64)),
            SqlType::Float => Ok(SqlValue::Float(code as f32)),
            SqlType::Double => Ok(SqlValue::Double(code as f64)),
            SqlType::String => Ok(SqlValue::String(c.to_string())),
            SqlType::Array(element) => Self::single_element(member, SqlValue::Char(c), element),
            _ => Err(Self::fail(member, "char", target)),
        }
    }

    fn convert_date(member: &str, d: NaiveDate, target: &SqlType) -> Result<SqlValue> {
        match target {
            SqlType::Long => epoch_millis_of_date(d)
                .map(SqlValue::Long)
                .ok_or_else(|| Self::fail(member, "date", target)),
            SqlType::String => Ok(SqlValue::String(d.format(DATE_FORMAT).to_string())),
            SqlType::Timestamp => d
                .and_hms_opt(0, 0, 0)
                .map(|midnight| SqlValue::Timestamp(midnight.and_utc()))
                .ok_or_else(|| Self::fail(member, "date", target)),
            SqlType::Array(element) => Self::single_element(member, SqlValue::Date(d), element),
            _ => Err(Self::fail(member, "date", target)),
        }
    }

    fn convert_timestamp(member: &str, t: DateTime<Utc>, target: &SqlType) -> Result<SqlValue> {
        match target {
            SqlType::Long => Ok(SqlValue::Long(t.timestamp_millis())),
            SqlType::String => Ok(SqlValue::String(t.format(TIMESTAMP_FORMAT).to_string())),
            SqlType::Date => Ok(SqlValue::Date(t.date_naive())),
            SqlType::Array(element) => {
                Self::single_element(member, SqlValue::Timestamp(t), element)
            }
            _ => Err(Self::fail(member, "timestamp", target)),
        }
    }

    fn convert_string(member: &str, s: String, target: &SqlType) -> Result<SqlValue> {
        match target {
            SqlType::Bool => Ok(SqlValue::Bool(lenient::parse_bool(&s))),
            SqlType::Byte => Ok(SqlValue::Byte(lenient::parse_i8(&s))),
            SqlType::Short => Ok(SqlValue::Short(lenient::parse_i16(&s))),
            SqlType::Int => Ok(SqlValue::Int(lenient::parse_i32(&s))),
            SqlType::Long => Ok(SqlValue::Long(lenient::parse_i64(&s))),
            SqlType::Float => Ok(SqlValue::Float(lenient::parse_f32(&s))),
            SqlType::Double => Ok(SqlValue::Double(lenient::parse_f64(&s))),
            SqlType::Char if s.chars().count() == 1 => {
                Ok(SqlValue::Char(lenient::parse_char(&s)))
            }
            SqlType::String => Ok(SqlValue::String(s)),
            SqlType::Enum(desc) => Ok(desc.lookup(&s).map_or(SqlValue::Null, SqlValue::Enum)),
            SqlType::Date => parse_date(&s)
                .map(SqlValue::Date)
                .ok_or_else(|| Self::fail(member, "string", target)),
            SqlType::Timestamp => parse_timestamp(&s)
                .map(SqlValue::Timestamp)
                .ok_or_else(|| Self::fail(member, "string", target)),
            SqlType::Array(element) => match **element {
                SqlType::Char => Ok(SqlValue::Chars(s.chars().collect())),
                SqlType::Byte => Ok(SqlValue::Bytes(s.into_bytes())),
                _ => Self::single_element(member, SqlValue::String(s), element),
            },
            _ => Err(Self::fail(member, "string", target)),
        }
    }
}
