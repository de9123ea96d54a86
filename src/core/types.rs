//! Target type descriptors and typed extraction
//!
//! [`SqlType`] names the kind a value is being converted into; the coercion
//! matrix in [`crate::core::convert`] dispatches on it. [`FromSqlValue`] ties a
//! Rust type to its descriptor and pulls the finished value back out.

use crate::core::error::{Result, SqlError};
use crate::core::value::{EnumValue, SqlValue};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Kind of value a conversion targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    /// Accepts every value unchanged
    Any,
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    Date,
    Timestamp,
    /// An enumeration, matched by symbolic name or ordinal
    Enum(EnumDescriptor),
    /// Sequence of the element type
    Array(Box<SqlType>),
    /// A registered record type, populated from named members
    Record(&'static str),
    /// Boxed form of the inner type: null stays null instead of becoming zero
    Nullable(Box<SqlType>),
}

/// Static description of an enumeration type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub type_name: &'static str,
    pub names: &'static [&'static str],
}

impl EnumDescriptor {
    /// Look up a variant by its symbolic name
    pub fn lookup(&self, name: &str) -> Option<EnumValue> {
        self.names
            .iter()
            .position(|candidate| *candidate == name)
            .map(|ordinal| EnumValue {
                type_name: self.type_name.to_string(),
                name: name.to_string(),
                ordinal,
            })
    }
}

impl SqlType {
    /// Whether null converts to a zero value rather than staying null
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            SqlType::Bool
                | SqlType::Byte
                | SqlType::Short
                | SqlType::Int
                | SqlType::Long
                | SqlType::Float
                | SqlType::Double
                | SqlType::Char
        )
    }

    /// Value that null converts to for this target
    pub fn zero_value(&self) -> SqlValue {
        match self {
            SqlType::Bool => SqlValue::Bool(false),
            SqlType::Byte => SqlValue::Byte(0),
            SqlType::Short => SqlValue::Short(0),
            SqlType::Int => SqlValue::Int(0),
            SqlType::Long => SqlValue::Long(0),
            SqlType::Float => SqlValue::Float(0.0),
            SqlType::Double => SqlValue::Double(0.0),
            SqlType::Char => SqlValue::Char('\0'),
            _ => SqlValue::Null,
        }
    }

    /// Element type when this target is sequence-shaped
    pub fn element_type(&self) -> Option<&SqlType> {
        match self {
            SqlType::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether a value already has this target's shape and can pass through unchanged
    pub fn accepts(&self, value: &SqlValue) -> bool {
        match (self, value) {
            (SqlType::Any, _) => true,
            (SqlType::Nullable(_), SqlValue::Null) => true,
            (SqlType::Nullable(inner), v) => inner.accepts(v),
            (SqlType::Bool, SqlValue::Bool(_))
            | (SqlType::Byte, SqlValue::Byte(_))
            | (SqlType::Short, SqlValue::Short(_))
            | (SqlType::Int, SqlValue::Int(_))
            | (SqlType::Long, SqlValue::Long(_))
            | (SqlType::Float, SqlValue::Float(_))
            | (SqlType::Double, SqlValue::Double(_))
            | (SqlType::Char, SqlValue::Char(_))
            | (SqlType::String, SqlValue::String(_))
            | (SqlType::Date, SqlValue::Date(_))
            | (SqlType::Timestamp, SqlValue::Timestamp(_)) => true,
            (SqlType::Enum(desc), SqlValue::Enum(v)) => v.type_name == desc.type_name,
            (SqlType::Array(inner), SqlValue::Bytes(_)) => **inner == SqlType::Byte,
            (SqlType::Array(inner), SqlValue::Chars(_)) => **inner == SqlType::Char,
            (SqlType::Array(inner), SqlValue::Array(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Any => write!(f, "any"),
            SqlType::Bool => write!(f, "bool"),
            SqlType::Byte => write!(f, "i8"),
            SqlType::Short => write!(f, "i16"),
            SqlType::Int => write!(f, "i32"),
            SqlType::Long => write!(f, "i64"),
            SqlType::Float => write!(f, "f32"),
            SqlType::Double => write!(f, "f64"),
            SqlType::Char => write!(f, "char"),
            SqlType::String => write!(f, "String"),
            SqlType::Date => write!(f, "NaiveDate"),
            SqlType::Timestamp => write!(f, "DateTime<Utc>"),
            SqlType::Enum(desc) => write!(f, "{}", desc.type_name),
            SqlType::Array(inner) => write!(f, "[{}]", inner),
            SqlType::Record(name) => write!(f, "{}", name),
            SqlType::Nullable(inner) => write!(f, "Option<{}>", inner),
        }
    }
}

/// A Rust type that query values can be converted into
///
/// `from_sql_value` receives a value that has already been run through the
/// coercion matrix against [`FromSqlValue::sql_type`], so it only has to
/// unwrap the matching variant. Use [`crate::TypeConverter::convert`] to do both
/// steps.
pub trait FromSqlValue: Sized {
    /// Target descriptor used to coerce raw values for this type
    fn sql_type() -> SqlType;

    /// Extract from a value already shaped for [`FromSqlValue::sql_type`]
    ///
    /// # Errors
    ///
    /// Returns `TypeConversion` if the value has a different shape.
    fn from_sql_value(member: &str, value: SqlValue) -> Result<Self>;
}

/// Error for a value whose shape does not match `T`
pub(crate) fn mismatch<T: FromSqlValue>(member: &str, value: &SqlValue) -> SqlError {
    SqlError::type_conversion(member, value.type_name(), &T::sql_type().to_string())
}

macro_rules! impl_scalar {
    ($($ty:ty => $sql:ident($variant:ident)),+ $(,)?) => {
        $(
            impl FromSqlValue for $ty {
                fn sql_type() -> SqlType {
                    SqlType::$sql
                }

                fn from_sql_value(member: &str, value: SqlValue) -> Result<Self> {
                    match value {
                        SqlValue::$variant(v) => Ok(v),
                        SqlValue::Null => Ok(<$ty>::default()),
                        other => Err(mismatch::<Self>(member, &other)),
                    }
                }
            }
        )+
    };
}

impl_scalar! {
    bool => Bool(Bool),
    i8 => Byte(Byte),
    i16 => Short(Short),
    i32 => Int(Int),
    i64 => Long(Long),
    f32 => Float(Float),
    f64 => Double(Double),
    char => Char(Char),
    String => String(String),
    NaiveDate => Date(Date),
    DateTime<Utc> => Timestamp(Timestamp),
}

impl FromSqlValue for u8 {
    fn sql_type() -> SqlType {
        SqlType::Byte
    }

    fn from_sql_value(member: &str, value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Byte(v) => Ok(v as u8),
            SqlValue::Null => Ok(0),
            other => Err(mismatch::<Self>(member, &other)),
        }
    }
}

impl FromSqlValue for SqlValue {
    fn sql_type() -> SqlType {
        SqlType::Any
    }

    fn from_sql_value(_member: &str, value: SqlValue) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn sql_type() -> SqlType {
        SqlType::Nullable(Box::new(T::sql_type()))
    }

    fn from_sql_value(member: &str, value: SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(member, other).map(Some),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Vec<T> {
    fn sql_type() -> SqlType {
        SqlType::Array(Box::new(T::sql_type()))
    }

    fn from_sql_value(member: &str, value: SqlValue) -> Result<Self> {
        let items: Vec<SqlValue> = match value {
            SqlValue::Null => return Ok(Vec::new()),
            SqlValue::Array(items) | SqlValue::List(items) => items,
            SqlValue::Bytes(bytes) => bytes.into_iter().map(|b| SqlValue::Byte(b as i8)).collect(),
            SqlValue::Chars(chars) => chars.into_iter().map(SqlValue::Char).collect(),
            other => return Err(mismatch::<Self>(member, &other)),
        };
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| T::from_sql_value(&format!("{}[{}]", member, i), item))
            .collect()
    }
}

/// An enumeration that converts to and from SQL values
///
/// Implement with [`sql_enum!`](crate::sql_enum) rather than by hand.
pub trait SqlEnum: Sized + Copy + 'static {
    /// Name of the enumeration type
    const TYPE_NAME: &'static str;
    /// Symbolic names in declaration order
    const NAMES: &'static [&'static str];

    /// Variant at the given declaration position
    fn from_ordinal(ordinal: usize) -> Option<Self>;

    /// Declaration position of this variant
    fn ordinal(self) -> usize;

    /// Symbolic name of this variant
    fn name(self) -> &'static str {
        Self::NAMES.get(self.ordinal()).copied().unwrap_or_default()
    }

    fn descriptor() -> EnumDescriptor {
        EnumDescriptor {
            type_name: Self::TYPE_NAME,
            names: Self::NAMES,
        }
    }

    fn to_sql_value(self) -> SqlValue {
        SqlValue::Enum(EnumValue {
            type_name: Self::TYPE_NAME.to_string(),
            name: self.name().to_string(),
            ordinal: self.ordinal(),
        })
    }
}

/// Typed extraction shared by every [`SqlEnum`]
///
/// Null means no variant matched; use `Option<E>` for members that may
/// legitimately hold an unknown name.
pub fn enum_from_value<E>(member: &str, value: SqlValue) -> Result<E>
where
    E: SqlEnum + FromSqlValue,
{
    match value {
        SqlValue::Enum(v) if v.type_name == E::TYPE_NAME => {
            E::from_ordinal(v.ordinal).ok_or_else(|| mismatch::<E>(member, &SqlValue::Enum(v)))
        }
        other => Err(mismatch::<E>(member, &other)),
    }
}

/// Declare an enumeration usable as a conversion target
///
/// The generated enum derives `Debug, Clone, Copy, PartialEq, Eq, Hash`.
///
/// ```
/// rust_sql_pool::sql_enum! {
///     pub enum Fruit { Apple, Banana, Durian }
/// }
/// ```
#[macro_export]
macro_rules! sql_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::SqlEnum for $name {
            const TYPE_NAME: &'static str = stringify!($name);
            const NAMES: &'static [&'static str] = &[$(stringify!($variant)),+];

            fn from_ordinal(ordinal: usize) -> Option<Self> {
                const VARIANTS: &[$name] = &[$($name::$variant),+];
                VARIANTS.get(ordinal).copied()
            }

            fn ordinal(self) -> usize {
                self as usize
            }
        }

        impl $crate::FromSqlValue for $name {
            fn sql_type() -> $crate::SqlType {
                $crate::SqlType::Enum(<$name as $crate::SqlEnum>::descriptor())
            }

            fn from_sql_value(member: &str, value: $crate::SqlValue) -> $crate::Result<Self> {
                $crate::core::types::enum_from_value(member, value)
            }
        }

        impl From<$name> for $crate::SqlValue {
            fn from(v: $name) -> Self {
                $crate::SqlEnum::to_sql_value(v)
            }
        }
    };
}

/// Make a [`Record`](crate::Record) usable as a nested member or sequence element
///
/// Key-value sources are applied to a fresh instance through the record's
/// profile.
#[macro_export]
macro_rules! impl_record_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::FromSqlValue for $ty {
                fn sql_type() -> $crate::SqlType {
                    $crate::SqlType::Record(::std::any::type_name::<$ty>())
                }

                fn from_sql_value(member: &str, value: $crate::SqlValue) -> $crate::Result<Self> {
                    match value {
                        $crate::SqlValue::Map(entries) => {
                            $crate::TypeProfile::<$ty>::get().populate(entries)
                        }
                        $crate::SqlValue::Null => Ok(<$ty as ::std::default::Default>::default()),
                        other => Err($crate::SqlError::type_conversion(
                            member,
                            other.type_name(),
                            ::std::any::type_name::<$ty>(),
                        )),
                    }
                }
            }
        )+
    };
}
