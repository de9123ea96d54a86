//! Best-effort text parsing
//!
//! These functions never fail. Malformed input yields the type's zero value
//! (`false`, `0`, `0.0`, `'\0'`), which is what the coercion matrix relies on
//! when it turns text columns into numbers.

use std::str::FromStr;

fn parse_or_zero<T: FromStr + Default>(s: &str) -> T {
    s.parse().unwrap_or_default()
}

/// `true` iff the text is `"true"` in any letter case.
pub fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

/// Parse an `i8`, or `0` if malformed.
pub fn parse_i8(s: &str) -> i8 {
    parse_or_zero(s)
}

/// Parse an `i16`, or `0` if malformed.
pub fn parse_i16(s: &str) -> i16 {
    parse_or_zero(s)
}

/// Parse an `i32`, or `0` if malformed.
pub fn parse_i32(s: &str) -> i32 {
    parse_or_zero(s)
}

/// Parse an `i64`, or `0` if malformed.
pub fn parse_i64(s: &str) -> i64 {
    parse_or_zero(s)
}

/// Parse an `f32`, or `0.0` if malformed. Surrounding whitespace is ignored.
pub fn parse_f32(s: &str) -> f32 {
    parse_or_zero(s.trim())
}

/// Parse an `f64`, or `0.0` if malformed. Surrounding whitespace is ignored.
pub fn parse_f64(s: &str) -> f64 {
    parse_or_zero(s.trim())
}

/// First character of the text, or `'\0'` if empty.
pub fn parse_char(s: &str) -> char {
    s.chars().next().unwrap_or('\0')
}
