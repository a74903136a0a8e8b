use std::fmt;

use bytes::Bytes;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    #[error("cannot convert a {0} value to bytes")]
    NotBytes(&'static str),
    #[error("cannot convert a {0} value to an integer")]
    NotInteger(&'static str),
    #[error("string does not describe an integer")]
    InvalidInteger,
    #[error("cannot convert a {0} value to an array")]
    NotArray(&'static str),
    #[error("cannot convert a {0} value to an error")]
    NotError(&'static str),
}

/// A single piece of protocol data, either built by the caller to form a
/// command or decoded from a server response.
///
/// Strings and errors are raw byte sequences; the protocol makes no UTF-8
/// guarantee about them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Null,
    String(Bytes),
    Error(Bytes),
    Integer(i64),
    Array(Vec<Value>),
}

impl Value {
    /// Builds an error-variant value. Errors are string payloads under the
    /// hood but carry a distinct tag so callers can branch on them.
    pub fn error(bytes: impl Into<Bytes>) -> Value {
        Value::Error(bytes.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Error(_) => "error",
            Value::Integer(_) => "integer",
            Value::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Whether `as_integer` would succeed: either an `Integer`, or a
    /// `String`/`Error` whose payload satisfies the decimal grammar.
    pub fn is_integer(&self) -> bool {
        match self {
            Value::Integer(_) => true,
            Value::String(bytes) | Value::Error(bytes) => parse_i64(bytes).is_some(),
            _ => false,
        }
    }

    /// Returns the raw payload of a `String` or `Error` value.
    pub fn as_bytes(&self) -> Result<&[u8], Error> {
        match self {
            Value::String(bytes) | Value::Error(bytes) => Ok(bytes),
            value => Err(Error::NotBytes(value.type_name())),
        }
    }

    /// Returns the integer payload, coercing `String`/`Error` payloads that
    /// satisfy the decimal grammar.
    pub fn as_integer(&self) -> Result<i64, Error> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::String(bytes) | Value::Error(bytes) => {
                parse_i64(bytes).ok_or(Error::InvalidInteger)
            }
            value => Err(Error::NotInteger(value.type_name())),
        }
    }

    pub fn as_array(&self) -> Result<&[Value], Error> {
        match self {
            Value::Array(values) => Ok(values),
            value => Err(Error::NotArray(value.type_name())),
        }
    }

    /// Returns the payload of an `Error` value only; a plain `String` is
    /// rejected even though both carry bytes.
    pub fn as_error(&self) -> Result<&[u8], Error> {
        match self {
            Value::Error(bytes) => Ok(bytes),
            value => Err(Error::NotError(value.type_name())),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Bytes::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::String(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::String(Bytes::from(bytes))
    }
}

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Value::String(bytes)
    }
}

impl From<i64> for Value {
    fn from(integer: i64) -> Self {
        Value::Integer(integer)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "(nil)"),
            Value::String(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Value::Error(bytes) => write!(f, "(error) {}", String::from_utf8_lossy(bytes)),
            Value::Integer(i) => write!(f, "(integer) {}", i),
            Value::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            Value::Array(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Parses a decimal integer with the protocol's lenient grammar: optional
/// whitespace, an optional sign (which may itself be separated from the
/// digits by whitespace), one or more digits, optional trailing whitespace.
/// A digit after trailing whitespace has started invalidates the parse.
///
/// Accumulation deliberately wraps on overlong digit runs instead of
/// erroring; the grammar predates any overflow handling.
pub(crate) fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let mut i = 0;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let mut negative = false;
    match bytes.get(i) {
        Some(b'-') => {
            negative = true;
            i += 1;
        }
        Some(b'+') => i += 1,
        _ => {}
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let mut value: i64 = 0;
    let mut seen_digit = false;
    let mut trailing = false;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte.is_ascii_digit() {
            if trailing {
                return None;
            }
            value = value.wrapping_mul(10).wrapping_add((byte - b'0') as i64);
            seen_digit = true;
        } else if byte.is_ascii_whitespace() {
            trailing = true;
        } else {
            return None;
        }
        i += 1;
    }

    if !seen_digit {
        return None;
    }
    Some(if negative { value.wrapping_neg() } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(input: &str, expected: i64) {
        assert_eq!(parse_i64(input.as_bytes()), Some(expected), "input {:?}", input);
    }

    fn invalid(input: &str) {
        assert_eq!(parse_i64(input.as_bytes()), None, "input {:?}", input);
    }

    #[test]
    fn parse_i64_plain() {
        valid("123", 123);
        valid("1234", 1234);
        valid("0", 0);
    }

    #[test]
    fn parse_i64_signed() {
        valid("+123", 123);
        valid("+0", 0);
        valid("-123", -123);
        valid("-1234", -1234);
        valid("-0", 0);
    }

    #[test]
    fn parse_i64_surrounding_whitespace() {
        valid(" 123", 123);
        valid("     -123", -123);
        valid("123 ", 123);
        valid("-123     ", -123);
        valid("     123     ", 123);
        valid("     -123     ", -123);
    }

    #[test]
    fn parse_i64_whitespace_between_sign_and_digits() {
        valid(" + 123", 123);
        valid(" - 123", -123);
        valid("     +   123", 123);
        valid("-   123     ", -123);
        valid("     + 123 ", 123);
        valid("     -   123     ", -123);
    }

    #[test]
    fn parse_i64_invalid() {
        invalid("");
        invalid(" ");
        invalid("+");
        invalid("-");
        invalid("++0");
        invalid("--1");
        invalid("+-1");
        invalid("-+1");
        invalid("1 2 3");
        invalid(" 1 2 3 ");
        invalid("hello");
        invalid("five");
        invalid("0x123");
        invalid("0b101010");
        invalid("1-");
        invalid("1+");
    }

    #[test]
    fn parse_i64_wraps_on_overlong_digit_runs() {
        // No overflow guard: the accumulator wraps rather than failing.
        assert!(parse_i64(b"12345678910111213141516").is_some());
        assert!(parse_i64(b"-12345678910111213141516").is_some());
    }

    #[test]
    fn integer_coercion_from_string() {
        assert_eq!(Value::from("123").as_integer(), Ok(123));
        assert_eq!(Value::from(" + 123 ").as_integer(), Ok(123));
        assert_eq!(Value::error("-42").as_integer(), Ok(-42));
        assert_eq!(Value::from("1 2 3").as_integer(), Err(Error::InvalidInteger));
        assert_eq!(Value::Null.as_integer(), Err(Error::NotInteger("null")));
    }

    #[test]
    fn is_integer_checks_convertibility() {
        assert!(Value::Integer(7).is_integer());
        assert!(Value::from("1234").is_integer());
        assert!(Value::error("1234").is_integer());
        assert!(!Value::from("12a34").is_integer());
        assert!(!Value::Null.is_integer());
        assert!(!Value::Array(vec![]).is_integer());
    }

    #[test]
    fn accessors_reject_mismatched_variants() {
        assert_eq!(Value::Integer(1).as_bytes(), Err(Error::NotBytes("integer")));
        assert_eq!(Value::from("x").as_array(), Err(Error::NotArray("string")));
        assert_eq!(Value::from("x").as_error(), Err(Error::NotError("string")));
        assert_eq!(Value::error("boom").as_error(), Ok(&b"boom"[..]));
        assert_eq!(Value::from("ok").as_bytes(), Ok(&b"ok"[..]));
    }

    #[test]
    fn equality_is_variant_aware() {
        assert_ne!(Value::Integer(5), Value::from("5"));
        assert_ne!(Value::from("oops"), Value::error("oops"));
        assert_eq!(Value::from("abc"), Value::from("abc"));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn array_equality_is_order_sensitive() {
        let a = Value::Array(vec![Value::from("a"), Value::from("b")]);
        let b = Value::Array(vec![Value::from("a"), Value::from("b")]);
        let reversed = Value::Array(vec![Value::from("b"), Value::from("a")]);
        let shorter = Value::Array(vec![Value::from("a")]);

        assert_eq!(a, b);
        assert_ne!(a, reversed);
        assert_ne!(a, shorter);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(Value::Null.to_string(), "(nil)");
        assert_eq!(Value::from("hi").to_string(), "\"hi\"");
        assert_eq!(Value::error("ERR nope").to_string(), "(error) ERR nope");
        assert_eq!(Value::Integer(-3).to_string(), "(integer) -3");
        assert_eq!(
            Value::Array(vec![Value::from("a"), Value::Integer(1)]).to_string(),
            "1) \"a\"\n2) (integer) 1"
        );
    }
}
