use crate::collection::{Document, ObjectId};
use crate::common::values_equal;
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Type code of numbers.
pub const TYPE_NUMBER: i32 = 1;
/// Type code of strings.
pub const TYPE_STRING: i32 = 2;
/// Type code of embedded documents.
pub const TYPE_OBJECT: i32 = 3;
/// Type code of arrays.
pub const TYPE_ARRAY: i32 = 4;
/// Type code of binary blobs.
pub const TYPE_BINARY: i32 = 5;
/// Type code of object ids.
pub const TYPE_OBJECT_ID: i32 = 7;
/// Type code of booleans.
pub const TYPE_BOOLEAN: i32 = 8;
/// Type code of dates.
pub const TYPE_DATE: i32 = 9;
/// Type code of null.
pub const TYPE_NULL: i32 = 10;
/// Type code of regular expressions.
pub const TYPE_REGEX: i32 = 11;
/// Type code of code (document predicates).
pub const TYPE_CODE: i32 = 13;

/// Shared `null`, handed out by lookups that need to default to null
/// without allocating.
pub(crate) static NULL_VALUE: Value = Value::Null;

/// Represents a [Document] value.
///
/// # Variants
/// - Null: Absence of a value
/// - Bool(bool): Boolean true/false
/// - I64(i64) / F64(f64): Numbers. Both variants share one type code and
///   compare numerically with each other
/// - String(String): Text value
/// - Binary(Vec<u8>): Opaque binary blob
/// - Date(DateTime<Utc>): A point in time
/// - ObjectId(ObjectId): 12 byte object identifier
/// - Array(Vec<Value>): Ordered sequence of values
/// - Document(Document): Nested, insertion-ordered mapping
/// - Regex(RegexValue): A regular expression, used mostly inside selectors
/// - Predicate(DocumentPredicate): A native predicate, usable as a `$where` clause
///
/// # Usage
/// ```text
/// let v1: Value = 42.into();
/// let v2 = Value::from("hello");
/// let v3 = val!(true);
/// let doc = doc! { age: 42, name: "Alice" };
/// ```
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
    Date(DateTime<Utc>),
    ObjectId(ObjectId),
    Array(Vec<Value>),
    Document(Document),
    Regex(RegexValue),
    Predicate(DocumentPredicate),
}

impl Value {
    /// Creates a binary value from raw bytes.
    pub fn binary(bytes: Vec<u8>) -> Value {
        Value::Binary(bytes)
    }

    /// Creates a regular expression value.
    ///
    /// # Errors
    ///
    /// Returns a `SelectorError` if the pattern does not compile or the flags
    /// contain anything other than `i`, `m`, `g`, `s` or `x`.
    pub fn regex(pattern: &str, flags: &str) -> LodestoneResult<Value> {
        Ok(Value::Regex(RegexValue::new(pattern, flags)?))
    }

    /// Wraps a native predicate so it can be placed in a selector, either as
    /// the whole selector or as the operand of `$where`.
    pub fn predicate<F>(f: F) -> Value
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        Value::Predicate(DocumentPredicate::new(f))
    }

    /// Returns the BSON-like type code of this value.
    pub fn type_code(&self) -> i32 {
        match self {
            Value::Null => TYPE_NULL,
            Value::Bool(_) => TYPE_BOOLEAN,
            Value::I64(_) | Value::F64(_) => TYPE_NUMBER,
            Value::String(_) => TYPE_STRING,
            Value::Binary(_) => TYPE_BINARY,
            Value::Date(_) => TYPE_DATE,
            Value::ObjectId(_) => TYPE_OBJECT_ID,
            Value::Array(_) => TYPE_ARRAY,
            Value::Document(_) => TYPE_OBJECT,
            Value::Regex(_) => TYPE_REGEX,
            Value::Predicate(_) => TYPE_CODE,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::I64(_) | Value::F64(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Value::Document(_))
    }

    /// Returns true for values a dotted path can descend into.
    pub fn is_indexable(&self) -> bool {
        matches!(self, Value::Document(_) | Value::Array(_))
    }

    /// Returns true for every value that is not a plain scalar: documents,
    /// arrays, dates, binaries, object ids, regular expressions and predicates.
    pub fn is_object_like(&self) -> bool {
        !matches!(
            self,
            Value::Null | Value::Bool(_) | Value::I64(_) | Value::F64(_) | Value::String(_)
        )
    }

    /// Truthiness as used by selector and projection options: `null`,
    /// `false`, `0`, `NaN` and the empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I64(i) => *i != 0,
            Value::F64(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns any number as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(i) => Some(*i as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Value::ObjectId(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_regex(&self) -> Option<&RegexValue> {
        match self {
            Value::Regex(r) => Some(r),
            _ => None,
        }
    }

    /// Moves the value out, leaving `Null` behind.
    pub fn take(&mut self) -> Value {
        std::mem::replace(self, Value::Null)
    }
}

impl PartialEq for Value {
    /// Deep equality that ignores the key order of embedded documents.
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other, false)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// A compiled regular expression that remembers its source and flags.
///
/// Supported flags are `i` (case insensitive), `m` (multi line), `s` (dot
/// matches new line), `x` (extended) and `g`, which is accepted and ignored
/// since matching here never keeps state between calls.
#[derive(Clone)]
pub struct RegexValue {
    pattern: String,
    flags: String,
    regex: Regex,
}

impl RegexValue {
    pub fn new(pattern: &str, flags: &str) -> LodestoneResult<RegexValue> {
        let mut normalized: Vec<char> = Vec::with_capacity(flags.len());
        for flag in flags.chars() {
            if !matches!(flag, 'g' | 'i' | 'm' | 's' | 'x') {
                log::error!("Invalid regular expression flag '{}' in /{}/{}", flag, pattern, flags);
                return Err(LodestoneError::new(
                    &format!("Invalid regular expression flag '{}'", flag),
                    ErrorKind::SelectorError,
                ));
            }
            if !normalized.contains(&flag) {
                normalized.push(flag);
            }
        }
        normalized.sort_unstable();
        let flags: String = normalized.into_iter().collect();

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .build()
            .map_err(|e| {
                log::error!("Invalid regular expression /{}/: {}", pattern, e);
                LodestoneError::new(
                    &format!("Invalid regular expression /{}/: {}", pattern, e),
                    ErrorKind::SelectorError,
                )
            })?;

        Ok(RegexValue {
            pattern: pattern.to_string(),
            flags,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn ignore_case(&self) -> bool {
        self.flags.contains('i')
    }

    pub fn multiline(&self) -> bool {
        self.flags.contains('m')
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for RegexValue {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.flags == other.flags
    }
}

impl Display for RegexValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.flags)
    }
}

impl Debug for RegexValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.flags)
    }
}

/// A native predicate over whole documents.
///
/// Predicates compare equal only to clones of themselves and cannot be
/// ordered.
#[derive(Clone)]
pub struct DocumentPredicate {
    inner: Arc<dyn Fn(&Document) -> bool + Send + Sync>,
}

impl DocumentPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        DocumentPredicate { inner: Arc::new(f) }
    }

    pub fn test(&self, doc: &Document) -> bool {
        (self.inner)(doc)
    }
}

impl PartialEq for DocumentPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for DocumentPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[predicate]")
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::I64(value as i64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::I64(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Value::I64(v),
            Err(_) => Value::F64(value as f64),
        }
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(v) => Value::I64(v),
            Err(_) => Value::F64(value as f64),
        }
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F64(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::ObjectId(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<RegexValue> for Value {
    fn from(value: RegexValue) -> Self {
        Value::Regex(value)
    }
}

impl From<DocumentPredicate> for Value {
    fn from(value: DocumentPredicate) -> Self {
        Value::Predicate(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(|v| v.into()).collect())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

/// A macro to create a `Value` from a given expression.
///
/// # Examples
///
/// ```rust
/// use lodestone::common::Value;
/// use lodestone::val;
///
/// assert_eq!(val!(42), Value::I64(42));
/// assert_eq!(val!("hello"), Value::String("hello".to_string()));
/// assert_eq!(val!(true), Value::Bool(true));
/// ```
#[macro_export]
macro_rules! val {
    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
