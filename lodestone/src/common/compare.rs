use crate::collection::Document;
use crate::common::{
    Value, TYPE_ARRAY, TYPE_BINARY, TYPE_BOOLEAN, TYPE_CODE, TYPE_DATE, TYPE_NULL, TYPE_NUMBER,
    TYPE_OBJECT, TYPE_OBJECT_ID, TYPE_REGEX, TYPE_STRING,
};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use std::cmp::Ordering;

#[inline]
fn num_eq_float(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        true
    } else {
        a == b
    }
}

/// Compares two floats. `NaN` equals itself and sorts below every number.
#[inline]
fn num_cmp_float(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn numbers_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::I64(x), Value::I64(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => num_eq_float(x, y),
            _ => false,
        },
    }
}

fn numbers_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::I64(x), Value::I64(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => num_cmp_float(x, y),
            _ => Ordering::Equal,
        },
    }
}

/// Deep structural equality.
///
/// Numbers are equal across the integer and float variants. When
/// `key_order_sensitive` is set, embedded documents must also list their keys
/// in the same order.
pub fn values_equal(a: &Value, b: &Value, key_order_sensitive: bool) -> bool {
    if a.is_number() && b.is_number() {
        return numbers_equal(a, b);
    }

    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Binary(x), Value::Binary(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::ObjectId(x), Value::ObjectId(y)) => x == y,
        (Value::Regex(x), Value::Regex(y)) => x == y,
        (Value::Predicate(x), Value::Predicate(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|(l, r)| values_equal(l, r, key_order_sensitive))
        }
        (Value::Document(x), Value::Document(y)) => documents_equal(x, y, key_order_sensitive),
        _ => false,
    }
}

/// Deep equality of two documents. See [values_equal].
pub fn documents_equal(a: &Document, b: &Document, key_order_sensitive: bool) -> bool {
    if a.size() != b.size() {
        return false;
    }

    if key_order_sensitive {
        a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
            ka == kb && values_equal(va, vb, key_order_sensitive)
        })
    } else {
        a.iter().all(|(key, va)| match b.get(key) {
            Some(vb) => values_equal(va, vb, key_order_sensitive),
            None => false,
        })
    }
}

/// Position of a type code in the canonical cross type ordering.
///
/// `null < number < string < object < array < binary < object id < boolean < date < regexp`.
/// Code sorts after everything else.
pub fn type_order(type_code: i32) -> i32 {
    match type_code {
        TYPE_NULL => 0,
        TYPE_NUMBER => 1,
        TYPE_STRING => 2,
        TYPE_OBJECT => 3,
        TYPE_ARRAY => 4,
        TYPE_BINARY => 5,
        TYPE_OBJECT_ID => 6,
        TYPE_BOOLEAN => 7,
        TYPE_DATE => 8,
        TYPE_REGEX => 9,
        _ => 100,
    }
}

/// Total order over values, `undefined` (`None`) sorting below everything.
pub fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> LodestoneResult<Ordering> {
    match (a, b) {
        (None, None) => Ok(Ordering::Equal),
        (None, Some(_)) => Ok(Ordering::Less),
        (Some(_), None) => Ok(Ordering::Greater),
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Total order over values.
///
/// Values of different types compare by [type_order]. Within a type numbers
/// compare numerically, strings by UTF-16 code units, documents as the
/// flattened list of their key value pairs, arrays element by element,
/// binaries by length then bytes, and dates and object ids by their
/// primitive form.
///
/// # Errors
///
/// Regular expressions and predicates are not ordered; comparing two of them
/// is a `SortError`.
pub fn compare_values(a: &Value, b: &Value) -> LodestoneResult<Ordering> {
    let order_a = type_order(a.type_code());
    let order_b = type_order(b.type_code());
    if order_a != order_b {
        return Ok(order_a.cmp(&order_b));
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::String(x), Value::String(y)) => Ok(x.encode_utf16().cmp(y.encode_utf16())),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Ok(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Value::ObjectId(x), Value::ObjectId(y)) => Ok(x.as_bytes().cmp(y.as_bytes())),
        (Value::Binary(x), Value::Binary(y)) => Ok(x.len().cmp(&y.len()).then_with(|| x.cmp(y))),
        (Value::Array(x), Value::Array(y)) => compare_arrays(x, y),
        (Value::Document(x), Value::Document(y)) => compare_documents(x, y),
        (Value::Regex(_), Value::Regex(_)) => {
            log::error!("Sorting not supported on regular expression");
            Err(LodestoneError::new(
                "Sorting not supported on regular expression",
                ErrorKind::SortError,
            ))
        }
        (Value::Predicate(_), Value::Predicate(_)) => {
            log::error!("Sorting not supported on predicates");
            Err(LodestoneError::new(
                "Sorting not supported on predicates",
                ErrorKind::SortError,
            ))
        }
        _ if a.is_number() && b.is_number() => Ok(numbers_cmp(a, b)),
        _ => {
            log::error!("Missing type coercion comparing {} and {}", a, b);
            Err(LodestoneError::new(
                "Missing type coercion logic in compare",
                ErrorKind::InternalError,
            ))
        }
    }
}

fn compare_arrays(a: &[Value], b: &[Value]) -> LodestoneResult<Ordering> {
    for i in 0.. {
        if i == a.len() {
            return Ok(if i == b.len() {
                Ordering::Equal
            } else {
                Ordering::Less
            });
        }
        if i == b.len() {
            return Ok(Ordering::Greater);
        }
        let ordering = compare_values(&a[i], &b[i])?;
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}

// same result as comparing [k1, v1, k2, v2, ..] element by element
fn compare_documents(a: &Document, b: &Document) -> LodestoneResult<Ordering> {
    let mut left = a.iter();
    let mut right = b.iter();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ok(Ordering::Equal),
            (None, Some(_)) => return Ok(Ordering::Less),
            (Some(_), None) => return Ok(Ordering::Greater),
            (Some((ka, va)), Some((kb, vb))) => {
                let ordering = ka.encode_utf16().cmp(kb.encode_utf16());
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
                let ordering = compare_values(va, vb)?;
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
        }
    }
}
