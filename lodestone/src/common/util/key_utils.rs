/// Returns true when `key` is made only of ASCII digits, the form a path
/// segment must have to address an array position.
#[inline]
pub fn is_numeric_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// Parses a numeric path segment into an array position.
///
/// Segments too large for `usize` return `None`; callers treat them as an
/// index past the end of any array.
#[inline]
pub fn parse_array_index(key: &str) -> Option<usize> {
    if is_numeric_key(key) {
        key.parse::<usize>().ok()
    } else {
        None
    }
}
