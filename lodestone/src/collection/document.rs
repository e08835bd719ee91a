use crate::common::{documents_equal, Value, DOC_ID};
use indexmap::IndexMap;
use std::fmt::{Debug, Display};

/// Represents a document stored in a [crate::collection::Collection].
///
/// A document is an insertion ordered mapping from [String] keys to
/// [Value]s. Keys are plain field names; dotted paths are resolved by the
/// query, sort and modifier engines rather than by the document itself.
///
/// Stored documents always carry an `_id` field. It is assigned on insert
/// when missing and never changes afterwards.
///
/// Equality ignores key order. Use [crate::common::documents_equal] with
/// `key_order_sensitive` set when order matters.
#[derive(Clone, Default)]
pub struct Document {
    data: IndexMap<String, Value>,
}

impl Document {
    /// Creates a new empty document.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let doc = Document::new();
    /// assert!(doc.is_empty());
    /// assert_eq!(doc.size(), 0);
    /// ```
    pub fn new() -> Self {
        Document {
            data: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Associates the value with the key. An existing key keeps its position
    /// and has its value replaced; a new key is appended.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut doc = Document::new();
    /// doc.put("name", "Alice");
    /// doc.put("age", 30);
    /// assert_eq!(doc.size(), 2);
    /// ```
    pub fn put<K: Into<String>, T: Into<Value>>(&mut self, key: K, value: T) {
        self.data.insert(key.into(), value.into());
    }

    /// Places the key first, moving it there if it already exists.
    pub fn put_first<K: Into<String>, T: Into<Value>>(&mut self, key: K, value: T) {
        self.data.shift_insert(0, key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Removes the key, preserving the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the `_id` field, if present.
    pub fn id(&self) -> Option<&Value> {
        self.data.get(DOC_ID)
    }

    pub fn has_id(&self) -> bool {
        self.data.contains_key(DOC_ID)
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Value> {
        self.data.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, Value> {
        self.data.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, String, Value> {
        self.data.iter_mut()
    }

    pub fn clear(&mut self) {
        self.data.clear()
    }

    /// Returns the key names in insertion order.
    pub fn fields(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        documents_equal(self, other, false)
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

/// Strips the quotes `stringify!` leaves around string literal keys.
pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] with JSON-like syntax.
///
/// Keys are identifiers or string literals (use literals for `$` operators
/// and dotted paths). Values are literals, nested `{}` documents, `[]`
/// arrays, or any expression in parentheses. `()` is `null`.
///
/// # Examples
///
/// ```rust
/// use lodestone::doc;
///
/// let empty = doc!{};
///
/// let simple = doc!{
///     name: "Alice",
///     age: 30
/// };
///
/// let base = 100;
/// let with_expr = doc!{
///     score: (base * 2),
///     delta: (-1)
/// };
///
/// let modifier = doc!{
///     "$set": { "address.city": "Paris" },
///     "$push": { tags: { "$each": ["a", "b"], "$slice": (-2) } }
/// };
/// ```
#[macro_export]
macro_rules! doc {
    ({}) => {
        $crate::collection::Document::new()
    };

    () => {
        $crate::collection::Document::new()
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::collection::Document::new();
            $(
                doc.put($crate::collection::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Helper macro to convert values for the doc! macro.
/// Handles nested documents, arrays, and expressions.
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
        }
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::documents_equal;
    use crate::val;

    fn set_up() -> Document {
        doc! {
            _id: "a1",
            score: 1034,
            location: {
                state: "NY",
                address: {
                    house: ["1", "2", "3"],
                    zip: 10001,
                },
            },
            obj_array: [
                { value: 1 },
                { value: 2 },
            ],
            missing: (),
            "$quoted": (-5),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("\"ABC\""), "ABC");
        assert_eq!(normalize("ABC"), "ABC");
    }

    #[test]
    fn test_macro_builds_nested_values() {
        let doc = set_up();
        assert_eq!(doc.size(), 6);
        assert_eq!(doc.id(), Some(&val!("a1")));
        assert_eq!(doc.get("missing"), Some(&Value::Null));
        assert_eq!(doc.get("$quoted"), Some(&val!(-5)));
        let location = doc.get("location").and_then(|v| v.as_document()).unwrap();
        let address = location.get("address").and_then(|v| v.as_document()).unwrap();
        assert_eq!(address.get("zip"), Some(&val!(10001)));
        assert_eq!(
            doc.get("obj_array"),
            Some(&Value::Array(vec![val!(doc! { value: 1 }), val!(doc! { value: 2 })]))
        );
    }

    #[test]
    fn test_put_keeps_position_of_existing_key() {
        let mut doc = doc! { a: 1, b: 2, c: 3 };
        doc.put("b", 20);
        assert_eq!(doc.fields(), vec!["a", "b", "c"]);
        assert_eq!(doc.get("b"), Some(&val!(20)));
    }

    #[test]
    fn test_put_first() {
        let mut doc = doc! { a: 1, b: 2 };
        doc.put_first("_id", "x");
        assert_eq!(doc.fields(), vec!["_id", "a", "b"]);
        doc.put_first("b", 5);
        assert_eq!(doc.fields(), vec!["b", "_id", "a"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut doc = doc! { a: 1, b: 2, c: 3 };
        assert_eq!(doc.remove("b"), Some(val!(2)));
        assert_eq!(doc.remove("zz"), None);
        assert_eq!(doc.fields(), vec!["a", "c"]);
    }

    #[test]
    fn test_equality_ignores_key_order() {
        let a = doc! { x: 1, y: 2 };
        let b = doc! { y: 2, x: 1 };
        assert_eq!(a, b);
        assert!(!documents_equal(&a, &b, true));
    }

    #[test]
    fn test_collect_and_iterate() {
        let doc: Document = vec![("k".to_string(), val!(1)), ("j".to_string(), val!(2))]
            .into_iter()
            .collect();
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["k", "j"]);
        let total: i64 = (&doc).into_iter().filter_map(|(_, v)| v.as_i64()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_display() {
        let doc = doc! { a: 1, b: "x" };
        assert_eq!(doc.to_string(), r#"{"a":1,"b":"x"}"#);
    }
}
