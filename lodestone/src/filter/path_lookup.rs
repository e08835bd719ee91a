use crate::collection::Document;
use crate::common::{is_numeric_key, parse_array_index, Value};
use smallvec::SmallVec;
use std::fmt::{Debug, Display};

/// One step recorded while walking a path through arrays.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArrayIndex {
    /// The array position that was taken.
    Position(usize),
    /// Marks the preceding position as an explicit numeric path segment
    /// rather than implicit branching over the array.
    Explicit,
}

/// Array positions taken to reach a value. Empty means none were taken.
pub type ArrayIndices = SmallVec<[ArrayIndex; 4]>;

/// Returns the first [ArrayIndex::Position] in the list, if any.
pub fn first_position(indices: &ArrayIndices) -> Option<usize> {
    indices.iter().find_map(|index| match index {
        ArrayIndex::Position(i) => Some(*i),
        ArrayIndex::Explicit => None,
    })
}

/// One of possibly several values found at a dotted path.
///
/// `value` is `None` when the path ends in a missing field.
#[derive(Clone, Debug)]
pub struct Branch<'a> {
    pub value: Option<&'a Value>,
    pub array_indices: ArrayIndices,
    pub dont_iterate: bool,
}

impl<'a> Branch<'a> {
    pub fn new(value: Option<&'a Value>) -> Self {
        Branch {
            value,
            array_indices: ArrayIndices::new(),
            dont_iterate: false,
        }
    }
}

#[derive(Clone, Copy)]
enum Indexable<'a> {
    Object(&'a Document),
    Array(&'a [Value]),
    Nothing,
}

impl<'a> Indexable<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::Document(doc) => Indexable::Object(doc),
            Value::Array(items) => Indexable::Array(items),
            _ => Indexable::Nothing,
        }
    }
}

/// A compiled dotted field path.
///
/// Looking a path up returns every value reachable through it. Arrays met in
/// the middle of the path are branched over: each embedded document element
/// continues the walk, and a numeric segment may also index the array
/// directly. The array found at the last segment is returned whole.
///
/// ```text
/// {a: [{b: 1}, {b: [2, 3]}]}  lookup "a.b"  =>  1 @ [0], [2, 3] @ [1]
/// {a: [[5], 6]}                lookup "a.0"  =>  [5] @ [0, x] (dont_iterate)
/// {a: 5}                       lookup "a.b"  =>  undefined
/// {a: [5]}                     lookup "a.0.b" => nothing
/// ```
#[derive(Clone)]
pub struct PathLookup {
    path: String,
    parts: Vec<String>,
    for_sort: bool,
}

impl PathLookup {
    pub fn new(path: &str) -> Self {
        PathLookup {
            path: path.to_string(),
            parts: path.split('.').map(|s| s.to_string()).collect(),
            for_sort: false,
        }
    }

    /// A lookup used to build sort keys. It never branches implicitly over a
    /// top-level array when the second segment is numeric. Deeper arrays
    /// branch as usual.
    pub fn for_sort(path: &str) -> Self {
        PathLookup {
            for_sort: true,
            ..PathLookup::new(path)
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lookup<'a>(&self, doc: &'a Document) -> Vec<Branch<'a>> {
        self.lookup_in(0, Indexable::Object(doc), &ArrayIndices::new())
    }

    /// Looks the path up starting from any value. Scalars yield a single
    /// missing branch.
    pub fn lookup_value<'a>(&self, root: &'a Value) -> Vec<Branch<'a>> {
        self.lookup_in(0, Indexable::of(root), &ArrayIndices::new())
    }

    fn lookup_in<'a>(
        &self,
        depth: usize,
        target: Indexable<'a>,
        indices: &ArrayIndices,
    ) -> Vec<Branch<'a>> {
        let part = self.parts[depth].as_str();
        let mut indices = indices.clone();

        let (first_level, from_array) = match target {
            Indexable::Array(items) => match parse_array_index(part) {
                Some(i) if i < items.len() => {
                    indices.push(ArrayIndex::Position(i));
                    indices.push(ArrayIndex::Explicit);
                    (Some(&items[i]), true)
                }
                // an invalid array access yields nothing, not undefined
                _ => return Vec::new(),
            },
            Indexable::Object(doc) => (doc.get(part), false),
            Indexable::Nothing => (None, false),
        };

        if depth + 1 == self.parts.len() {
            let dont_iterate = from_array && matches!(first_level, Some(Value::Array(_)));
            return vec![Branch {
                value: first_level,
                array_indices: indices,
                dont_iterate,
            }];
        }

        let next = match first_level {
            Some(value) if value.is_indexable() => Indexable::of(value),
            _ => {
                if from_array {
                    return Vec::new();
                }
                return vec![Branch {
                    value: None,
                    array_indices: indices,
                    dont_iterate: false,
                }];
            }
        };

        let mut result = self.lookup_in(depth + 1, next, &indices);

        if let Some(Value::Array(items)) = first_level {
            if !(self.for_sort && depth == 0 && is_numeric_key(&self.parts[depth + 1])) {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Document(element) = item {
                        let mut element_indices = indices.clone();
                        element_indices.push(ArrayIndex::Position(i));
                        result.extend(self.lookup_in(
                            depth + 1,
                            Indexable::Object(element),
                            &element_indices,
                        ));
                    }
                }
            }
        }

        result
    }
}

impl Display for PathLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl Debug for PathLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PathLookup({})", self.path)
    }
}

/// Adds one branch per element for every branch holding an array.
///
/// The array branch itself is kept unless `skip_the_arrays` is set. Arrays
/// marked `dont_iterate` are never expanded and always kept.
pub fn expand_arrays_in_branches<'a>(
    branches: &[Branch<'a>],
    skip_the_arrays: bool,
) -> Vec<Branch<'a>> {
    let mut out = Vec::with_capacity(branches.len());
    for branch in branches {
        let items = match branch.value {
            Some(Value::Array(items)) if !branch.dont_iterate => Some(items),
            _ => None,
        };

        if !(skip_the_arrays && items.is_some()) {
            out.push(Branch {
                value: branch.value,
                array_indices: branch.array_indices.clone(),
                dont_iterate: false,
            });
        }

        if let Some(items) = items {
            for (i, item) in items.iter().enumerate() {
                let mut indices = branch.array_indices.clone();
                indices.push(ArrayIndex::Position(i));
                out.push(Branch {
                    value: Some(item),
                    array_indices: indices,
                    dont_iterate: false,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};
    use smallvec::smallvec;
    use ArrayIndex::{Explicit, Position};

    fn values<'a>(branches: &[Branch<'a>]) -> Vec<Option<Value>> {
        branches.iter().map(|b| b.value.cloned()).collect()
    }

    #[test]
    fn simple_field() {
        let doc = doc! { a: 1 };
        let branches = PathLookup::new("a").lookup(&doc);
        assert_eq!(values(&branches), vec![Some(val!(1))]);
        assert!(branches[0].array_indices.is_empty());
    }

    #[test]
    fn missing_field_is_undefined() {
        let doc = doc! { a: 1 };
        let branches = PathLookup::new("b").lookup(&doc);
        assert_eq!(values(&branches), vec![None]);
        let branches = PathLookup::new("a.b").lookup(&doc);
        assert_eq!(values(&branches), vec![None]);
    }

    #[test]
    fn branches_over_documents_in_arrays() {
        let doc = doc! { a: [{ b: 1 }, { b: [2, 3] }, 4] };
        let branches = PathLookup::new("a.b").lookup(&doc);
        assert_eq!(values(&branches), vec![Some(val!(1)), Some(val!(vec![2, 3]))]);
        let expected_first: ArrayIndices = smallvec![Position(0)];
        let expected_second: ArrayIndices = smallvec![Position(1)];
        assert_eq!(branches[0].array_indices, expected_first);
        assert_eq!(branches[1].array_indices, expected_second);
        assert!(!branches[1].dont_iterate);
    }

    #[test]
    fn explicit_index_marks_dont_iterate_on_arrays() {
        let doc = doc! { a: [[5], 6] };
        let branches = PathLookup::new("a.0").lookup(&doc);
        assert_eq!(values(&branches), vec![Some(val!(vec![5]))]);
        assert!(branches[0].dont_iterate);
        let expected: ArrayIndices = smallvec![Position(0), Explicit];
        assert_eq!(branches[0].array_indices, expected);

        let branches = PathLookup::new("a.1").lookup(&doc);
        assert_eq!(values(&branches), vec![Some(val!(6))]);
        assert!(!branches[0].dont_iterate);
    }

    #[test]
    fn invalid_array_access_yields_nothing() {
        let doc = doc! { a: [5] };
        assert!(PathLookup::new("a.0.b").lookup(&doc).is_empty());
        assert!(PathLookup::new("a.7").lookup(&doc).is_empty());
        assert!(PathLookup::new("a.b").lookup(&doc).is_empty());
    }

    #[test]
    fn numeric_segment_both_indexes_and_branches() {
        let doc = doc! { a: [{ "0": "x" }, { "0": "y" }] };
        let branches = PathLookup::new("a.0").lookup(&doc);
        // a.0 as explicit index returns the first element whole
        assert_eq!(values(&branches)[0], Some(val!(doc! { "0": "x" })));

        let doc = doc! { a: [{ b: [{ "1": "deep" }, "z"] }] };
        let branches = PathLookup::new("a.b.1").lookup(&doc);
        assert_eq!(values(&branches), vec![Some(val!("z")), Some(val!("deep"))]);
    }

    #[test]
    fn sort_lookup_does_not_branch_before_numeric_segment() {
        let doc = doc! { a: [{ "0": "inner" }, "outer"] };
        let plain = PathLookup::new("a.0.0").lookup(&doc);
        let sort = PathLookup::for_sort("a.0.0").lookup(&doc);
        assert!(plain.len() >= sort.len());
        let doc = doc! { a: [{ "1": "k" }, "v"] };
        assert_eq!(values(&PathLookup::for_sort("a.1").lookup(&doc)), vec![Some(val!("v"))]);
        assert_eq!(
            values(&PathLookup::new("a.1").lookup(&doc)),
            vec![Some(val!("v")), Some(val!("k"))]
        );
    }

    #[test]
    fn sort_lookup_branches_over_nested_arrays() {
        let doc = doc! { a: { b: [{ "0": 5 }, 7] } };
        let branches = PathLookup::for_sort("a.b.0").lookup(&doc);
        assert_eq!(
            values(&branches),
            vec![Some(val!(doc! { "0": 5 })), Some(val!(5))]
        );
        let explicit: ArrayIndices = smallvec![Position(0), Explicit];
        let element: ArrayIndices = smallvec![Position(0)];
        assert_eq!(branches[0].array_indices, explicit);
        assert_eq!(branches[1].array_indices, element);

        // matches the non-sort lookup once past the first level
        assert_eq!(values(&PathLookup::new("a.b.0").lookup(&doc)), values(&branches));
    }

    #[test]
    fn expand_arrays() {
        let doc = doc! { a: [1, [2]] };
        let branches = PathLookup::new("a").lookup(&doc);
        let expanded = expand_arrays_in_branches(&branches, false);
        assert_eq!(
            values(&expanded),
            vec![Some(val!(vec![val!(1), val!(vec![2])])), Some(val!(1)), Some(val!(vec![2]))]
        );
        let expanded = expand_arrays_in_branches(&branches, true);
        assert_eq!(values(&expanded), vec![Some(val!(1)), Some(val!(vec![2]))]);
        let expected: ArrayIndices = smallvec![Position(1)];
        assert_eq!(expanded[1].array_indices, expected);
    }

    #[test]
    fn expand_keeps_dont_iterate_arrays_whole() {
        let doc = doc! { a: [[1, 2]] };
        let branches = PathLookup::new("a.0").lookup(&doc);
        let expanded = expand_arrays_in_branches(&branches, true);
        assert_eq!(values(&expanded), vec![Some(val!(vec![1, 2]))]);
    }

    #[test]
    fn lookup_from_array_root() {
        let root = val!(vec![val!(doc! { b: 1 })]);
        let branches = PathLookup::new("0.b").lookup_value(&root);
        assert_eq!(values(&branches), vec![Some(val!(1))]);
        let scalar = val!(3);
        assert_eq!(values(&PathLookup::new("b").lookup_value(&scalar)), vec![None]);
    }

    #[test]
    fn first_position_skips_markers() {
        let indices: ArrayIndices = smallvec![Explicit, Position(3), Position(1)];
        assert_eq!(first_position(&indices), Some(3));
        assert_eq!(first_position(&ArrayIndices::new()), None);
    }
}
