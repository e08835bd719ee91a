use crate::collection::{Document, DocumentId};
use crate::common::{compare_optional, Value};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{
    expand_arrays_in_branches, is_operator_object, ArrayIndex, ArrayIndices, Branch, Comparison,
    ElementMatcher, ElementOutcome, Matcher, PathLookup,
};
use crate::sort::{SortOrder, SortSpec};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// `$near` distances of the documents in a result set, keyed by id.
pub type DistanceMap = HashMap<DocumentId, f64>;

/// Key value of a field that only holds empty arrays.
static NULL_VALUE: Value = Value::Null;

/// One value per sort field. `None` stands for a missing field.
pub(crate) type SortKey<'a> = Vec<Option<&'a Value>>;

struct SortField {
    lookup: PathLookup,
    ascending: bool,
}

/// A compiled sort specification.
///
/// Specifications are either a document of `path: 1 | -1` pairs or an array
/// whose entries are a path (ascending) or a `[path, "asc" | "desc"]` pair.
///
/// A document is ordered by its minimal sort key. When a sort field goes
/// through arrays, one key is generated per array position and the least
/// one is used, so `{a: [3, 1]}` sorts as `1` ascending and as `3`
/// descending.
#[derive(Clone)]
pub struct Sorter {
    inner: Arc<SorterInner>,
}

struct SorterInner {
    fields: Vec<SortField>,
    key_filter: Option<KeyFilter>,
}

impl Sorter {
    /// Compiles a sort specification.
    pub fn new(spec: &Value) -> LodestoneResult<Sorter> {
        Sorter::with_matcher(spec, None)
    }

    /// Compiles a sort specification for documents selected by `matcher`.
    ///
    /// If the first sort field is constrained by the selector, keys whose
    /// values the selector would reject are not considered when picking a
    /// document's minimal key.
    pub fn with_matcher(spec: &Value, matcher: Option<&Matcher>) -> LodestoneResult<Sorter> {
        let fields = parse_spec(spec)?;
        let key_filter = match matcher {
            Some(matcher) => KeyFilter::build(&fields, matcher)?,
            None => None,
        };
        Ok(Sorter {
            inner: Arc::new(SorterInner { fields, key_filter }),
        })
    }

    pub fn from_spec(spec: &SortSpec, matcher: Option<&Matcher>) -> LodestoneResult<Sorter> {
        Sorter::with_matcher(&Value::from(spec.clone()), matcher)
    }

    /// Sort fields in priority order.
    pub fn fields(&self) -> Vec<(String, SortOrder)> {
        self.inner
            .fields
            .iter()
            .map(|field| {
                let order = if field.ascending {
                    SortOrder::Ascending
                } else {
                    SortOrder::Descending
                };
                (field.lookup.path().to_string(), order)
            })
            .collect()
    }

    pub fn has_key_filter(&self) -> bool {
        self.inner.key_filter.is_some()
    }

    /// Compares two documents by their minimal keys, then by `$near`
    /// distance when `distances` is given.
    ///
    /// # Errors
    ///
    /// Fails when keys cannot be generated or compared, or when a document
    /// has no entry in `distances`.
    pub fn compare(
        &self,
        a: &Document,
        b: &Document,
        distances: Option<&DistanceMap>,
    ) -> LodestoneResult<Ordering> {
        if !self.inner.fields.is_empty() {
            let key_a = self.min_key(a)?;
            let key_b = self.min_key(b)?;
            let ordering = self.compare_keys(&key_a, &key_b)?;
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }

        match distances {
            Some(distances) => {
                let distance_a = distance_of(a, distances)?;
                let distance_b = distance_of(b, distances)?;
                Ok(distance_a.partial_cmp(&distance_b).unwrap_or(Ordering::Equal))
            }
            None => Ok(Ordering::Equal),
        }
    }

    /// Stable sort of `docs`.
    pub fn sort_documents(
        &self,
        docs: &mut [Document],
        distances: Option<&DistanceMap>,
    ) -> LodestoneResult<()> {
        let mut failure = None;
        docs.sort_by(|a, b| match self.compare(a, b, distances) {
            Ok(ordering) => ordering,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stable sort of values that must all be documents.
    pub fn sort_values(&self, values: &mut [Value]) -> LodestoneResult<()> {
        let mut failure = None;
        values.sort_by(|a, b| {
            let ordering = match (a, b) {
                (Value::Document(a), Value::Document(b)) => self.compare(a, b, None),
                _ => Err(LodestoneError::new(
                    "Only documents can be sorted",
                    ErrorKind::SortError,
                )),
            };
            ordering.unwrap_or_else(|err| {
                failure.get_or_insert(err);
                Ordering::Equal
            })
        });
        match failure {
            Some(err) => {
                log::error!("Failed to sort values: {}", err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Position at which `doc` goes in the already sorted `docs`, after
    /// every element comparing equal to it.
    pub fn insertion_index(
        &self,
        docs: &[Document],
        doc: &Document,
        distances: Option<&DistanceMap>,
    ) -> LodestoneResult<usize> {
        let mut first = 0;
        let mut range = docs.len();
        while range > 0 {
            let half = range / 2;
            if self.compare(doc, &docs[first + half], distances)? != Ordering::Less {
                first += half + 1;
                range -= half + 1;
            } else {
                range = half;
            }
        }
        Ok(first)
    }

    /// The least of the keys generated for `doc` that passes the key filter.
    pub(crate) fn min_key<'a>(&self, doc: &'a Document) -> LodestoneResult<SortKey<'a>> {
        let mut min_key: Option<SortKey<'a>> = None;
        for key in self.generate_keys(doc)? {
            if let Some(filter) = &self.inner.key_filter {
                if !filter.accepts(&key)? {
                    continue;
                }
            }
            let smaller = match &min_key {
                None => true,
                Some(current) => self.compare_keys(&key, current)? == Ordering::Less,
            };
            if smaller {
                min_key = Some(key);
            }
        }

        min_key.ok_or_else(|| {
            log::error!("Sort selector found no keys in {}", doc);
            LodestoneError::new("sort selector found no keys in doc?", ErrorKind::SortError)
        })
    }

    pub(crate) fn compare_keys(&self, a: &SortKey<'_>, b: &SortKey<'_>) -> LodestoneResult<Ordering> {
        for (i, field) in self.inner.fields.iter().enumerate() {
            let ordering = compare_optional(
                a.get(i).copied().flatten(),
                b.get(i).copied().flatten(),
            )?;
            let ordering = if field.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    /// Generates every sort key of `doc`.
    ///
    /// Fields that do not go through arrays contribute their single value
    /// to every key. Fields that do must all branch over the same array
    /// positions; one key is produced per position.
    pub(crate) fn generate_keys<'a>(&self, doc: &'a Document) -> LodestoneResult<Vec<SortKey<'a>>> {
        // per field: "" for a plain value, else the array path of each value
        let mut values_by_path: Vec<IndexMap<String, Option<&'a Value>>> =
            Vec::with_capacity(self.inner.fields.len());
        let mut known_paths: Option<IndexSet<String>> = None;

        for field in &self.inner.fields {
            let mut branches = expand_arrays_in_branches(&field.lookup.lookup(doc), true);
            if branches.is_empty() {
                branches.push(Branch::new(Some(&NULL_VALUE)));
            }

            let mut element: IndexMap<String, Option<&'a Value>> = IndexMap::new();
            let mut used_paths = false;
            for branch in &branches {
                if branch.array_indices.is_empty() {
                    if branches.len() > 1 {
                        return Err(sort_error("multiple branches but no array used?"));
                    }
                    element.insert(String::new(), branch.value);
                    continue;
                }

                used_paths = true;
                let path = path_from_indices(&branch.array_indices);
                if element.contains_key(&path) {
                    return Err(sort_error(&format!("duplicate path: {}", path)));
                }
                if known_paths.as_ref().is_some_and(|known| !known.contains(&path)) {
                    return Err(sort_error("cannot index parallel arrays"));
                }
                element.insert(path, branch.value);
            }

            match &known_paths {
                Some(known) => {
                    if !element.contains_key("") && known.len() != element.len() {
                        return Err(sort_error("cannot index parallel arrays!"));
                    }
                }
                None if used_paths => {
                    known_paths = Some(element.keys().cloned().collect());
                }
                None => {}
            }
            values_by_path.push(element);
        }

        let known_paths = match known_paths {
            Some(known) => known,
            None => {
                let mut sole_key = Vec::with_capacity(values_by_path.len());
                for values in &values_by_path {
                    match values.get("") {
                        Some(value) => sole_key.push(*value),
                        None => return Err(sort_error("no value in sole key case?")),
                    }
                }
                return Ok(vec![sole_key]);
            }
        };

        let mut keys = Vec::with_capacity(known_paths.len());
        for path in &known_paths {
            let mut key = Vec::with_capacity(values_by_path.len());
            for values in &values_by_path {
                let value = values
                    .get("")
                    .or_else(|| values.get(path))
                    .ok_or_else(|| sort_error("missing path?"))?;
                key.push(*value);
            }
            keys.push(key);
        }
        Ok(keys)
    }
}

impl Display for Sorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = self.inner.fields.iter().format_with(", ", |field, f| {
            f(&format_args!(
                "{} {}",
                field.lookup.path(),
                if field.ascending { "asc" } else { "desc" }
            ))
        });
        write!(f, "Sorter[{}]", parts)
    }
}

impl Debug for Sorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

fn sort_error(message: &str) -> LodestoneError {
    log::error!("{}", message);
    LodestoneError::new(message, ErrorKind::SortError)
}

fn distance_of(doc: &Document, distances: &DistanceMap) -> LodestoneResult<f64> {
    let id = DocumentId::of(doc)?;
    match distances.get(&id) {
        Some(distance) => Ok(*distance),
        None => {
            log::error!("Missing distance for {}", id);
            Err(LodestoneError::new(
                &format!("Missing distance for {}", id),
                ErrorKind::SortError,
            ))
        }
    }
}

fn path_from_indices(indices: &ArrayIndices) -> String {
    let mut path = String::new();
    for index in indices {
        match index {
            ArrayIndex::Position(i) => path.push_str(&i.to_string()),
            ArrayIndex::Explicit => path.push('x'),
        }
        path.push(',');
    }
    path
}

fn parse_spec(spec: &Value) -> LodestoneResult<Vec<SortField>> {
    let mut parts: Vec<(String, bool)> = Vec::new();
    match spec {
        Value::Array(entries) => {
            for entry in entries {
                match entry {
                    Value::String(path) => parts.push((path.clone(), true)),
                    Value::Array(pair) if !pair.is_empty() => {
                        let path = pair[0].as_str().ok_or_else(|| bad_spec(spec))?;
                        let ascending = pair.get(1).and_then(|d| d.as_str()) != Some("desc");
                        parts.push((path.to_string(), ascending));
                    }
                    _ => return Err(bad_spec(spec)),
                }
            }
        }
        Value::Document(spec_doc) => {
            for (path, direction) in spec_doc.iter() {
                let ascending = match direction.as_f64() {
                    Some(direction) => direction >= 0.0,
                    None => return Err(bad_spec(spec)),
                };
                parts.push((path.clone(), ascending));
            }
        }
        _ => return Err(bad_spec(spec)),
    }

    let mut fields = Vec::with_capacity(parts.len());
    for (path, ascending) in parts {
        if path.starts_with('$') {
            log::error!("Unsupported sort key {}", path);
            return Err(LodestoneError::new(
                &format!("unsupported sort key: {}", path),
                ErrorKind::SortError,
            ));
        }
        fields.push(SortField {
            lookup: PathLookup::for_sort(&path),
            ascending,
        });
    }
    Ok(fields)
}

fn bad_spec(spec: &Value) -> LodestoneError {
    log::error!("Bad sort specification: {}", spec);
    LodestoneError::new(
        &format!("Bad sort specification: {}", spec),
        ErrorKind::SortError,
    )
}

/// Restricts which generated keys may serve as a document's minimal key, so
/// that array fields constrained by the selector sort by a value the
/// selector accepts.
struct KeyFilter {
    /// Sort field paths in priority order.
    paths: Vec<String>,
    constraints: IndexMap<String, Vec<ElementMatcher>>,
}

impl KeyFilter {
    fn build(fields: &[SortField], matcher: &Matcher) -> LodestoneResult<Option<KeyFilter>> {
        if fields.is_empty() {
            return Ok(None);
        }
        let selector = match matcher.selector() {
            Some(selector) => selector,
            None => return Ok(None),
        };

        let paths: Vec<String> = fields.iter().map(|f| f.lookup.path().to_string()).collect();
        let mut constraints: IndexMap<String, Vec<ElementMatcher>> =
            paths.iter().map(|path| (path.clone(), Vec::new())).collect();

        for (key, sub_selector) in selector.iter() {
            let matchers = match constraints.get_mut(key) {
                Some(matchers) => matchers,
                None => continue,
            };

            if let Value::Regex(regex) = sub_selector {
                // flags stop a regex from naming a single key range
                if !regex.ignore_case() && !regex.multiline() {
                    matchers.push(ElementMatcher::Regex(regex.clone()));
                }
                continue;
            }

            if is_operator_object(sub_selector, true)? {
                if let Value::Document(operators) = sub_selector {
                    for (operator, operand) in operators.iter() {
                        if let Some(comparison) = Comparison::from_operator(operator) {
                            matchers.push(ElementMatcher::inequality(operand, comparison));
                        }
                        if operator == "$regex" && !operators.contains_key("$options") {
                            matchers.push(ElementMatcher::regex_operator(operand, None)?);
                        }
                    }
                }
                continue;
            }

            matchers.push(ElementMatcher::equality(sub_selector)?);
        }

        let first_constrained = constraints
            .get(&paths[0])
            .is_some_and(|matchers| !matchers.is_empty());
        if !first_constrained {
            return Ok(None);
        }
        Ok(Some(KeyFilter { paths, constraints }))
    }

    fn accepts(&self, key: &SortKey<'_>) -> LodestoneResult<bool> {
        for (i, path) in self.paths.iter().enumerate() {
            let value = key.get(i).copied().flatten();
            for matcher in self.constraints.get(path).into_iter().flatten() {
                if matcher.test(value)? == ElementOutcome::Miss {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
