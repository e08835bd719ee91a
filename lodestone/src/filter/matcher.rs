use crate::collection::Document;
use crate::common::{Value, DOC_ID};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{ArrayIndices, Branch, BranchedMatcher, DocumentMatcher, MatchRoot};
use indexmap::IndexSet;
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// Result of matching a document against a selector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchResult {
    pub result: bool,
    /// Distance to the `$near` point, when the selector has one.
    pub distance: Option<f64>,
    /// Array positions taken to reach the matching value, used by
    /// positional (`$`) updates.
    pub array_indices: Option<ArrayIndices>,
}

impl MatchResult {
    pub fn matched() -> Self {
        MatchResult {
            result: true,
            distance: None,
            array_indices: None,
        }
    }

    pub fn no_match() -> Self {
        MatchResult::default()
    }
}

impl From<bool> for MatchResult {
    fn from(result: bool) -> Self {
        MatchResult {
            result,
            distance: None,
            array_indices: None,
        }
    }
}

/// ANDs sub results, stopping at the first failure.
///
/// The distance comes from the first sub result that has one and the array
/// indices from the last; both are dropped when the conjunction fails.
pub(crate) fn and_results<T>(
    items: &[T],
    mut evaluate: impl FnMut(&T) -> LodestoneResult<MatchResult>,
) -> LodestoneResult<MatchResult> {
    let mut combined = MatchResult::matched();
    for item in items {
        let sub = evaluate(item)?;
        if !sub.result {
            return Ok(MatchResult::no_match());
        }
        if sub.distance.is_some() && combined.distance.is_none() {
            combined.distance = sub.distance;
        }
        if sub.array_indices.is_some() {
            combined.array_indices = sub.array_indices;
        }
    }
    Ok(combined)
}

/// Returns true if `value` is a document whose keys all start with `$`.
///
/// # Errors
///
/// A document mixing operator and plain keys is a `SelectorError`, unless
/// `inconsistent_ok` is set, in which case it is simply not an operator
/// object.
pub fn is_operator_object(value: &Value, inconsistent_ok: bool) -> LodestoneResult<bool> {
    let doc = match value {
        Value::Document(doc) => doc,
        _ => return Ok(false),
    };

    let mut these_are_operators: Option<bool> = None;
    for key in doc.keys() {
        let this_is_operator = key.starts_with('$');
        match these_are_operators {
            None => these_are_operators = Some(this_is_operator),
            Some(previous) if previous != this_is_operator => {
                if !inconsistent_ok {
                    log::error!("Inconsistent operator: {}", doc);
                    return Err(LodestoneError::new(
                        &format!("Inconsistent operator: {}", doc),
                        ErrorKind::SelectorError,
                    ));
                }
                these_are_operators = Some(false);
            }
            Some(_) => {}
        }
    }
    Ok(these_are_operators.unwrap_or(false))
}

/// Returns true for selectors that name a single id: strings, numbers and
/// object ids.
pub fn selector_is_id(selector: &Value) -> bool {
    matches!(
        selector,
        Value::String(_) | Value::I64(_) | Value::F64(_) | Value::ObjectId(_)
    )
}

/// Returns true for a bare id or a `{_id: id}` selector.
pub fn selector_is_id_perhaps_as_object(selector: &Value) -> bool {
    if selector_is_id(selector) {
        return true;
    }
    match selector {
        Value::Document(doc) => doc.size() == 1 && doc.id().is_some_and(selector_is_id),
        _ => false,
    }
}

/// Ids a selector can only ever match, if that can be told from its shape:
/// a bare id, `{_id: id}`, `{_id: {$in: [ids]}}`, or a top level `$and`
/// containing one of those.
pub fn ids_matched_by_selector(selector: &Value) -> Option<Vec<Value>> {
    if selector_is_id(selector) {
        return Some(vec![selector.clone()]);
    }
    let doc = selector.as_document()?;

    if let Some(id) = doc.id() {
        if selector_is_id(id) {
            return Some(vec![id.clone()]);
        }
        let ids = id
            .as_document()
            .and_then(|operators| operators.get("$in"))
            .and_then(|ids| ids.as_array())?;
        if !ids.is_empty() && ids.iter().all(selector_is_id) {
            return Some(ids.clone());
        }
        return None;
    }

    if let Some(Value::Array(clauses)) = doc.get("$and") {
        for clause in clauses {
            if let Some(ids) = ids_matched_by_selector(clause) {
                return Some(ids);
            }
        }
    }
    None
}

/// A condition applied to single array elements, as `$pull` uses it: an
/// operator object tests the element value, anything else is a document
/// selector applied to the element.
pub(crate) enum ElementSelector {
    Value(BranchedMatcher),
    Document(DocumentMatcher),
}

impl ElementSelector {
    pub(crate) fn compile(condition: &Document) -> LodestoneResult<ElementSelector> {
        let mut compiler = Compiler::new(false);
        let as_value = Value::Document(condition.clone());
        if is_operator_object(&as_value, false)? {
            Ok(ElementSelector::Value(compiler.compile_value_selector(&as_value, false)?))
        } else {
            Ok(ElementSelector::Document(
                compiler.compile_document_selector(condition, false, false)?,
            ))
        }
    }

    pub(crate) fn matches(&self, element: &Value) -> LodestoneResult<bool> {
        let result = match self {
            ElementSelector::Value(matcher) => matcher.evaluate(&[Branch::new(Some(element))])?,
            ElementSelector::Document(matcher) => matcher.evaluate(MatchRoot::Value(element))?,
        };
        Ok(result.result)
    }
}

/// Mutable state gathered while compiling one selector.
pub(crate) struct Compiler {
    pub(crate) paths: IndexSet<String>,
    pub(crate) has_geo_query: bool,
    pub(crate) has_where: bool,
    pub(crate) is_simple: bool,
    pub(crate) is_update: bool,
}

impl Compiler {
    pub(crate) fn new(is_update: bool) -> Self {
        Compiler {
            paths: IndexSet::new(),
            has_geo_query: false,
            has_where: false,
            is_simple: true,
            is_update,
        }
    }

    pub(crate) fn record_path(&mut self, path: &str) {
        self.paths.insert(path.to_string());
    }

    fn compile(&mut self, selector: &Value) -> LodestoneResult<(DocumentMatcher, Option<Document>)> {
        if let Value::Predicate(predicate) = selector {
            self.is_simple = false;
            self.record_path("");
            return Ok((DocumentMatcher::Predicate(predicate.clone()), None));
        }

        if selector_is_id(selector) {
            self.record_path(DOC_ID);
            let mut as_object = Document::new();
            as_object.put(DOC_ID, selector.clone());
            return Ok((DocumentMatcher::id_equals(selector), Some(as_object)));
        }

        let falsy_id = selector
            .as_document()
            .and_then(|doc| doc.id())
            .is_some_and(|id| !id.is_truthy());
        if !selector.is_truthy() || falsy_id {
            self.is_simple = false;
            return Ok((DocumentMatcher::Nothing, None));
        }

        match selector {
            Value::Document(doc) => {
                let matcher = self.compile_document_selector(doc, true, false)?;
                Ok((matcher, Some(doc.clone())))
            }
            other => {
                log::error!("Invalid selector: {}", other);
                Err(LodestoneError::new(
                    &format!("Invalid selector: {}", other),
                    ErrorKind::SelectorError,
                ))
            }
        }
    }
}

/// A compiled selector.
///
/// Selectors are [Value]s: a document of field constraints and logical
/// operators, a bare id (shorthand for `{_id: id}`), or a native predicate.
/// A falsy selector (`null`, `false`) or one whose `_id` is falsy matches
/// nothing.
///
/// Compilation validates the whole selector up front; evaluation errors are
/// limited to comparisons between unordered values (regular expressions).
///
/// # Examples
///
/// ```rust,ignore
/// let matcher = Matcher::new(&val!(doc! { "a.b": { "$gt": 1 } }))?;
/// assert!(matcher.matches(&doc! { a: [{ b: 0 }, { b: 2 }] })?);
/// ```
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

struct MatcherInner {
    doc_matcher: DocumentMatcher,
    selector: Option<Document>,
    paths: IndexSet<String>,
    has_geo_query: bool,
    has_where: bool,
    is_simple: bool,
}

impl Matcher {
    /// Compiles a selector for queries.
    pub fn new(selector: &Value) -> LodestoneResult<Matcher> {
        Matcher::compile(selector, false)
    }

    /// Compiles a selector for picking documents to update. In this mode
    /// `$near` only requires the field to be present.
    pub fn for_update(selector: &Value) -> LodestoneResult<Matcher> {
        Matcher::compile(selector, true)
    }

    fn compile(selector: &Value, is_update: bool) -> LodestoneResult<Matcher> {
        let mut compiler = Compiler::new(is_update);
        let (doc_matcher, selector) = compiler.compile(selector)?;
        Ok(Matcher {
            inner: Arc::new(MatcherInner {
                doc_matcher,
                selector,
                paths: compiler.paths,
                has_geo_query: compiler.has_geo_query,
                has_where: compiler.has_where,
                is_simple: compiler.is_simple,
            }),
        })
    }

    /// Matches a document, reporting `$near` distance and array positions.
    pub fn document_matches(&self, doc: &Document) -> LodestoneResult<MatchResult> {
        self.inner.doc_matcher.evaluate(MatchRoot::Document(doc))
    }

    pub fn matches(&self, doc: &Document) -> LodestoneResult<bool> {
        Ok(self.document_matches(doc)?.result)
    }

    pub fn has_geo_query(&self) -> bool {
        self.inner.has_geo_query
    }

    pub fn has_where(&self) -> bool {
        self.inner.has_where
    }

    /// True when the selector only uses scalar equality, range and inclusion
    /// tests on plain fields.
    pub fn is_simple(&self) -> bool {
        self.inner.is_simple
    }

    /// Field paths the selector inspects. The empty path means the whole
    /// document (`$where` or a predicate selector).
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.inner.paths.iter().map(|p| p.as_str())
    }

    /// Returns true if the selector depends on `path`, either directly or
    /// through a prefix or extension of it.
    pub fn can_become_true_by_modifying(&self, path: &str) -> bool {
        self.inner.paths.iter().any(|used| {
            used.is_empty()
                || used == path
                || used.starts_with(&format!("{}.", path))
                || path.starts_with(&format!("{}.", used))
        })
    }

    /// The selector as a document, when it is one. Bare id selectors are
    /// reported as `{_id: id}`.
    pub fn selector(&self) -> Option<&Document> {
        self.inner.selector.as_ref()
    }
}

impl Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner.selector {
            Some(selector) => write!(f, "Matcher({})", selector),
            None => write!(f, "Matcher(<predicate or nothing>)"),
        }
    }
}

impl Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
