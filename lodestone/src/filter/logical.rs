use crate::collection::Document;
use crate::common::{values_equal, DocumentPredicate, Value};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{and_results, BranchedMatcher, Compiler, MatchResult, PathLookup};

/// What a document level matcher is applied to. `$elemMatch` applies
/// document selectors to array elements, which may themselves be arrays.
#[derive(Clone, Copy)]
pub(crate) enum MatchRoot<'a> {
    Document(&'a Document),
    Value(&'a Value),
}

impl<'a> MatchRoot<'a> {
    fn as_document(&self) -> Option<&'a Document> {
        match self {
            MatchRoot::Document(doc) => Some(doc),
            MatchRoot::Value(Value::Document(doc)) => Some(doc),
            MatchRoot::Value(_) => None,
        }
    }
}

/// A compiled document selector.
#[derive(Debug)]
pub(crate) enum DocumentMatcher {
    Everything,
    Nothing,
    IdEquals(Value),
    Predicate(DocumentPredicate),
    Field {
        lookup: PathLookup,
        matcher: BranchedMatcher,
    },
    And(Vec<DocumentMatcher>),
    Or(Vec<DocumentMatcher>),
    Nor(Vec<DocumentMatcher>),
}

impl DocumentMatcher {
    pub(crate) fn and(mut matchers: Vec<DocumentMatcher>) -> DocumentMatcher {
        match matchers.len() {
            0 => DocumentMatcher::Everything,
            1 => matchers.pop().unwrap_or(DocumentMatcher::Everything),
            _ => DocumentMatcher::And(matchers),
        }
    }

    pub(crate) fn evaluate(&self, root: MatchRoot<'_>) -> LodestoneResult<MatchResult> {
        match self {
            DocumentMatcher::Everything => Ok(MatchResult::matched()),
            DocumentMatcher::Nothing => Ok(MatchResult::no_match()),
            DocumentMatcher::IdEquals(id) => {
                let matched = root
                    .as_document()
                    .and_then(|doc| doc.id())
                    .is_some_and(|doc_id| values_equal(doc_id, id, false));
                Ok(MatchResult::from(matched))
            }
            DocumentMatcher::Predicate(predicate) => {
                let matched = root.as_document().is_some_and(|doc| predicate.test(doc));
                Ok(MatchResult::from(matched))
            }
            DocumentMatcher::Field { lookup, matcher } => {
                let branches = match root {
                    MatchRoot::Document(doc) => lookup.lookup(doc),
                    MatchRoot::Value(value) => lookup.lookup_value(value),
                };
                matcher.evaluate(&branches)
            }
            DocumentMatcher::And(matchers) => and_results(matchers, |m| m.evaluate(root)),
            DocumentMatcher::Or(matchers) => {
                for matcher in matchers {
                    if matcher.evaluate(root)?.result {
                        return Ok(MatchResult::matched());
                    }
                }
                Ok(MatchResult::no_match())
            }
            DocumentMatcher::Nor(matchers) => {
                for matcher in matchers {
                    if matcher.evaluate(root)?.result {
                        return Ok(MatchResult::no_match());
                    }
                }
                Ok(MatchResult::matched())
            }
        }
    }
}

impl Compiler {
    /// Compiles a document selector: an implicit AND of field constraints and
    /// logical operators.
    pub(crate) fn compile_document_selector(
        &mut self,
        selector: &Document,
        is_root: bool,
        in_elem_match: bool,
    ) -> LodestoneResult<DocumentMatcher> {
        let mut matchers = Vec::with_capacity(selector.size());
        for (key, sub_selector) in selector.iter() {
            if key.starts_with('$') {
                self.is_simple = false;
                matchers.push(self.compile_logical(key, sub_selector, in_elem_match)?);
                continue;
            }

            if !in_elem_match {
                self.record_path(key);
            }
            // a predicate under a field name constrains nothing
            if matches!(sub_selector, Value::Predicate(_)) {
                continue;
            }

            let matcher = self.compile_value_selector(sub_selector, is_root)?;
            matchers.push(DocumentMatcher::Field {
                lookup: PathLookup::new(key),
                matcher,
            });
        }
        Ok(DocumentMatcher::and(matchers))
    }

    fn compile_logical(
        &mut self,
        operator: &str,
        sub_selector: &Value,
        in_elem_match: bool,
    ) -> LodestoneResult<DocumentMatcher> {
        match operator {
            "$and" => {
                let matchers = self.compile_selector_array(sub_selector, in_elem_match)?;
                Ok(DocumentMatcher::and(matchers))
            }
            "$or" => {
                let mut matchers = self.compile_selector_array(sub_selector, in_elem_match)?;
                if matchers.len() == 1 {
                    return Ok(matchers.pop().unwrap_or(DocumentMatcher::Nothing));
                }
                Ok(DocumentMatcher::Or(matchers))
            }
            "$nor" => {
                let matchers = self.compile_selector_array(sub_selector, in_elem_match)?;
                Ok(DocumentMatcher::Nor(matchers))
            }
            "$where" => {
                self.record_path("");
                self.has_where = true;
                match sub_selector {
                    Value::Predicate(predicate) => Ok(DocumentMatcher::Predicate(predicate.clone())),
                    other => {
                        log::error!("$where needs a predicate, found {}", other);
                        Err(LodestoneError::new(
                            "$where needs a predicate",
                            ErrorKind::SelectorError,
                        ))
                    }
                }
            }
            "$comment" => Ok(DocumentMatcher::Everything),
            unknown => {
                log::error!("Unrecognized logical operator: {}", unknown);
                Err(LodestoneError::new(
                    &format!("Unrecognized logical operator: {}", unknown),
                    ErrorKind::SelectorError,
                ))
            }
        }
    }

    fn compile_selector_array(
        &mut self,
        selectors: &Value,
        in_elem_match: bool,
    ) -> LodestoneResult<Vec<DocumentMatcher>> {
        let selectors = match selectors {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                log::error!("$and/$or/$nor must be nonempty array, found {}", selectors);
                return Err(LodestoneError::new(
                    "$and/$or/$nor must be nonempty array",
                    ErrorKind::SelectorError,
                ));
            }
        };

        let mut matchers = Vec::with_capacity(selectors.len());
        for selector in selectors {
            match selector {
                Value::Document(doc) => {
                    matchers.push(self.compile_document_selector(doc, false, in_elem_match)?)
                }
                other => {
                    log::error!("$or/$and/$nor entries need to be full objects, found {}", other);
                    return Err(LodestoneError::new(
                        "$or/$and/$nor entries need to be full objects",
                        ErrorKind::SelectorError,
                    ));
                }
            }
        }
        Ok(matchers)
    }
}

impl DocumentMatcher {
    /// Matcher for `{_id: id}` shorthand selectors.
    pub(crate) fn id_equals(id: &Value) -> DocumentMatcher {
        DocumentMatcher::IdEquals(id.clone())
    }
}
