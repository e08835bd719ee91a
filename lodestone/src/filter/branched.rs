use crate::collection::Document;
use crate::common::{Value, LOGICAL_OPERATORS};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::element::{Comparison, ElemMatchTarget, ElementMatcher, ElementOutcome};
use crate::filter::geo::NearMatcher;
use crate::filter::{
    and_results, expand_arrays_in_branches, is_operator_object, ArrayIndex, ArrayIndices, Branch,
    Compiler, MatchResult,
};
use smallvec::smallvec;

/// How the branches found at a path are fed to an element matcher.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ExpandMode {
    /// Test every branch and every element of array branches.
    Expand,
    /// Like `Expand`, without testing the iterated arrays themselves.
    ExpandSkipLeafArrays,
    /// Test the branches as found.
    DontExpand,
}

/// A predicate over all the branches found at one path.
#[derive(Debug)]
pub(crate) enum BranchedMatcher {
    Everything,
    Nothing,
    Element {
        matcher: ElementMatcher,
        mode: ExpandMode,
    },
    Invert(Box<BranchedMatcher>),
    And(Vec<BranchedMatcher>),
    Near(NearMatcher),
}

impl BranchedMatcher {
    pub(crate) fn element(matcher: ElementMatcher) -> BranchedMatcher {
        BranchedMatcher::Element {
            matcher,
            mode: ExpandMode::Expand,
        }
    }

    pub(crate) fn invert(matcher: BranchedMatcher) -> BranchedMatcher {
        BranchedMatcher::Invert(Box::new(matcher))
    }

    pub(crate) fn and(mut matchers: Vec<BranchedMatcher>) -> BranchedMatcher {
        match matchers.len() {
            0 => BranchedMatcher::Everything,
            1 => matchers.pop().unwrap_or(BranchedMatcher::Everything),
            _ => BranchedMatcher::And(matchers),
        }
    }

    pub(crate) fn evaluate(&self, branches: &[Branch<'_>]) -> LodestoneResult<MatchResult> {
        match self {
            BranchedMatcher::Everything => Ok(MatchResult::matched()),
            BranchedMatcher::Nothing => Ok(MatchResult::no_match()),
            BranchedMatcher::Element { matcher, mode } => {
                let expanded;
                let candidates: &[Branch<'_>] = match mode {
                    ExpandMode::DontExpand => branches,
                    ExpandMode::Expand => {
                        expanded = expand_arrays_in_branches(branches, false);
                        &expanded
                    }
                    ExpandMode::ExpandSkipLeafArrays => {
                        expanded = expand_arrays_in_branches(branches, true);
                        &expanded
                    }
                };

                for branch in candidates {
                    let indices: ArrayIndices = match matcher.test(branch.value)? {
                        ElementOutcome::Miss => continue,
                        ElementOutcome::Hit => branch.array_indices.clone(),
                        ElementOutcome::HitAt(i) if branch.array_indices.is_empty() => {
                            smallvec![ArrayIndex::Position(i)]
                        }
                        ElementOutcome::HitAt(_) => branch.array_indices.clone(),
                    };
                    return Ok(MatchResult {
                        result: true,
                        distance: None,
                        array_indices: if indices.is_empty() { None } else { Some(indices) },
                    });
                }
                Ok(MatchResult::no_match())
            }
            BranchedMatcher::Invert(matcher) => {
                let inner = matcher.evaluate(branches)?;
                Ok(MatchResult::from(!inner.result))
            }
            BranchedMatcher::And(matchers) => {
                and_results(matchers, |matcher| matcher.evaluate(branches))
            }
            BranchedMatcher::Near(near) => near.evaluate(branches),
        }
    }
}

impl Compiler {
    /// Compiles the right hand side of a field constraint.
    pub(crate) fn compile_value_selector(
        &mut self,
        value_selector: &Value,
        is_root: bool,
    ) -> LodestoneResult<BranchedMatcher> {
        if let Value::Regex(regex) = value_selector {
            self.is_simple = false;
            return Ok(BranchedMatcher::element(ElementMatcher::Regex(regex.clone())));
        }

        if is_operator_object(value_selector, false)? {
            if let Value::Document(operators) = value_selector {
                return self.compile_operators(operators, is_root);
            }
        }

        Ok(BranchedMatcher::element(ElementMatcher::equality(value_selector)?))
    }

    fn compile_operators(
        &mut self,
        value_selector: &Document,
        is_root: bool,
    ) -> LodestoneResult<BranchedMatcher> {
        let mut matchers = Vec::with_capacity(value_selector.size());
        for (operator, operand) in value_selector.iter() {
            if !is_simple_operator(operator, operand) {
                self.is_simple = false;
            }

            let matcher = match operator.as_str() {
                "$eq" => BranchedMatcher::element(ElementMatcher::equality(operand)?),
                "$not" => BranchedMatcher::invert(self.compile_value_selector(operand, false)?),
                "$ne" => BranchedMatcher::invert(BranchedMatcher::element(
                    ElementMatcher::equality(operand)?,
                )),
                "$nin" => BranchedMatcher::invert(BranchedMatcher::element(
                    ElementMatcher::one_of(operand)?,
                )),
                "$exists" => {
                    let exists = BranchedMatcher::element(ElementMatcher::Exists);
                    if operand.is_truthy() {
                        exists
                    } else {
                        BranchedMatcher::invert(exists)
                    }
                }
                "$options" => {
                    if !value_selector.contains_key("$regex") {
                        log::error!("$options without $regex in {}", value_selector);
                        return Err(LodestoneError::new(
                            "$options needs a $regex",
                            ErrorKind::SelectorError,
                        ));
                    }
                    BranchedMatcher::Everything
                }
                "$maxDistance" => {
                    if !value_selector.get("$near").is_some_and(|near| near.is_truthy()) {
                        log::error!("$maxDistance without $near in {}", value_selector);
                        return Err(LodestoneError::new(
                            "$maxDistance needs a $near",
                            ErrorKind::SelectorError,
                        ));
                    }
                    BranchedMatcher::Everything
                }
                "$all" => self.compile_all(operand)?,
                "$near" => self.compile_near(operand, value_selector, is_root)?,
                "$lt" | "$lte" | "$gt" | "$gte" => {
                    let comparison = Comparison::from_operator(operator).ok_or_else(|| {
                        LodestoneError::new("Unknown comparison", ErrorKind::InternalError)
                    })?;
                    BranchedMatcher::element(ElementMatcher::inequality(operand, comparison))
                }
                "$mod" => BranchedMatcher::element(ElementMatcher::modulo(operand)?),
                "$in" => BranchedMatcher::element(ElementMatcher::one_of(operand)?),
                "$size" => BranchedMatcher::Element {
                    matcher: ElementMatcher::size(operand)?,
                    mode: ExpandMode::DontExpand,
                },
                "$type" => BranchedMatcher::Element {
                    matcher: ElementMatcher::type_of(operand)?,
                    mode: ExpandMode::ExpandSkipLeafArrays,
                },
                "$regex" => BranchedMatcher::element(ElementMatcher::regex_operator(
                    operand,
                    value_selector.get("$options"),
                )?),
                "$elemMatch" => BranchedMatcher::Element {
                    matcher: self.compile_elem_match(operand)?,
                    mode: ExpandMode::DontExpand,
                },
                unknown => {
                    log::error!("Unrecognized operator: {}", unknown);
                    return Err(LodestoneError::new(
                        &format!("Unrecognized operator: {}", unknown),
                        ErrorKind::SelectorError,
                    ));
                }
            };
            matchers.push(matcher);
        }
        Ok(BranchedMatcher::and(matchers))
    }

    fn compile_all(&mut self, operand: &Value) -> LodestoneResult<BranchedMatcher> {
        let criteria = match operand {
            Value::Array(criteria) => criteria,
            _ => {
                log::error!("$all requires array, found {}", operand);
                return Err(LodestoneError::new("$all requires array", ErrorKind::SelectorError));
            }
        };
        if criteria.is_empty() {
            return Ok(BranchedMatcher::Nothing);
        }

        let mut matchers = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            if is_operator_object(criterion, false)? {
                log::error!("No $ expressions allowed in $all: {}", criterion);
                return Err(LodestoneError::new(
                    "no $ expressions in $all",
                    ErrorKind::SelectorError,
                ));
            }
            matchers.push(self.compile_value_selector(criterion, false)?);
        }
        Ok(BranchedMatcher::and(matchers))
    }

    fn compile_elem_match(&mut self, operand: &Value) -> LodestoneResult<ElementMatcher> {
        let selector = match operand {
            Value::Document(selector) => selector,
            _ => {
                log::error!("$elemMatch needs an object, found {}", operand);
                return Err(LodestoneError::new(
                    "$elemMatch need an object",
                    ErrorKind::SelectorError,
                ));
            }
        };

        let without_logical: Document = selector
            .iter()
            .filter(|(key, _)| !LOGICAL_OPERATORS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let is_document_matcher = !is_operator_object(&Value::Document(without_logical), true)?;

        let target = if is_document_matcher {
            ElemMatchTarget::Document(Box::new(self.compile_document_selector(selector, false, true)?))
        } else {
            ElemMatchTarget::Value(Box::new(self.compile_value_selector(operand, false)?))
        };
        Ok(ElementMatcher::ElemMatch(target))
    }
}

// range, equality and inclusion tests over scalars keep a selector simple
fn is_simple_operator(operator: &str, operand: &Value) -> bool {
    match operator {
        "$lt" | "$lte" | "$gt" | "$gte" => operand.is_number(),
        "$ne" | "$eq" => !operand.is_object_like(),
        "$in" | "$nin" => match operand {
            Value::Array(items) => items.iter().all(|item| !item.is_object_like()),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::PathLookup;
    use crate::{doc, val};

    fn compile(selector: Value) -> BranchedMatcher {
        Compiler::new(false).compile_value_selector(&selector, true).unwrap()
    }

    fn evaluate(matcher: &BranchedMatcher, doc: &Document, path: &str) -> MatchResult {
        let branches = PathLookup::new(path).lookup(doc);
        matcher.evaluate(&branches).unwrap()
    }

    #[test]
    fn equality_expands_arrays() {
        let matcher = compile(val!(2));
        assert!(evaluate(&matcher, &doc! { a: [1, 2] }, "a").result);
        assert!(!evaluate(&matcher, &doc! { a: [1, 3] }, "a").result);
        let matcher = compile(val!(vec![1, 2]));
        assert!(evaluate(&matcher, &doc! { a: [1, 2] }, "a").result);
        assert!(evaluate(&matcher, &doc! { a: [[1, 2], 3] }, "a").result);
    }

    #[test]
    fn element_hit_records_indices() {
        let matcher = compile(val!(doc! { "$gt": 5 }));
        let result = evaluate(&matcher, &doc! { a: [1, 7] }, "a");
        assert!(result.result);
        assert_eq!(result.array_indices, Some(smallvec![ArrayIndex::Position(1)]));
    }

    #[test]
    fn elem_match_reports_element_index() {
        let matcher = compile(val!(doc! { "$elemMatch": { b: 2 } }));
        let result = evaluate(&matcher, &doc! { a: [{ b: 1 }, { b: 2 }] }, "a");
        assert!(result.result);
        assert_eq!(result.array_indices, Some(smallvec![ArrayIndex::Position(1)]));
    }

    #[test]
    fn elem_match_document_flavor_stops_on_scalars() {
        let matcher = compile(val!(doc! { "$elemMatch": { b: 2 } }));
        assert!(!evaluate(&matcher, &doc! { a: [1, { b: 2 }] }, "a").result);
    }

    #[test]
    fn elem_match_value_flavor() {
        let matcher = compile(val!(doc! { "$elemMatch": { "$gt": 2, "$lt": 5 } }));
        assert!(evaluate(&matcher, &doc! { a: [1, 4] }, "a").result);
        assert!(!evaluate(&matcher, &doc! { a: [1, 6] }, "a").result);
        // nested arrays are not iterated by a value $elemMatch
        assert!(!evaluate(&matcher, &doc! { a: [[3]] }, "a").result);
    }

    #[test]
    fn not_and_ne_drop_indices() {
        let matcher = compile(val!(doc! { "$ne": 3 }));
        let result = evaluate(&matcher, &doc! { a: [1, 2] }, "a");
        assert!(result.result);
        assert_eq!(result.array_indices, None);
        assert!(!evaluate(&matcher, &doc! { a: [1, 3] }, "a").result);

        let matcher = compile(val!(doc! { "$not": { "$gt": 3 } }));
        assert!(evaluate(&matcher, &doc! { a: 2 }, "a").result);
        assert!(!evaluate(&matcher, &doc! { a: 4 }, "a").result);
    }

    #[test]
    fn all_evaluates_each_criterion_independently() {
        let matcher = compile(val!(doc! { "$all": [1, 2] }));
        assert!(evaluate(&matcher, &doc! { a: [2, 3, 1] }, "a").result);
        assert!(!evaluate(&matcher, &doc! { a: [2, 3] }, "a").result);
        let matcher = compile(val!(doc! { "$all": [] }));
        assert!(!evaluate(&matcher, &doc! { a: [] }, "a").result);
    }

    #[test]
    fn all_rejects_operators_and_non_arrays() {
        let mut compiler = Compiler::new(false);
        assert!(compiler
            .compile_value_selector(&val!(doc! { "$all": 1 }), true)
            .is_err());
        assert!(compiler
            .compile_value_selector(&val!(doc! { "$all": [{ "$gt": 1 }] }), true)
            .is_err());
    }

    #[test]
    fn size_does_not_expand() {
        let matcher = compile(val!(doc! { "$size": 1 }));
        assert!(evaluate(&matcher, &doc! { a: [[1, 2]] }, "a").result);
        assert!(!evaluate(&matcher, &doc! { a: [1, 2] }, "a").result);
    }

    #[test]
    fn type_skips_iterated_arrays() {
        let matcher = compile(val!(doc! { "$type": 4 }));
        assert!(!evaluate(&matcher, &doc! { a: [1] }, "a").result);
        assert!(evaluate(&matcher, &doc! { a: [[1]] }, "a").result);
        assert!(evaluate(&matcher, &doc! { a: [[1]] }, "a.0").result);
    }

    #[test]
    fn exists() {
        let matcher = compile(val!(doc! { "$exists": true }));
        assert!(evaluate(&matcher, &doc! { a: () }, "a").result);
        assert!(!evaluate(&matcher, &doc! { b: 1 }, "a").result);
        let matcher = compile(val!(doc! { "$exists": 0 }));
        assert!(evaluate(&matcher, &doc! { b: 1 }, "a").result);
    }

    #[test]
    fn options_and_max_distance_need_partners() {
        let mut compiler = Compiler::new(false);
        assert!(compiler
            .compile_value_selector(&val!(doc! { "$options": "i" }), true)
            .is_err());
        assert!(compiler
            .compile_value_selector(&val!(doc! { "$maxDistance": 3 }), true)
            .is_err());
        let matcher = compile(val!(doc! { "$regex": "^a", "$options": "i" }));
        assert!(evaluate(&matcher, &doc! { a: "Ab" }, "a").result);
    }

    #[test]
    fn unknown_operator_is_error() {
        let err = Compiler::new(false)
            .compile_value_selector(&val!(doc! { "$foo": 1 }), true)
            .unwrap_err();
        assert_eq!(err.message(), "Unrecognized operator: $foo");
    }

    #[test]
    fn simple_tracking() {
        let mut compiler = Compiler::new(false);
        compiler
            .compile_value_selector(&val!(doc! { "$gt": 1, "$in": [1, "a"] }), true)
            .unwrap();
        assert!(compiler.is_simple);
        compiler
            .compile_value_selector(&val!(doc! { "$in": [{ a: 1 }] }), true)
            .unwrap();
        assert!(!compiler.is_simple);
    }
}
