use crate::common::{compare_values, values_equal, RegexValue, Value, NULL_VALUE};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{is_operator_object, Branch, BranchedMatcher, DocumentMatcher, MatchRoot};
use std::cmp::Ordering;
use std::fmt::Display;

/// Outcome of testing one element.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ElementOutcome {
    Miss,
    Hit,
    /// Matched at the given position of the tested array (`$elemMatch`).
    HitAt(usize),
}

impl From<bool> for ElementOutcome {
    fn from(value: bool) -> Self {
        if value {
            ElementOutcome::Hit
        } else {
            ElementOutcome::Miss
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Comparison {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    pub(crate) fn from_operator(operator: &str) -> Option<Comparison> {
        match operator {
            "$lt" => Some(Comparison::Lt),
            "$lte" => Some(Comparison::Lte),
            "$gt" => Some(Comparison::Gt),
            "$gte" => Some(Comparison::Gte),
            _ => None,
        }
    }

    pub(crate) fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
        }
    }
}

/// What an `$elemMatch` runs against each array element.
#[derive(Debug)]
pub(crate) enum ElemMatchTarget {
    /// A document selector, applied to embedded documents and arrays.
    Document(Box<DocumentMatcher>),
    /// An operator object, applied to every element value.
    Value(Box<BranchedMatcher>),
}

/// A predicate over a single value found at a path.
#[derive(Debug)]
pub(crate) enum ElementMatcher {
    Equality(Value),
    NullOrMissing,
    Regex(RegexValue),
    Inequality {
        operand: Value,
        comparison: Comparison,
    },
    Never,
    Mod {
        divisor: f64,
        remainder: f64,
    },
    In(Vec<ElementMatcher>),
    Size(f64),
    Type(i32),
    Exists,
    ElemMatch(ElemMatchTarget),
}

impl ElementMatcher {
    /// Deep equality against `operand`, where `null` also matches missing.
    pub(crate) fn equality(operand: &Value) -> LodestoneResult<ElementMatcher> {
        if is_operator_object(operand, false)? {
            log::error!("Can't create equality matcher for operator object {}", operand);
            return Err(LodestoneError::new(
                "Can't create equalityValueSelector for operator object",
                ErrorKind::SelectorError,
            ));
        }
        if operand.is_null() {
            return Ok(ElementMatcher::NullOrMissing);
        }
        Ok(ElementMatcher::Equality(operand.clone()))
    }

    pub(crate) fn inequality(operand: &Value, comparison: Comparison) -> ElementMatcher {
        if operand.is_array() {
            return ElementMatcher::Never;
        }
        ElementMatcher::Inequality {
            operand: operand.clone(),
            comparison,
        }
    }

    pub(crate) fn modulo(operand: &Value) -> LodestoneResult<ElementMatcher> {
        let pair = operand.as_array().and_then(|items| match items.as_slice() {
            [divisor, remainder] => Some((divisor.as_f64()?, remainder.as_f64()?)),
            _ => None,
        });
        match pair {
            Some((divisor, remainder)) => Ok(ElementMatcher::Mod { divisor, remainder }),
            None => {
                log::error!("Invalid $mod argument {}", operand);
                Err(LodestoneError::new(
                    "argument to $mod must be an array of two numbers",
                    ErrorKind::SelectorError,
                ))
            }
        }
    }

    pub(crate) fn one_of(operand: &Value) -> LodestoneResult<ElementMatcher> {
        let options = match operand {
            Value::Array(items) => items,
            _ => {
                log::error!("$in needs an array, found {}", operand);
                return Err(LodestoneError::new("$in needs an array", ErrorKind::SelectorError));
            }
        };

        let mut matchers = Vec::with_capacity(options.len());
        for option in options {
            if let Value::Regex(regex) = option {
                matchers.push(ElementMatcher::Regex(regex.clone()));
            } else if is_operator_object(option, false)? {
                log::error!("Cannot nest $ under $in: {}", option);
                return Err(LodestoneError::new(
                    "cannot nest $ under $in",
                    ErrorKind::SelectorError,
                ));
            } else {
                matchers.push(ElementMatcher::equality(option)?);
            }
        }
        Ok(ElementMatcher::In(matchers))
    }

    pub(crate) fn size(operand: &Value) -> LodestoneResult<ElementMatcher> {
        match operand {
            // a string operand matches only empty arrays
            Value::String(_) => Ok(ElementMatcher::Size(0.0)),
            Value::I64(_) | Value::F64(_) => Ok(ElementMatcher::Size(operand.as_f64().unwrap_or_default())),
            _ => {
                log::error!("$size needs a number, found {}", operand);
                Err(LodestoneError::new("$size needs a number", ErrorKind::SelectorError))
            }
        }
    }

    pub(crate) fn type_of(operand: &Value) -> LodestoneResult<ElementMatcher> {
        match operand {
            Value::String(alias) => match type_alias(alias) {
                Some(code) => Ok(ElementMatcher::Type(code)),
                None => {
                    log::error!("Unknown string alias for $type: {}", alias);
                    Err(LodestoneError::new(
                        &format!("unknown string alias for $type: {}", alias),
                        ErrorKind::SelectorError,
                    ))
                }
            },
            Value::I64(_) | Value::F64(_) => {
                let code = operand.as_f64().unwrap_or_default();
                if code == 0.0 || code < -1.0 || (code > 19.0 && code != 255.0) || code.fract() != 0.0 {
                    log::error!("Invalid numerical $type code: {}", operand);
                    return Err(LodestoneError::new(
                        &format!("Invalid numerical $type code: {}", operand),
                        ErrorKind::SelectorError,
                    ));
                }
                Ok(ElementMatcher::Type(code as i32))
            }
            _ => {
                log::error!("Argument to $type is not a number or a string: {}", operand);
                Err(LodestoneError::new(
                    "argument to $type is not a number or a string",
                    ErrorKind::SelectorError,
                ))
            }
        }
    }

    /// Builds the `$regex` matcher, honouring a sibling `$options`.
    pub(crate) fn regex_operator(operand: &Value, options: Option<&Value>) -> LodestoneResult<ElementMatcher> {
        let source = match operand {
            Value::String(s) => s.as_str(),
            Value::Regex(regex) => regex.pattern(),
            _ => {
                log::error!("$regex has to be a string or regular expression, found {}", operand);
                return Err(LodestoneError::new(
                    "$regex has to be a string or RegExp",
                    ErrorKind::SelectorError,
                ));
            }
        };

        let regex = match options {
            Some(options) => {
                let flags = options.as_str().unwrap_or_default();
                if flags.chars().any(|c| !matches!(c, 'g' | 'i' | 'm')) {
                    log::error!("Unsupported $options '{}'", flags);
                    return Err(LodestoneError::new(
                        "Only the i, m, and g regexp options are supported",
                        ErrorKind::SelectorError,
                    ));
                }
                RegexValue::new(source, flags)?
            }
            None => match operand {
                Value::Regex(regex) => regex.clone(),
                _ => RegexValue::new(source, "")?,
            },
        };
        Ok(ElementMatcher::Regex(regex))
    }

    /// Tests a single value, `None` standing for a missing field.
    pub(crate) fn test(&self, value: Option<&Value>) -> LodestoneResult<ElementOutcome> {
        match self {
            ElementMatcher::Equality(operand) => {
                Ok(value.is_some_and(|v| values_equal(operand, v, true)).into())
            }
            ElementMatcher::NullOrMissing => Ok(value.map_or(true, |v| v.is_null()).into()),
            ElementMatcher::Regex(regex) => Ok(match value {
                Some(Value::Regex(other)) => other == regex,
                Some(Value::String(text)) => regex.is_match(text),
                _ => false,
            }
            .into()),
            ElementMatcher::Inequality {
                operand,
                comparison,
            } => {
                let value = value.unwrap_or(&NULL_VALUE);
                if value.type_code() != operand.type_code() {
                    return Ok(ElementOutcome::Miss);
                }
                Ok(comparison.accepts(compare_values(value, operand)?).into())
            }
            ElementMatcher::Never => Ok(ElementOutcome::Miss),
            ElementMatcher::Mod { divisor, remainder } => Ok(match value.and_then(|v| v.as_f64()) {
                Some(number) => number % divisor == *remainder,
                None => false,
            }
            .into()),
            ElementMatcher::In(matchers) => {
                let value = Some(value.unwrap_or(&NULL_VALUE));
                for matcher in matchers {
                    if matcher.test(value)? != ElementOutcome::Miss {
                        return Ok(ElementOutcome::Hit);
                    }
                }
                Ok(ElementOutcome::Miss)
            }
            ElementMatcher::Size(size) => Ok(match value {
                Some(Value::Array(items)) => items.len() as f64 == *size,
                _ => false,
            }
            .into()),
            ElementMatcher::Type(code) => Ok(value.is_some_and(|v| v.type_code() == *code).into()),
            ElementMatcher::Exists => Ok(value.is_some().into()),
            ElementMatcher::ElemMatch(target) => {
                let items = match value {
                    Some(Value::Array(items)) => items,
                    _ => return Ok(ElementOutcome::Miss),
                };
                for (i, element) in items.iter().enumerate() {
                    let matched = match target {
                        ElemMatchTarget::Document(matcher) => {
                            if !element.is_indexable() {
                                return Ok(ElementOutcome::Miss);
                            }
                            matcher.evaluate(MatchRoot::Value(element))?.result
                        }
                        ElemMatchTarget::Value(matcher) => {
                            let branches = [Branch {
                                value: Some(element),
                                array_indices: Default::default(),
                                dont_iterate: true,
                            }];
                            matcher.evaluate(&branches)?.result
                        }
                    };
                    if matched {
                        return Ok(ElementOutcome::HitAt(i));
                    }
                }
                Ok(ElementOutcome::Miss)
            }
        }
    }
}

fn type_alias(alias: &str) -> Option<i32> {
    let code = match alias {
        "double" => 1,
        "string" => 2,
        "object" => 3,
        "array" => 4,
        "binData" => 5,
        "undefined" => 6,
        "objectId" => 7,
        "bool" => 8,
        "date" => 9,
        "null" => 10,
        "regex" => 11,
        "dbPointer" => 12,
        "javascript" => 13,
        "symbol" => 14,
        "javascriptWithScope" => 15,
        "int" => 16,
        "timestamp" => 17,
        "long" => 18,
        "decimal" => 19,
        "minKey" => -1,
        "maxKey" => 127,
        _ => return None,
    };
    Some(code)
}

impl Display for ElementMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementMatcher::Equality(v) => write!(f, "$eq {}", v),
            ElementMatcher::NullOrMissing => write!(f, "$eq null"),
            ElementMatcher::Regex(r) => write!(f, "$regex {}", r),
            ElementMatcher::Inequality { operand, comparison } => {
                write!(f, "{:?} {}", comparison, operand)
            }
            ElementMatcher::Never => write!(f, "never"),
            ElementMatcher::Mod { divisor, remainder } => write!(f, "$mod [{}, {}]", divisor, remainder),
            ElementMatcher::In(matchers) => write!(f, "$in ({} options)", matchers.len()),
            ElementMatcher::Size(size) => write!(f, "$size {}", size),
            ElementMatcher::Type(code) => write!(f, "$type {}", code),
            ElementMatcher::Exists => write!(f, "$exists"),
            ElementMatcher::ElemMatch(_) => write!(f, "$elemMatch"),
        }
    }
}
