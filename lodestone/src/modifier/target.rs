use crate::collection::Document;
use crate::common::{is_numeric_key, parse_array_index, Value};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{first_position, ArrayIndices};

/// Where a modifier operator applies, as resolved from its key path.
pub(crate) enum ModTarget<'a> {
    /// The path does not exist and the operator does not create it.
    Missing,
    /// The path goes through an array and the operator forbids that.
    CrossesArray,
    Field(&'a mut Document, String),
    /// Position in an array, never past its end.
    Element(&'a mut Vec<Value>, usize),
}

impl<'a> ModTarget<'a> {
    pub(crate) fn get(&self) -> Option<&Value> {
        match self {
            ModTarget::Field(doc, field) => doc.get(field),
            ModTarget::Element(items, index) => items.get(*index),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut Value> {
        match self {
            ModTarget::Field(doc, field) => doc.get_mut(field),
            ModTarget::Element(items, index) => items.get_mut(*index),
            _ => None,
        }
    }

    pub(crate) fn set(&mut self, value: Value) -> LodestoneResult<()> {
        match self {
            ModTarget::Field(doc, field) => {
                doc.put(field.as_str(), value);
                Ok(())
            }
            ModTarget::Element(items, index) => {
                if *index < items.len() {
                    items[*index] = value;
                } else {
                    items.push(value);
                }
                Ok(())
            }
            ModTarget::Missing | ModTarget::CrossesArray => {
                log::error!("Cannot set property on non-object field");
                Err(LodestoneError::new(
                    "Cannot set property on non-object field",
                    ErrorKind::ModifierError,
                ))
            }
        }
    }

    /// Deletes a field, or nulls an existing array slot.
    pub(crate) fn unset(&mut self) {
        match self {
            ModTarget::Field(doc, field) => {
                doc.remove(field);
            }
            ModTarget::Element(items, index) => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = Value::Null;
                }
            }
            ModTarget::Missing | ModTarget::CrossesArray => {}
        }
    }

    /// Removes and returns the value of a field.
    pub(crate) fn take(&mut self) -> Option<Value> {
        match self {
            ModTarget::Field(doc, field) => doc.remove(field),
            ModTarget::Element(items, index) => items.get_mut(*index).map(Value::take),
            ModTarget::Missing | ModTarget::CrossesArray => None,
        }
    }
}

/// Options for resolving a key path.
#[derive(Default, Clone, Copy)]
pub(crate) struct TargetOptions<'a> {
    /// Array positions the selector matched at, substituted for `$`.
    pub(crate) array_indices: Option<&'a ArrayIndices>,
    pub(crate) forbid_array: bool,
    pub(crate) no_create: bool,
}

enum Container<'a> {
    Object(&'a mut Document),
    Array(&'a mut Vec<Value>),
}

/// Walks `keyparts` from `doc` down to the container of the last part.
///
/// Missing intermediate documents are created unless `no_create` is set,
/// and numeric parts pad arrays with `null` up to the requested position.
pub(crate) fn find_mod_target<'a>(
    doc: &'a mut Document,
    keyparts: &[&str],
    options: TargetOptions<'_>,
) -> LodestoneResult<ModTarget<'a>> {
    let mut used_array_index = false;
    let mut current = Container::Object(doc);

    for (i, keypart) in keyparts.iter().enumerate() {
        let last = i + 1 == keyparts.len();

        let next: &'a mut Value = match current {
            Container::Array(items) => {
                if options.forbid_array {
                    return Ok(ModTarget::CrossesArray);
                }

                let index = if *keypart == "$" {
                    if used_array_index {
                        return Err(modifier_error("Too many positional (i.e. '$') elements"));
                    }
                    used_array_index = true;
                    options
                        .array_indices
                        .and_then(first_position)
                        .ok_or_else(|| {
                            modifier_error(
                                "The positional operator did not find the match needed from the query",
                            )
                        })?
                } else if is_numeric_key(keypart) {
                    parse_array_index(keypart).ok_or_else(|| {
                        modifier_error(&format!("array index {} is too large", keypart))
                    })?
                } else {
                    if options.no_create {
                        return Ok(ModTarget::Missing);
                    }
                    return Err(modifier_error(&format!(
                        "can't append to array using string field name [{}]",
                        keypart
                    )));
                };

                if options.no_create && index >= items.len() {
                    return Ok(ModTarget::Missing);
                }
                while items.len() < index {
                    items.push(Value::Null);
                }
                if last {
                    return Ok(ModTarget::Element(items, index));
                }

                if items.len() == index {
                    items.push(Value::Document(Document::new()));
                } else if !matches!(items[index], Value::Null) && !items[index].is_object_like() {
                    return Err(modifier_error(&format!(
                        "can't modify field '{}' of list value {}",
                        keyparts[i + 1],
                        items[index]
                    )));
                }
                &mut items[index]
            }
            Container::Object(doc) => {
                assert_valid_field_name(keypart)?;
                if !doc.contains_key(keypart) {
                    if options.no_create {
                        return Ok(ModTarget::Missing);
                    }
                    if !last {
                        doc.put(*keypart, Document::new());
                    }
                }
                if last {
                    return Ok(ModTarget::Field(doc, keypart.to_string()));
                }
                match doc.get_mut(keypart) {
                    Some(value) => value,
                    None => return Err(modifier_error("key path vanished during traversal")),
                }
            }
        };

        current = match next {
            Value::Document(doc) => Container::Object(doc),
            Value::Array(items) => Container::Array(items),
            other => {
                if options.no_create {
                    return Ok(ModTarget::Missing);
                }
                return Err(modifier_error(&format!(
                    "cannot use the part '{}' to traverse {}",
                    keyparts[i + 1],
                    other
                )));
            }
        };
    }

    Err(modifier_error("An empty update path is not valid."))
}

/// Rejects field names starting with `$` or containing `.` or NUL.
pub(crate) fn assert_valid_field_name(key: &str) -> LodestoneResult<()> {
    let problem = if key.starts_with('$') {
        Some("start with '$'")
    } else if key.contains('.') {
        Some("contain '.'")
    } else if key.contains('\0') {
        Some("contain null bytes")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(modifier_error(&format!("Key {} must not {}", key, problem))),
        None => Ok(()),
    }
}

/// Checks every key of every document nested in `value`.
pub(crate) fn assert_has_valid_field_names(value: &Value) -> LodestoneResult<()> {
    match value {
        Value::Document(doc) => {
            for (key, nested) in doc.iter() {
                assert_valid_field_name(key)?;
                assert_has_valid_field_names(nested)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(assert_has_valid_field_names),
        _ => Ok(()),
    }
}

pub(crate) fn modifier_error(message: &str) -> LodestoneError {
    log::error!("{}", message);
    LodestoneError::new(message, ErrorKind::ModifierError)
}
