//! Applying update modifiers to documents.
//!
//! A modifier is either a replacement document (no `$` keys at the top
//! level) or a document of update operators, each mapping key paths to
//! arguments:
//!
//! ```rust,ignore
//! let mut doc = doc! { _id: 1, tags: ["a"] };
//! modify(&mut doc, &doc! { "$push": { tags: "b" }, "$inc": { n: 1 } }, &ModifyOptions::default())?;
//! assert_eq!(doc, doc! { _id: 1, tags: ["a", "b"], n: 1 });
//! ```
mod operators;
mod target;
mod upsert;

pub use operators::ModifierOperator;
pub use upsert::create_upsert_document;

use crate::collection::Document;
use crate::common::{values_equal, Value, DOC_ID};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{is_operator_object, ArrayIndices};
use target::{assert_has_valid_field_names, find_mod_target, modifier_error, ModTarget, TargetOptions};

/// Options for [modify].
#[derive(Clone, Debug, Default)]
pub struct ModifyOptions {
    /// The document is being created by an upsert, which turns
    /// `$setOnInsert` into `$set`.
    pub is_insert: bool,
    /// Array positions the update's selector matched at, used to resolve
    /// the positional `$` key part.
    pub array_indices: Option<ArrayIndices>,
}

impl ModifyOptions {
    pub fn for_insert() -> ModifyOptions {
        ModifyOptions {
            is_insert: true,
            array_indices: None,
        }
    }

    pub fn with_array_indices(array_indices: Option<ArrayIndices>) -> ModifyOptions {
        ModifyOptions {
            is_insert: false,
            array_indices,
        }
    }
}

/// Returns true if `modifier` is made of update operators rather than being
/// a replacement document.
pub fn is_modifier(modifier: &Document) -> LodestoneResult<bool> {
    is_operator_object(&Value::Document(modifier.clone()), false)
}

/// Applies `modifier` to `doc` in place.
///
/// The update is computed on a copy, so `doc` is left untouched when any
/// part of the modifier fails.
///
/// # Errors
///
/// Invalid key paths, operator arguments and type mismatches are
/// `ModifierError`s. Changing the `_id` of a document is a `StoreError`.
pub fn modify(doc: &mut Document, modifier: &Document, options: &ModifyOptions) -> LodestoneResult<()> {
    let new_doc = if is_modifier(modifier)? {
        let mut new_doc = doc.clone();
        for (name, operand) in modifier.iter() {
            apply_operator(&mut new_doc, name, operand, options)?;
        }

        if let Some(old_id) = doc.id() {
            let unchanged = new_doc.id().is_some_and(|new_id| values_equal(old_id, new_id, false));
            if !unchanged {
                log::error!("Update altered the _id of {}", old_id);
                return Err(LodestoneError::new(
                    &format!(
                        "After applying the update to the document {{_id: {}, ...}}, the (immutable) field '_id' was found to have been altered",
                        old_id
                    ),
                    ErrorKind::StoreError,
                ));
            }
        }
        new_doc
    } else {
        if let (Some(old_id), Some(new_id)) = (doc.id(), modifier.id()) {
            if !values_equal(old_id, new_id, false) {
                log::error!("Replacement changes _id from {} to {}", old_id, new_id);
                return Err(LodestoneError::new(
                    &format!("The _id field cannot be changed from {{_id: {}}} to {{_id: {}}}", old_id, new_id),
                    ErrorKind::StoreError,
                ));
            }
        }
        for (key, value) in modifier.iter() {
            target::assert_valid_field_name(key)?;
            assert_has_valid_field_names(value)?;
        }
        modifier.clone()
    };

    // every key but _id is replaced; _id keeps its value and moves first
    let id = doc.remove(DOC_ID);
    doc.clear();
    if let Some(id) = id {
        doc.put(DOC_ID, id);
    }
    for (key, value) in new_doc {
        doc.put(key, value);
    }
    Ok(())
}

fn apply_operator(
    doc: &mut Document,
    name: &str,
    operand: &Value,
    options: &ModifyOptions,
) -> LodestoneResult<()> {
    let operator = ModifierOperator::from_name(name)
        .ok_or_else(|| modifier_error(&format!("Invalid modifier specified {}", name)))?;
    let operator = if options.is_insert && operator == ModifierOperator::SetOnInsert {
        ModifierOperator::Set
    } else {
        operator
    };
    let operand = operand
        .as_document()
        .ok_or_else(|| modifier_error(&format!("Modifier {} needs an object of key paths", name)))?;

    for (keypath, arg) in operand.iter() {
        if keypath.is_empty() {
            return Err(modifier_error("An empty update path is not valid."));
        }
        if keypath == DOC_ID && name != "$setOnInsert" {
            return Err(modifier_error("Mod on _id not allowed"));
        }
        let keyparts: Vec<&str> = keypath.split('.').collect();
        if keyparts.iter().any(|part| part.is_empty()) {
            return Err(modifier_error(&format!(
                "The update path '{}' contains an empty field name, which is not allowed.",
                keypath
            )));
        }

        if operator == ModifierOperator::Rename {
            rename(doc, &keyparts, keypath, arg)?;
            continue;
        }

        let mut target = find_mod_target(
            doc,
            &keyparts,
            TargetOptions {
                array_indices: options.array_indices.as_ref(),
                forbid_array: false,
                no_create: operator.no_create(),
            },
        )?;
        operator.apply(&mut target, arg, keypath)?;
    }
    Ok(())
}

/// Moves the value at `keyparts` to the path named by `arg`. Neither path
/// may go through an array. A missing source leaves the document as is.
fn rename(doc: &mut Document, keyparts: &[&str], keypath: &str, arg: &Value) -> LodestoneResult<()> {
    let to = arg
        .as_str()
        .ok_or_else(|| modifier_error(&format!("$rename target must be a string ({})", keypath)))?;
    if to == keypath {
        return Err(modifier_error(&format!("$rename source must differ from target ({})", keypath)));
    }
    if to.contains('\0') {
        return Err(modifier_error(
            "The 'to' field for $rename cannot contain an embedded null byte",
        ));
    }

    let source_options = TargetOptions {
        array_indices: None,
        forbid_array: true,
        no_create: true,
    };
    let value = match find_mod_target(doc, keyparts, source_options)? {
        ModTarget::CrossesArray => {
            return Err(modifier_error(&format!("$rename source field invalid ({})", keypath)))
        }
        ModTarget::Missing => None,
        mut source => source.take(),
    };
    let value = match value {
        Some(value) => value,
        None => return Ok(()),
    };

    let to_parts: Vec<&str> = to.split('.').collect();
    let destination_options = TargetOptions {
        array_indices: None,
        forbid_array: true,
        no_create: false,
    };
    match find_mod_target(doc, &to_parts, destination_options)? {
        ModTarget::CrossesArray => Err(modifier_error(&format!("$rename target field invalid ({})", keypath))),
        mut destination => destination.set(value),
    }
}

/// Checks the field names of a document about to be stored.
pub(crate) fn assert_valid_document(doc: &Document) -> LodestoneResult<()> {
    for (key, value) in doc.iter() {
        target::assert_valid_field_name(key)?;
        assert_has_valid_field_names(value)?;
    }
    Ok(())
}
