use crate::common::{values_equal, Value};
use crate::errors::LodestoneResult;
use crate::filter::ElementSelector;
use crate::modifier::target::{assert_has_valid_field_names, modifier_error, ModTarget};
use crate::sort::Sorter;

/// Update operators.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModifierOperator {
    Inc,
    Set,
    SetOnInsert,
    Unset,
    Push,
    PushAll,
    AddToSet,
    Pop,
    Pull,
    PullAll,
    Rename,
    Bit,
}

impl ModifierOperator {
    pub fn from_name(name: &str) -> Option<ModifierOperator> {
        let operator = match name {
            "$inc" => ModifierOperator::Inc,
            "$set" => ModifierOperator::Set,
            "$setOnInsert" => ModifierOperator::SetOnInsert,
            "$unset" => ModifierOperator::Unset,
            "$push" => ModifierOperator::Push,
            "$pushAll" => ModifierOperator::PushAll,
            "$addToSet" => ModifierOperator::AddToSet,
            "$pop" => ModifierOperator::Pop,
            "$pull" => ModifierOperator::Pull,
            "$pullAll" => ModifierOperator::PullAll,
            "$rename" => ModifierOperator::Rename,
            "$bit" => ModifierOperator::Bit,
            _ => return None,
        };
        Some(operator)
    }

    /// Operators that never create missing structure along their path.
    pub fn no_create(&self) -> bool {
        matches!(
            self,
            ModifierOperator::Unset
                | ModifierOperator::Pop
                | ModifierOperator::Rename
                | ModifierOperator::Pull
                | ModifierOperator::PullAll
        )
    }

    /// Applies the operator to the resolved target. `$rename` needs the
    /// whole document and is applied by the caller.
    pub(crate) fn apply(&self, target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
        match self {
            ModifierOperator::Inc => inc(target, arg, field),
            ModifierOperator::Set => {
                assert_has_valid_field_names(arg)?;
                target.set(arg.clone())
            }
            ModifierOperator::SetOnInsert | ModifierOperator::Rename => Ok(()),
            ModifierOperator::Unset => {
                target.unset();
                Ok(())
            }
            ModifierOperator::Push => push(target, arg, field),
            ModifierOperator::PushAll => push_all(target, arg, field),
            ModifierOperator::AddToSet => add_to_set(target, arg, field),
            ModifierOperator::Pop => pop(target, arg, field),
            ModifierOperator::Pull => pull(target, arg, field),
            ModifierOperator::PullAll => pull_all(target, arg, field),
            ModifierOperator::Bit => Err(modifier_error(&format!("$bit is not supported ({})", field))),
        }
    }
}

fn inc(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    if !arg.is_number() {
        return Err(modifier_error(&format!(
            "Modifier $inc allowed for numbers only ({})",
            field
        )));
    }
    let sum = match target.get() {
        None => arg.clone(),
        Some(Value::I64(current)) => match (arg, current.checked_add(arg.as_i64().unwrap_or_default())) {
            (Value::I64(_), Some(sum)) => Value::I64(sum),
            _ => Value::F64(*current as f64 + arg.as_f64().unwrap_or_default()),
        },
        Some(Value::F64(current)) => Value::F64(current + arg.as_f64().unwrap_or_default()),
        Some(_) => {
            return Err(modifier_error(&format!(
                "Cannot apply $inc modifier to non-number ({})",
                field
            )))
        }
    };
    target.set(sum)
}

fn array_at<'t>(target: &'t mut ModTarget<'_>, operator: &str, field: &str) -> LodestoneResult<&'t mut Vec<Value>> {
    match target.get_mut() {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(modifier_error(&format!(
            "Cannot apply {} modifier to non-array ({})",
            operator, field
        ))),
    }
}

fn push(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    if target.get().is_none() {
        target.set(Value::Array(Vec::new()))?;
    }
    array_at(target, "$push", field)?;

    let each = match arg {
        Value::Document(spec) => spec.get("$each"),
        _ => None,
    };
    let (spec, to_push) = match (arg, each) {
        (Value::Document(spec), Some(each)) => (spec, each),
        _ => {
            assert_has_valid_field_names(arg)?;
            array_at(target, "$push", field)?.push(arg.clone());
            return Ok(());
        }
    };

    let to_push = match to_push {
        Value::Array(items) => items,
        _ => return Err(modifier_error(&format!("$each must be an array ({})", field))),
    };
    assert_has_valid_field_names(&Value::Array(to_push.clone()))?;

    let position = match spec.get("$position") {
        None => None,
        Some(position) => match position.as_f64() {
            Some(p) if p >= 0.0 => Some(p as usize),
            Some(_) => {
                return Err(modifier_error(&format!(
                    "$position in $push must be zero or positive ({})",
                    field
                )))
            }
            None => {
                return Err(modifier_error(&format!(
                    "$position must be a numeric value ({})",
                    field
                )))
            }
        },
    };

    let slice = match spec.get("$slice") {
        None => None,
        Some(slice) => match slice.as_f64() {
            Some(s) if s <= 0.0 => Some(s.abs() as usize),
            Some(_) => {
                return Err(modifier_error(&format!(
                    "$slice in $push must be zero or negative ({})",
                    field
                )))
            }
            None => {
                return Err(modifier_error(&format!(
                    "$slice must be a numeric value ({})",
                    field
                )))
            }
        },
    };

    let sorter = match spec.get("$sort") {
        Some(sort) if sort.is_truthy() => {
            if slice.is_none() {
                return Err(modifier_error(&format!("$sort requires $slice to be present ({})", field)));
            }
            if !to_push.iter().all(Value::is_document) {
                return Err(modifier_error(&format!(
                    "$push like modifiers using $sort require all elements to be objects ({})",
                    field
                )));
            }
            Some(Sorter::new(sort)?)
        }
        _ => None,
    };

    let items = array_at(target, "$push", field)?;
    match position {
        Some(position) => {
            let position = position.min(items.len());
            items.splice(position..position, to_push.iter().cloned());
        }
        None => items.extend(to_push.iter().cloned()),
    }
    if let Some(sorter) = sorter {
        sorter.sort_values(items)?;
    }
    if let Some(keep) = slice {
        // keeps the last `keep` elements
        let drop = items.len().saturating_sub(keep);
        items.drain(..drop);
    }
    Ok(())
}

fn push_all(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    let values = match arg {
        Value::Array(values) => values,
        _ => return Err(modifier_error("Modifier $pushAll/pullAll allowed for arrays only")),
    };
    assert_has_valid_field_names(arg)?;
    if target.get().is_none() {
        return target.set(arg.clone());
    }
    array_at(target, "$pushAll", field)?.extend(values.iter().cloned());
    Ok(())
}

fn add_to_set(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    let each = match arg {
        Value::Document(spec) if spec.keys().next().map(String::as_str) == Some("$each") => spec.get("$each"),
        _ => None,
    };
    let values = match each {
        Some(Value::Array(values)) => values.clone(),
        Some(_) => return Err(modifier_error(&format!("$each must be an array ({})", field))),
        None => vec![arg.clone()],
    };
    assert_has_valid_field_names(&Value::Array(values.clone()))?;

    if target.get().is_none() {
        return target.set(Value::Array(values));
    }
    let items = array_at(target, "$addToSet", field)?;
    for value in values {
        if !items.iter().any(|item| values_equal(&value, item, false)) {
            items.push(value);
        }
    }
    Ok(())
}

fn pop(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    if target.get().is_none() {
        return Ok(());
    }
    let items = array_at(target, "$pop", field)?;
    if arg.as_f64().is_some_and(|n| n < 0.0) {
        if !items.is_empty() {
            items.remove(0);
        }
    } else {
        items.pop();
    }
    Ok(())
}

fn pull(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    if target.get().is_none() {
        return Ok(());
    }
    let items = array_at(target, "$pull/pullAll", field)?;
    match arg {
        Value::Document(condition) => {
            let selector = ElementSelector::compile(condition)?;
            let mut kept = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                if !selector.matches(&item)? {
                    kept.push(item);
                }
            }
            *items = kept;
        }
        _ => items.retain(|item| !values_equal(item, arg, false)),
    }
    Ok(())
}

fn pull_all(target: &mut ModTarget<'_>, arg: &Value, field: &str) -> LodestoneResult<()> {
    let values = match arg {
        Value::Array(values) => values,
        _ => return Err(modifier_error("Modifier $pushAll/pullAll allowed for arrays only")),
    };
    if target.get().is_none() {
        return Ok(());
    }
    let items = array_at(target, "$pull/pullAll", field)?;
    items.retain(|item| !values.iter().any(|value| values_equal(item, value, false)));
    Ok(())
}
