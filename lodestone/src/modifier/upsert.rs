use crate::collection::Document;
use crate::common::{Value, DOC_ID};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::selector_is_id;
use crate::modifier::target::assert_has_valid_field_names;
use crate::modifier::{is_modifier, modify, ModifyOptions};

/// Builds the document an upsert inserts when its selector matched nothing.
///
/// Equality constraints of the selector (plain values, `$eq`, each `$all`
/// element, the clauses of `$and` and a lone `$or` clause) are set first,
/// then the modifier is applied as an insert. A replacement modifier
/// replaces everything but the `_id` taken from the selector.
pub fn create_upsert_document(selector: &Value, modifier: &Document) -> LodestoneResult<Document> {
    let mut query_fields = Document::new();
    populate_with_query_fields(selector, &mut query_fields)?;

    let mut new_doc = Document::new();
    if let Some(id) = query_fields.remove(DOC_ID) {
        new_doc.put(DOC_ID, id);
    }
    let mut set_query_fields = Document::new();
    set_query_fields.put("$set", query_fields);
    modify(&mut new_doc, &set_query_fields, &ModifyOptions::default())?;
    modify(&mut new_doc, modifier, &ModifyOptions::for_insert())?;

    if is_modifier(modifier)? {
        return Ok(new_doc);
    }
    let mut replacement = modifier.clone();
    if let Some(id) = new_doc.id() {
        replacement.put_first(DOC_ID, id.clone());
    }
    Ok(replacement)
}

fn populate_with_query_fields(selector: &Value, fields: &mut Document) -> LodestoneResult<()> {
    let query = match selector {
        Value::Document(query) => query,
        id if selector_is_id(id) => return insert_field(fields, DOC_ID, id.clone()),
        _ => return Ok(()),
    };

    for (key, value) in query.iter() {
        match (key.as_str(), value) {
            ("$and", Value::Array(clauses)) => {
                for clause in clauses {
                    populate_with_query_fields(clause, fields)?;
                }
            }
            ("$or", Value::Array(clauses)) if clauses.len() == 1 => {
                populate_with_query_fields(&clauses[0], fields)?;
            }
            (key, _) if key.starts_with('$') => {}
            (key, value) => populate_with_key_value(fields, key, value)?,
        }
    }
    Ok(())
}

fn populate_with_key_value(fields: &mut Document, key: &str, value: &Value) -> LodestoneResult<()> {
    match value {
        Value::Document(object) => populate_with_object(fields, key, object),
        Value::Regex(_) => Ok(()),
        other => insert_field(fields, key, other.clone()),
    }
}

fn populate_with_object(fields: &mut Document, key: &str, object: &Document) -> LodestoneResult<()> {
    let unprefixed: Vec<&String> = object.keys().filter(|k| !k.starts_with('$')).collect();
    if !unprefixed.is_empty() || object.is_empty() {
        if unprefixed.len() != object.size() {
            return Err(upsert_error(&format!("unknown operator: {}", unprefixed[0])));
        }
        let value = Value::Document(object.clone());
        assert_has_valid_field_names(&value)?;
        return insert_field(fields, key, value);
    }

    for (operator, operand) in object.iter() {
        match (operator.as_str(), operand) {
            ("$eq", operand) => populate_with_key_value(fields, key, operand)?,
            ("$all", Value::Array(elements)) => {
                for element in elements {
                    populate_with_key_value(fields, key, element)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn insert_field(fields: &mut Document, key: &str, value: Value) -> LodestoneResult<()> {
    for existing in fields.keys() {
        if existing == key {
            return Err(upsert_error(&format!(
                "cannot infer query fields to set, path '{}' is matched twice",
                key
            )));
        }
        if existing.starts_with(&format!("{}.", key)) || key.starts_with(&format!("{}.", existing)) {
            return Err(upsert_error(&format!(
                "cannot infer query fields to set, both paths '{}' and '{}' are matched",
                existing, key
            )));
        }
    }
    fields.put(key, value);
    Ok(())
}

fn upsert_error(message: &str) -> LodestoneError {
    log::error!("{}", message);
    LodestoneError::new(message, ErrorKind::SelectorError)
}
