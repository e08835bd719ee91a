use crate::collection::Document;
use crate::common::{Value, DOC_ID};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug)]
enum Rule {
    Field,
    Nested(IndexMap<String, Rule>),
}

/// A compiled `fields` option.
///
/// A projection either includes or excludes the listed paths; the two
/// cannot be mixed. `_id` is kept unless it is explicitly excluded, and an
/// explicit `_id: 0` may accompany an inclusion. Arrays met along a
/// projected path are projected element by element; under inclusion their
/// non-document elements are dropped.
#[derive(Clone, Debug)]
pub struct Projection {
    inner: Arc<ProjectionInner>,
}

#[derive(Debug)]
struct ProjectionInner {
    tree: IndexMap<String, Rule>,
    including: bool,
    include_id: bool,
}

impl Projection {
    /// The projection that keeps every field.
    pub fn identity() -> Projection {
        Projection {
            inner: Arc::new(ProjectionInner {
                tree: IndexMap::new(),
                including: false,
                include_id: true,
            }),
        }
    }

    pub fn compile(fields: &Document) -> LodestoneResult<Projection> {
        for (path, rule) in fields.iter() {
            check_supported(path, rule)?;
        }

        let mut paths: Vec<&String> = fields.keys().collect();
        paths.sort();
        let id_only = paths.len() == 1 && paths[0] == DOC_ID;
        let id_included = fields.get(DOC_ID).is_some_and(Value::is_truthy);
        if !id_only && !id_included {
            paths.retain(|path| *path != DOC_ID);
        }

        let mut including = None;
        for path in &paths {
            let rule = fields.get(path.as_str()).is_some_and(Value::is_truthy);
            match including {
                None => including = Some(rule),
                Some(including) if including != rule => {
                    return Err(projection_error(
                        "You cannot currently mix including and excluding fields.",
                    ))
                }
                Some(_) => {}
            }
        }

        let mut tree = IndexMap::new();
        for path in &paths {
            insert_path(&mut tree, path)?;
        }

        Ok(Projection {
            inner: Arc::new(ProjectionInner {
                tree,
                including: including.unwrap_or(false),
                include_id: fields.get(DOC_ID).map_or(true, Value::is_truthy),
            }),
        })
    }

    /// Compiles `fields` if present, otherwise the identity.
    pub fn from_option(fields: Option<&Document>) -> LodestoneResult<Projection> {
        match fields {
            Some(fields) => Projection::compile(fields),
            None => Ok(Projection::identity()),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.inner.tree.is_empty() && self.inner.include_id
    }

    pub fn apply(&self, doc: &Document) -> Document {
        if self.is_identity() {
            return doc.clone();
        }
        let mut result = self.project_document(doc, &self.inner.tree);
        match doc.get(DOC_ID) {
            Some(id) if self.inner.include_id => result.put_first(DOC_ID, id.clone()),
            _ => {
                result.remove(DOC_ID);
            }
        }
        result
    }

    fn project_document(&self, doc: &Document, tree: &IndexMap<String, Rule>) -> Document {
        let mut result = Document::new();
        for (key, value) in doc.iter() {
            match tree.get(key) {
                None if !self.inner.including => result.put(key.as_str(), value.clone()),
                None => {}
                Some(Rule::Field) if self.inner.including => result.put(key.as_str(), value.clone()),
                Some(Rule::Field) => {}
                Some(Rule::Nested(sub_tree)) => match value {
                    Value::Document(_) | Value::Array(_) => {
                        result.put(key.as_str(), self.project_value(value, sub_tree))
                    }
                    _ if !self.inner.including => result.put(key.as_str(), value.clone()),
                    _ => {}
                },
            }
        }
        result
    }

    fn project_value(&self, value: &Value, tree: &IndexMap<String, Rule>) -> Value {
        match value {
            Value::Document(doc) => Value::Document(self.project_document(doc, tree)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter(|item| !self.inner.including || item.is_document() || item.is_array())
                    .map(|item| self.project_value(item, tree))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn check_supported(path: &str, rule: &Value) -> LodestoneResult<()> {
    if path.split('.').any(|part| part == "$") {
        return Err(projection_error("The $ operator is not supported in projections"));
    }
    if let Value::Document(spec) = rule {
        if ["$elemMatch", "$meta", "$slice"].iter().any(|op| spec.contains_key(op)) {
            return Err(projection_error("Operators are not supported in projections"));
        }
    }
    let valid = match rule {
        Value::Bool(_) => true,
        Value::I64(n) => *n == 0 || *n == 1,
        Value::F64(n) => *n == 0.0 || *n == 1.0,
        _ => false,
    };
    if !valid {
        return Err(projection_error(
            "Projection values should be one of 1, 0, true, or false",
        ));
    }
    Ok(())
}

fn insert_path(tree: &mut IndexMap<String, Rule>, path: &str) -> LodestoneResult<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut node = tree;
    for (depth, part) in parts.iter().enumerate() {
        let last = depth + 1 == parts.len();
        if last {
            if node.contains_key(*part) {
                return Err(overlap_error(path, &parts[..=depth].join(".")));
            }
            node.insert(part.to_string(), Rule::Field);
            return Ok(());
        }
        let entry = node
            .entry(part.to_string())
            .or_insert_with(|| Rule::Nested(IndexMap::new()));
        node = match entry {
            Rule::Nested(children) => children,
            Rule::Field => return Err(overlap_error(path, &parts[..=depth].join("."))),
        };
    }
    Ok(())
}

fn overlap_error(path: &str, other: &str) -> LodestoneError {
    projection_error(&format!(
        "both {} and {} found in fields option, using both of them may trigger unexpected behavior. Did you mean to use only one of them?",
        other, path
    ))
}

fn projection_error(message: &str) -> LodestoneError {
    log::error!("{}", message);
    LodestoneError::new(message, ErrorKind::UsageError)
}
