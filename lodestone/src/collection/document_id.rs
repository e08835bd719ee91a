use crate::common::{values_equal, Value};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};

/// The `_id` of a stored document, usable as a map key.
///
/// Only strings, numbers and object ids are valid ids. Numbers are equal and
/// hash equally across the integer and float variants.
#[derive(Clone)]
pub struct DocumentId(Value);

impl DocumentId {
    /// Wraps an id value.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidId` error for anything but a string, number or
    /// object id.
    pub fn new(value: Value) -> LodestoneResult<Self> {
        match value {
            Value::String(_) | Value::I64(_) | Value::F64(_) | Value::ObjectId(_) => {
                Ok(DocumentId(value))
            }
            other => {
                log::error!("Invalid document id {}", other);
                Err(LodestoneError::new(
                    &format!("Invalid document id {}: must be a string, number or object id", other),
                    ErrorKind::InvalidId,
                ))
            }
        }
    }

    /// Reads the `_id` of a document, if it has a valid one.
    pub fn of(doc: &crate::collection::Document) -> LodestoneResult<Self> {
        match doc.id() {
            Some(id) => DocumentId::new(id.clone()),
            None => {
                log::error!("Document {} has no _id", doc);
                Err(LodestoneError::new("Document has no _id", ErrorKind::InvalidId))
            }
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for DocumentId {
    fn eq(&self, other: &Self) -> bool {
        values_equal(&self.0, &other.0, true)
    }
}

impl Eq for DocumentId {}

impl Hash for DocumentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::I64(_) | Value::F64(_) => {
                0u8.hash(state);
                let f = self.0.as_f64().unwrap_or_default();
                let canonical = if f == 0.0 {
                    0.0f64
                } else if f.is_nan() {
                    f64::NAN
                } else {
                    f
                };
                canonical.to_bits().hash(state);
            }
            Value::String(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            Value::ObjectId(id) => {
                2u8.hash(state);
                id.hash(state);
            }
            _ => 3u8.hash(state),
        }
    }
}

impl TryFrom<Value> for DocumentId {
    type Error = LodestoneError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        DocumentId::new(value)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ObjectId;
    use crate::{doc, val};
    use std::collections::HashSet;

    #[test]
    fn accepts_scalar_ids() {
        assert!(DocumentId::new(val!("a")).is_ok());
        assert!(DocumentId::new(val!(1)).is_ok());
        assert!(DocumentId::new(val!(1.5)).is_ok());
        assert!(DocumentId::new(val!(ObjectId::new())).is_ok());
    }

    #[test]
    fn rejects_other_types() {
        for value in [Value::Null, val!(true), val!(doc! { a: 1 }), val!(vec![1])] {
            let err = DocumentId::new(value).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidId);
        }
    }

    #[test]
    fn numeric_ids_unify() {
        let mut set = HashSet::new();
        set.insert(DocumentId::new(val!(1)).unwrap());
        assert!(set.contains(&DocumentId::new(val!(1.0)).unwrap()));
        set.insert(DocumentId::new(val!(0.0)).unwrap());
        assert!(set.contains(&DocumentId::new(val!(-0.0)).unwrap()));
        assert!(!set.contains(&DocumentId::new(val!("1")).unwrap()));
    }

    #[test]
    fn reads_id_from_document() {
        let doc = doc! { _id: "x", a: 1 };
        assert_eq!(DocumentId::of(&doc).unwrap().value(), &val!("x"));
        assert!(DocumentId::of(&doc! { a: 1 }).is_err());
    }
}
