//! Turning two snapshots of a result set into change events.
//!
//! Ordered results are diffed by keeping the longest run of documents
//! common to both snapshots in place and moving everything else around
//! them. Unordered results are diffed by id.
mod ordered;
mod unordered;

pub use ordered::diff_ordered;
pub use unordered::diff_unordered;

use crate::collection::{Document, DocumentId};
use crate::common::{values_equal, Value, DOC_ID};
use indexmap::IndexMap;

/// Fields changed between two versions of a document. `None` marks a field
/// that was removed.
pub type ChangedFields = IndexMap<String, Option<Value>>;

/// Maps a document to the part of it observers see.
pub type ProjectionFn<'a> = &'a dyn Fn(&Document) -> Document;

/// A result set, in query order or keyed by id.
#[derive(Clone, Debug)]
pub enum QueryResults {
    Ordered(Vec<Document>),
    Unordered(IndexMap<DocumentId, Document>),
}

impl QueryResults {
    pub fn new(ordered: bool) -> QueryResults {
        if ordered {
            QueryResults::Ordered(Vec::new())
        } else {
            QueryResults::Unordered(IndexMap::new())
        }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self, QueryResults::Ordered(_))
    }

    pub fn len(&self) -> usize {
        match self {
            QueryResults::Ordered(docs) => docs.len(),
            QueryResults::Unordered(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            QueryResults::Ordered(docs) => docs.clear(),
            QueryResults::Unordered(docs) => docs.clear(),
        }
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        match self {
            QueryResults::Ordered(docs) => docs
                .iter()
                .find(|doc| doc.id().is_some_and(|doc_id| values_equal(doc_id, id.value(), true))),
            QueryResults::Unordered(docs) => docs.get(id),
        }
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.get(id).is_some()
    }

    /// Documents in result order (insertion order when unordered).
    pub fn documents(&self) -> Vec<&Document> {
        match self {
            QueryResults::Ordered(docs) => docs.iter().collect(),
            QueryResults::Unordered(docs) => docs.values().collect(),
        }
    }

    pub fn into_documents(self) -> Vec<Document> {
        match self {
            QueryResults::Ordered(docs) => docs,
            QueryResults::Unordered(docs) => docs.into_values().collect(),
        }
    }
}

/// Receives the events of a diff.
///
/// Ordered diffs report `added_before` and `moved_before`; unordered diffs
/// report `added`. A `None` position means the end of the results.
pub trait DiffObserver {
    fn added(&mut self, _id: &DocumentId, _fields: Document) {}

    fn added_before(&mut self, _id: &DocumentId, _fields: Document, _before: Option<&DocumentId>) {}

    fn changed(&mut self, _id: &DocumentId, _fields: ChangedFields) {}

    fn moved_before(&mut self, _id: &DocumentId, _before: Option<&DocumentId>) {}

    fn removed(&mut self, _id: &DocumentId) {}
}

/// Diffs two snapshots of the same kind.
pub fn diff_query_changes(
    old_results: &QueryResults,
    new_results: &QueryResults,
    observer: &mut dyn DiffObserver,
    projection: Option<ProjectionFn<'_>>,
) {
    match (old_results, new_results) {
        (QueryResults::Ordered(old), QueryResults::Ordered(new)) => {
            diff_ordered(old, new, observer, projection)
        }
        (QueryResults::Unordered(old), QueryResults::Unordered(new)) => {
            diff_unordered(old, new, observer, projection)
        }
        _ => log::warn!("Cannot diff ordered results against unordered ones"),
    }
}

/// Fields of `new_doc` that differ from `old_doc`, including fields that
/// were removed.
pub fn make_changed_fields(new_doc: &Document, old_doc: &Document) -> ChangedFields {
    let mut fields = ChangedFields::new();
    for (key, old_value) in old_doc.iter() {
        match new_doc.get(key) {
            Some(new_value) => {
                if !values_equal(old_value, new_value, false) {
                    fields.insert(key.clone(), Some(new_value.clone()));
                }
            }
            None => {
                fields.insert(key.clone(), None);
            }
        }
    }
    for (key, new_value) in new_doc.iter() {
        if !old_doc.contains_key(key) {
            fields.insert(key.clone(), Some(new_value.clone()));
        }
    }
    fields
}

/// Applies changed fields to `doc`.
pub fn apply_changes(doc: &mut Document, fields: &ChangedFields) {
    for (key, value) in fields {
        match value {
            Some(value) => doc.put(key.as_str(), value.clone()),
            None => {
                doc.remove(key);
            }
        }
    }
}

pub(crate) fn project(doc: &Document, projection: Option<ProjectionFn<'_>>) -> Document {
    match projection {
        Some(projection) => projection(doc),
        None => doc.clone(),
    }
}

pub(crate) fn fields_without_id(doc: &Document, projection: Option<ProjectionFn<'_>>) -> Document {
    let mut fields = project(doc, projection);
    fields.remove(DOC_ID);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn changed_fields() {
        let old = doc! { _id: 1, a: 1, b: 2, c: { d: 1 } };
        let new = doc! { _id: 1, a: 1, c: { d: 2 }, e: 5 };
        let fields = make_changed_fields(&new, &old);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get("b"), Some(&None));
        assert_eq!(fields.get("c"), Some(&Some(Value::from(doc! { d: 2 }))));
        assert_eq!(fields.get("e"), Some(&Some(Value::from(5))));

        let mut patched = old.clone();
        apply_changes(&mut patched, &fields);
        assert_eq!(patched, new);
    }

    #[test]
    fn unchanged_documents_have_no_fields() {
        let doc = doc! { a: 1, b: [1, 2] };
        assert!(make_changed_fields(&doc, &doc.clone()).is_empty());
        // key order alone is not a change
        assert!(make_changed_fields(&doc! { b: [1, 2], a: 1 }, &doc).is_empty());
    }

    #[test]
    fn results_lookup() {
        let mut results = QueryResults::new(true);
        if let QueryResults::Ordered(docs) = &mut results {
            docs.push(doc! { _id: 1, a: 1 });
        }
        let id = DocumentId::new(Value::from(1.0)).unwrap();
        assert!(results.contains(&id));
        assert_eq!(results.len(), 1);
        results.clear();
        assert!(results.is_empty());
        assert!(!QueryResults::new(false).is_ordered());
    }
}
