use crate::collection::{Document, DocumentId};
use crate::diff::{fields_without_id, make_changed_fields, project, DiffObserver, ProjectionFn};
use crate::common::documents_equal;
use indexmap::IndexMap;

/// Reports the events that turn `old_results` into `new_results` when
/// result order does not matter: additions and changes in the order of
/// `new_results`, then removals in the order of `old_results`.
pub fn diff_unordered(
    old_results: &IndexMap<DocumentId, Document>,
    new_results: &IndexMap<DocumentId, Document>,
    observer: &mut dyn DiffObserver,
    projection: Option<ProjectionFn<'_>>,
) {
    for (id, new_doc) in new_results {
        match old_results.get(id) {
            Some(old_doc) => {
                if !documents_equal(old_doc, new_doc, false) {
                    let fields =
                        make_changed_fields(&project(new_doc, projection), &project(old_doc, projection));
                    if !fields.is_empty() {
                        observer.changed(id, fields);
                    }
                }
            }
            None => observer.added(id, fields_without_id(new_doc, projection)),
        }
    }

    for id in old_results.keys() {
        if !new_results.contains_key(id) {
            observer.removed(id);
        }
    }
}
