use crate::collection::{Document, DocumentId};
use crate::diff::{fields_without_id, make_changed_fields, project, DiffObserver, ProjectionFn};
use std::collections::{HashMap, HashSet};

/// Reports the events that turn `old_results` into `new_results`.
///
/// Documents on the longest common subsequence of ids (by old position)
/// stay put. Every other surviving document is moved before the next
/// unmoved one, or before the end of the results. Removals are reported
/// first, then additions, moves and changes group by group.
pub fn diff_ordered(
    old_results: &[Document],
    new_results: &[Document],
    observer: &mut dyn DiffObserver,
    projection: Option<ProjectionFn<'_>>,
) {
    let new_ids: Vec<Option<DocumentId>> = new_results.iter().map(id_of).collect();
    let mut new_presence = HashSet::with_capacity(new_ids.len());
    for id in new_ids.iter().flatten() {
        if !new_presence.insert(id.clone()) {
            log::warn!("Duplicate _id {} in new results", id);
        }
    }

    let mut old_index_of_id = HashMap::with_capacity(old_results.len());
    for (index, doc) in old_results.iter().enumerate() {
        if let Some(id) = id_of(doc) {
            if old_index_of_id.insert(id.clone(), index).is_some() {
                log::warn!("Duplicate _id {} in old results", id);
            }
        }
    }

    let old_index = |i: usize| new_ids[i].as_ref().and_then(|id| old_index_of_id.get(id).copied());
    let mut unmoved = longest_increasing_run(new_results.len(), old_index);
    // the last group is anchored by the end of the results
    unmoved.push(new_results.len());

    for doc in old_results {
        if let Some(id) = id_of(doc) {
            if !new_presence.contains(&id) {
                observer.removed(&id);
            }
        }
    }

    let mut start_of_group = 0;
    for end_of_group in unmoved {
        let group_id = new_ids.get(end_of_group).cloned().flatten();
        for i in start_of_group..end_of_group {
            let new_doc = &new_results[i];
            let Some(id) = &new_ids[i] else {
                log::warn!("Skipping document without _id {}", new_doc);
                continue;
            };
            match old_index_of_id.get(id) {
                None => {
                    let fields = fields_without_id(new_doc, projection);
                    observer.added_before(id, fields, group_id.as_ref());
                }
                Some(&old) => {
                    report_changes(id, &old_results[old], new_doc, observer, projection);
                    observer.moved_before(id, group_id.as_ref());
                }
            }
        }
        if let Some(id) = &group_id {
            if let Some(&old) = old_index_of_id.get(id) {
                report_changes(id, &old_results[old], &new_results[end_of_group], observer, projection);
            }
        }
        start_of_group = end_of_group + 1;
    }
}

fn id_of(doc: &Document) -> Option<DocumentId> {
    doc.id().and_then(|id| DocumentId::new(id.clone()).ok())
}

fn report_changes(
    id: &DocumentId,
    old_doc: &Document,
    new_doc: &Document,
    observer: &mut dyn DiffObserver,
    projection: Option<ProjectionFn<'_>>,
) {
    let fields = make_changed_fields(&project(new_doc, projection), &project(old_doc, projection));
    if !fields.is_empty() {
        observer.changed(id, fields);
    }
}

/// Indices `i < len` forming the longest strictly increasing run of
/// `old_index(i)`, skipping indices that have none.
///
/// Each candidate extends the longest run found so far by scanning back
/// from the longest one, which is quick when few documents moved.
fn longest_increasing_run(len: usize, old_index: impl Fn(usize) -> Option<usize>) -> Vec<usize> {
    let mut seq_ends: Vec<usize> = Vec::with_capacity(len);
    let mut predecessors: Vec<Option<usize>> = vec![None; len];

    for i in 0..len {
        let Some(current) = old_index(i) else { continue };
        let mut j = seq_ends.len();
        while j > 0 {
            if old_index(seq_ends[j - 1]).is_some_and(|end| end < current) {
                break;
            }
            j -= 1;
        }
        predecessors[i] = if j == 0 { None } else { Some(seq_ends[j - 1]) };
        if j == seq_ends.len() {
            seq_ends.push(i);
        } else {
            seq_ends[j] = i;
        }
    }

    let mut run = Vec::with_capacity(seq_ends.len());
    let mut cursor = seq_ends.last().copied();
    while let Some(index) = cursor {
        run.push(index);
        cursor = predecessors[index];
    }
    run.reverse();
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use crate::diff::{apply_changes, ChangedFields};
    use crate::doc;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        docs: Vec<Document>,
    }

    impl Recorder {
        fn seeded(docs: &[Document]) -> Self {
            Recorder {
                events: Vec::new(),
                docs: docs.to_vec(),
            }
        }

        fn position(&self, id: &DocumentId) -> Option<usize> {
            self.docs
                .iter()
                .position(|doc| doc.id().is_some_and(|doc_id| doc_id == id.value()))
        }

        fn insert_before(&mut self, doc: Document, before: Option<&DocumentId>) {
            let index = before
                .and_then(|id| self.position(id))
                .unwrap_or(self.docs.len());
            self.docs.insert(index, doc);
        }
    }

    fn name(id: &DocumentId) -> String {
        match id.value() {
            Value::String(s) => s.clone(),
            other => format!("{:?}", other.as_f64()),
        }
    }

    fn anchor(before: Option<&DocumentId>) -> String {
        before.map(name).unwrap_or_else(|| "end".to_string())
    }

    impl DiffObserver for Recorder {
        fn added_before(&mut self, id: &DocumentId, fields: Document, before: Option<&DocumentId>) {
            self.events.push(format!("added {} before {}", name(id), anchor(before)));
            let mut doc = fields;
            doc.put_first("_id", id.value().clone());
            self.insert_before(doc, before);
        }

        fn changed(&mut self, id: &DocumentId, fields: ChangedFields) {
            self.events.push(format!("changed {}", name(id)));
            let index = self.position(id).unwrap();
            apply_changes(&mut self.docs[index], &fields);
        }

        fn moved_before(&mut self, id: &DocumentId, before: Option<&DocumentId>) {
            self.events.push(format!("moved {} before {}", name(id), anchor(before)));
            let index = self.position(id).unwrap();
            let doc = self.docs.remove(index);
            self.insert_before(doc, before);
        }

        fn removed(&mut self, id: &DocumentId) {
            self.events.push(format!("removed {}", name(id)));
            let index = self.position(id).unwrap();
            self.docs.remove(index);
        }
    }

    fn docs(ids: &[&str]) -> Vec<Document> {
        ids.iter().map(|id| doc! { _id: (*id), v: 1 }).collect()
    }

    fn replay(old: &[Document], new: &[Document]) -> Recorder {
        let mut recorder = Recorder::seeded(old);
        diff_ordered(old, new, &mut recorder, None);
        assert_eq!(recorder.docs, new.to_vec());
        for (replayed, expected) in recorder.docs.iter().zip(new) {
            assert_eq!(replayed.id(), expected.id());
        }
        recorder
    }

    #[test]
    fn longest_run_of_old_positions() {
        let old = [Some(0), Some(3), None, Some(1), Some(2)];
        assert_eq!(longest_increasing_run(old.len(), |i| old[i]), vec![0, 3, 4]);
        assert!(longest_increasing_run(0, |_| None).is_empty());
    }

    #[test]
    fn identical_results_report_nothing() {
        let old = docs(&["a", "b", "c"]);
        let recorder = replay(&old, &old.clone());
        assert!(recorder.events.is_empty());
    }

    #[test]
    fn additions_and_removals() {
        let recorder = replay(&docs(&["a", "b", "c"]), &docs(&["x", "a", "c", "y"]));
        assert_eq!(
            recorder.events,
            vec!["removed b", "added x before a", "added y before end"]
        );
    }

    #[test]
    fn moves_keep_the_longest_common_run() {
        let recorder = replay(&docs(&["a", "b", "c", "d"]), &docs(&["d", "a", "b", "c"]));
        assert_eq!(recorder.events.len(), 1);
        assert_eq!(recorder.events[0], "moved d before a");
    }

    #[test]
    fn changes_are_reported_with_moves() {
        let old = vec![doc! { _id: 1, v: 1 }, doc! { _id: 2, v: 1 }];
        let new = vec![doc! { _id: 2, v: 2 }, doc! { _id: 1, v: 1, w: 3 }];
        let recorder = replay(&old, &new);
        assert_eq!(recorder.events.iter().filter(|e| e.starts_with("changed")).count(), 2);
        assert_eq!(recorder.events.iter().filter(|e| e.starts_with("moved")).count(), 1);
    }

    #[test]
    fn replays_mixed_edits() {
        let scenarios = [
            (vec!["a", "b", "c", "d", "e"], vec!["e", "d", "c", "b", "a"]),
            (vec!["a", "b", "c"], vec![]),
            (vec![], vec!["a", "b"]),
            (vec!["a", "b", "c", "d"], vec!["c", "x", "a", "d", "y"]),
            (vec!["a", "b", "c", "d", "e", "f"], vec!["b", "f", "a", "e", "c"]),
        ];
        for (old, new) in scenarios {
            replay(&docs(&old), &docs(&new));
        }
    }

    #[test]
    fn projection_limits_reported_fields() {
        let old = vec![doc! { _id: 1, a: 1, secret: 1 }];
        let new = vec![doc! { _id: 1, a: 1, secret: 2 }, doc! { _id: 2, a: 2, secret: 3 }];
        let hide = |doc: &Document| {
            let mut projected = doc.clone();
            projected.remove("secret");
            projected
        };

        struct Fields(Vec<Document>, usize);
        impl DiffObserver for Fields {
            fn added_before(&mut self, _: &DocumentId, fields: Document, _: Option<&DocumentId>) {
                self.0.push(fields);
            }
            fn changed(&mut self, _: &DocumentId, _: ChangedFields) {
                self.1 += 1;
            }
        }

        let mut observer = Fields(Vec::new(), 0);
        diff_ordered(&old, &new, &mut observer, Some(&hide));
        assert_eq!(observer.0, vec![doc! { a: 2 }]);
        assert_eq!(observer.1, 0);
        assert!(!observer.0[0].contains_key("_id"));
        assert_eq!(observer.0[0].get("a"), Some(&Value::from(2)));
    }
}
