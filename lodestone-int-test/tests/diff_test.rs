use indexmap::IndexMap;
use lodestone::collection::{Document, DocumentId};
use lodestone::diff::{apply_changes, diff_ordered, diff_unordered, ChangedFields, DiffObserver};
use lodestone::{doc, val};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

#[ctor::ctor]
fn init() {
    colog::init();
}

/// Replays ordered diff events on its own copy of the old results.
struct Replay {
    docs: Vec<Document>,
}

impl Replay {
    fn index_of(&self, id: &DocumentId) -> usize {
        self.docs
            .iter()
            .position(|doc| &DocumentId::of(doc).unwrap() == id)
            .unwrap_or_else(|| panic!("{} is not in the results", id))
    }

    fn insert_before(&mut self, doc: Document, before: Option<&DocumentId>) {
        match before {
            Some(before) => {
                let index = self.index_of(before);
                self.docs.insert(index, doc);
            }
            None => self.docs.push(doc),
        }
    }
}

impl DiffObserver for Replay {
    fn added_before(&mut self, id: &DocumentId, fields: Document, before: Option<&DocumentId>) {
        let mut doc = fields;
        doc.put_first("_id", id.value().clone());
        self.insert_before(doc, before);
    }

    fn changed(&mut self, id: &DocumentId, fields: ChangedFields) {
        let index = self.index_of(id);
        apply_changes(&mut self.docs[index], &fields);
    }

    fn moved_before(&mut self, id: &DocumentId, before: Option<&DocumentId>) {
        let doc = self.docs.remove(self.index_of(id));
        self.insert_before(doc, before);
    }

    fn removed(&mut self, id: &DocumentId) {
        self.docs.remove(self.index_of(id));
    }
}

#[derive(Default)]
struct Touched {
    added: HashSet<DocumentId>,
    changed: HashSet<DocumentId>,
    removed: HashSet<DocumentId>,
}

impl DiffObserver for Touched {
    fn added(&mut self, id: &DocumentId, _fields: Document) {
        assert!(self.added.insert(id.clone()));
    }

    fn changed(&mut self, id: &DocumentId, _fields: ChangedFields) {
        assert!(self.changed.insert(id.clone()));
    }

    fn removed(&mut self, id: &DocumentId) {
        assert!(self.removed.insert(id.clone()));
    }
}

fn document(id: i64, rng: &mut StdRng) -> Document {
    let mut doc = doc! { _id: id, v: (rng.gen_range(0..3i64)) };
    if rng.gen_bool(0.5) {
        doc.put("w", rng.gen_range(0..3i64));
    }
    doc
}

/// A random old result list and a new one made from it by removals,
/// changes, insertions and a shuffle.
fn random_pair(rng: &mut StdRng) -> (Vec<Document>, Vec<Document>) {
    let old: Vec<Document> = (0..rng.gen_range(0..10))
        .map(|id| document(id, rng))
        .collect();

    let mut new = Vec::new();
    for doc in &old {
        match rng.gen_range(0..4) {
            0 => {}
            1 => {
                let id = doc.id().and_then(|id| id.as_i64()).unwrap();
                new.push(document(id, rng));
            }
            _ => new.push(doc.clone()),
        }
    }
    for id in 100..100 + rng.gen_range(0..4) {
        new.push(document(id, rng));
    }
    if rng.gen_bool(0.7) {
        new.shuffle(rng);
    }
    (old, new)
}

fn assert_replays(old: &[Document], new: &[Document]) {
    let mut replay = Replay { docs: old.to_vec() };
    diff_ordered(old, new, &mut replay, None);
    assert_eq!(replay.docs, new, "replaying {:?} -> {:?}", old, new);
}

fn keyed(docs: &[Document]) -> IndexMap<DocumentId, Document> {
    docs.iter()
        .map(|doc| (DocumentId::of(doc).unwrap(), doc.clone()))
        .collect()
}

#[test]
fn test_ordered_diff_degenerate_cases() {
    let docs: Vec<Document> = (0..6).map(|i| doc! { _id: i, n: (i * 2) }).collect();
    let reversed: Vec<Document> = docs.iter().rev().cloned().collect();

    assert_replays(&[], &[]);
    assert_replays(&[], &docs);
    assert_replays(&docs, &[]);
    assert_replays(&docs, &docs);
    assert_replays(&docs, &reversed);
    assert_replays(&reversed, &docs);
}

#[test]
fn test_ordered_diff_reports_nothing_for_equal_results() {
    #[derive(Default)]
    struct Count(usize);
    impl DiffObserver for Count {
        fn added_before(&mut self, _: &DocumentId, _: Document, _: Option<&DocumentId>) {
            self.0 += 1;
        }
        fn changed(&mut self, _: &DocumentId, _: ChangedFields) {
            self.0 += 1;
        }
        fn moved_before(&mut self, _: &DocumentId, _: Option<&DocumentId>) {
            self.0 += 1;
        }
        fn removed(&mut self, _: &DocumentId) {
            self.0 += 1;
        }
    }

    let docs = vec![doc! { _id: "a", x: 1 }, doc! { _id: "b", x: 2 }];
    let mut count = Count::default();
    diff_ordered(&docs, &docs.clone(), &mut count, None);
    assert_eq!(count.0, 0);
}

#[test]
fn test_ordered_diff_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x10de);
    for _ in 0..500 {
        let (old, new) = random_pair(&mut rng);
        assert_replays(&old, &new);
    }
}

#[test]
fn test_unordered_diff_touches_exactly_the_differences() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..300 {
        let (old, new) = random_pair(&mut rng);
        let (old, new) = (keyed(&old), keyed(&new));

        let mut touched = Touched::default();
        diff_unordered(&old, &new, &mut touched, None);

        let old_ids: HashSet<DocumentId> = old.keys().cloned().collect();
        let new_ids: HashSet<DocumentId> = new.keys().cloned().collect();
        let differing: HashSet<DocumentId> = old_ids
            .intersection(&new_ids)
            .filter(|id| old[*id] != new[*id])
            .cloned()
            .collect();

        assert_eq!(touched.added, &new_ids - &old_ids);
        assert_eq!(touched.removed, &old_ids - &new_ids);
        assert_eq!(touched.changed, differing);
    }
}

#[test]
fn test_unordered_diff_with_projection() {
    let old = keyed(&[doc! { _id: 1, a: 1, hidden: 1 }]);
    let new = keyed(&[doc! { _id: 1, a: 1, hidden: 2 }, doc! { _id: 2, a: 2, hidden: 2 }]);
    let hide = |doc: &Document| {
        let mut doc = doc.clone();
        doc.remove("hidden");
        doc
    };

    let mut touched = Touched::default();
    diff_unordered(&old, &new, &mut touched, Some(&hide));
    assert!(touched.changed.is_empty());
    assert_eq!(touched.added, HashSet::from([DocumentId::new(val!(2)).unwrap()]));
}
