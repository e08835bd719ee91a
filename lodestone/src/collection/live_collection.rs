use crate::collection::cursor::Cursor;
use crate::collection::live_query::{LiveQuery, QueryArena, QueryKey};
use crate::collection::observe_queue::{ObserveQueue, Task};
use crate::collection::{Document, DocumentId, FindOptions, UpdateOptions};
use crate::common::{atomic, Atomic, ReadExecutor, Value, WriteExecutor, DOC_ID};
use crate::config::{CollectionBuilder, CollectionConfig};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{ids_matched_by_selector, ArrayIndices, Matcher};
use crate::modifier::{assert_valid_document, create_upsert_document, modify, ModifyOptions};
use indexmap::{IndexMap, IndexSet};
use std::fmt::Debug;
use std::sync::Arc;

/// Documents as they were before the first change made while originals
/// were being saved. `None` marks a document that did not exist.
pub type Originals = IndexMap<DocumentId, Option<Document>>;

/// Outcome of [Collection::update].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateResult {
    /// Number of documents updated, or 1 when an upsert inserted one.
    pub number_affected: usize,
    /// `_id` of the document an upsert inserted.
    pub inserted_id: Option<Value>,
}

/// An in-memory document collection with live queries.
///
/// Every mutation updates the results of the registered live queries and
/// then runs the observer callbacks it caused, in order, before returning.
/// Callbacks run without any lock held and may use the collection again.
///
/// # Examples
///
/// ```rust,ignore
/// use lodestone::collection::{Collection, ChangeCallbacks, FindOptions};
///
/// let tasks = Collection::new("tasks");
/// let handle = tasks
///     .find(&val!(doc! { done: false }), FindOptions::new())?
///     .observe_changes(ChangeCallbacks::new().on_added(|id, fields| {
///         println!("new task {}: {}", id, fields);
///         Ok(())
///     }))?;
/// tasks.insert(doc! { title: "write docs", done: false })?;
/// handle.stop();
/// ```
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    config: CollectionConfig,
    state: Atomic<CollectionState>,
    queue: ObserveQueue,
}

struct CollectionState {
    docs: IndexMap<DocumentId, Document>,
    queries: QueryArena,
    paused: bool,
    saved_originals: Option<Originals>,
}

impl CollectionState {
    fn save_original(&mut self, id: &DocumentId, doc: Option<&Document>) {
        if let Some(originals) = self.saved_originals.as_mut() {
            originals.entry(id.clone()).or_insert_with(|| doc.cloned());
        }
    }

    /// Ids of the documents `selector` may match, in collection order.
    fn possibly_matching_ids(&self, selector: &Value) -> Vec<DocumentId> {
        match ids_matched_by_selector(selector) {
            Some(ids) => ids
                .into_iter()
                .filter_map(|id| DocumentId::new(id).ok())
                .filter(|id| self.docs.contains_key(id))
                .collect(),
            None => self.docs.keys().cloned().collect(),
        }
    }

    fn recompute_queries(&mut self, keys: IndexSet<QueryKey>, queue: &ObserveQueue) -> LodestoneResult<()> {
        for key in keys {
            if let Some(query) = self.queries.get_mut(key) {
                query.recompute(&self.docs, None, queue, self.paused)?;
            }
        }
        Ok(())
    }
}

impl Collection {
    /// Creates a collection with default settings.
    pub fn new(name: &str) -> Collection {
        Collection::with_config(CollectionConfig::named(name))
    }

    pub fn builder() -> CollectionBuilder {
        CollectionBuilder::new()
    }

    pub(crate) fn with_config(config: CollectionConfig) -> Collection {
        config.freeze();
        Collection {
            inner: Arc::new(CollectionInner {
                config,
                state: atomic(CollectionState {
                    docs: IndexMap::new(),
                    queries: QueryArena::new(),
                    paused: false,
                    saved_originals: None,
                }),
                queue: ObserveQueue::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.config.name()
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.inner.config
    }

    /// Number of stored documents.
    pub fn size(&self) -> usize {
        self.inner.state.read_with(|state| state.docs.len())
    }

    /// Stores a copy of `doc` and returns its `_id`, which is generated
    /// when the document has none.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` for a duplicate `_id` and a `ModifierError`
    /// for invalid field names.
    pub fn insert(&self, doc: Document) -> LodestoneResult<Value> {
        let result = self.inner.state.write_with(|state| self.insert_locked(state, doc));
        self.finish(result)
    }

    fn insert_locked(&self, state: &mut CollectionState, mut doc: Document) -> LodestoneResult<Value> {
        assert_valid_document(&doc)?;
        if !doc.has_id() {
            doc.put_first(DOC_ID, self.inner.config.next_id());
        }
        let id = DocumentId::of(&doc)?;
        if state.docs.contains_key(&id) {
            log::error!("Duplicate _id '{}'", id);
            return Err(LodestoneError::new(
                &format!("Duplicate _id '{}'", id),
                ErrorKind::StoreError,
            ));
        }

        state.save_original(&id, None);
        state.docs.insert(id.clone(), doc.clone());

        let queue = &self.inner.queue;
        let mut recompute = IndexSet::new();
        for key in state.queries.keys() {
            let Some(query) = state.queries.get_mut(key) else { continue };
            if query.is_dirty() {
                continue;
            }
            let result = query.document_matches(&doc)?;
            if !result.result {
                continue;
            }
            query.record_distance(&id, result.distance);
            if query.has_skip_or_limit() {
                recompute.insert(key);
            } else {
                query.insert_in_results(&doc, queue, state.paused)?;
            }
        }
        state.recompute_queries(recompute, queue)?;

        log::trace!("Inserted {} into '{}'", id, self.name());
        Ok(id.into_value())
    }

    /// Removes every document `selector` matches and returns how many were
    /// removed.
    pub fn remove(&self, selector: &Value) -> LodestoneResult<usize> {
        let result = self.inner.state.write_with(|state| self.remove_locked(state, selector));
        self.finish(result)
    }

    fn remove_locked(&self, state: &mut CollectionState, selector: &Value) -> LodestoneResult<usize> {
        let clears_all = selector.as_document().is_some_and(Document::is_empty);
        if state.paused && state.saved_originals.is_none() && clears_all {
            let count = state.docs.len();
            state.docs.clear();
            for query in state.queries.iter_mut() {
                query.clear_results();
            }
            log::debug!("Cleared {} documents from paused collection '{}'", count, self.name());
            return Ok(count);
        }

        let matcher = Matcher::new(selector)?;
        let mut removed = Vec::new();
        for id in state.possibly_matching_ids(selector) {
            if let Some(doc) = state.docs.get(&id) {
                if matcher.matches(doc)? {
                    removed.push(id);
                }
            }
        }

        let queue = &self.inner.queue;
        let mut recompute = IndexSet::new();
        let mut query_removes = Vec::new();
        for id in &removed {
            let Some(doc) = state.docs.get(id).cloned() else { continue };
            for key in state.queries.keys() {
                let Some(query) = state.queries.get_mut(key) else { continue };
                if query.is_dirty() || !query.document_matches(&doc)?.result {
                    continue;
                }
                if query.has_skip_or_limit() {
                    recompute.insert(key);
                } else {
                    query_removes.push((key, id.clone()));
                }
            }
            state.save_original(id, Some(&doc));
            state.docs.shift_remove(id);
        }

        for (key, id) in query_removes {
            if let Some(query) = state.queries.get_mut(key) {
                query.forget_distance(&id);
                query.remove_from_results(&id, queue, state.paused)?;
            }
        }
        state.recompute_queries(recompute, queue)?;
        Ok(removed.len())
    }

    /// Applies `modifier` to the first document `selector` matches, or to
    /// all of them with [UpdateOptions::multi]. With
    /// [UpdateOptions::upsert] a document is inserted when none matches.
    ///
    /// # Errors
    ///
    /// Returns a `SelectorError` for an invalid selector, a `ModifierError`
    /// for an invalid modifier and a `StoreError` when the modifier would
    /// change a document's `_id`.
    pub fn update(
        &self,
        selector: &Value,
        modifier: &Document,
        options: &UpdateOptions,
    ) -> LodestoneResult<UpdateResult> {
        let matcher = Matcher::for_update(selector)?;
        let result = self.inner.state.write_with(|state| {
            self.update_locked(state, selector, &matcher, modifier, options.is_multi())
        });
        let number_affected = self.finish(result)?;

        if number_affected == 0 && options.is_upsert() {
            let mut doc = create_upsert_document(selector, modifier)?;
            if !doc.has_id() {
                if let Some(id) = options.get_inserted_id() {
                    doc.put_first(DOC_ID, id.clone());
                }
            }
            let id = self.insert(doc)?;
            return Ok(UpdateResult {
                number_affected: 1,
                inserted_id: Some(id),
            });
        }
        Ok(UpdateResult {
            number_affected,
            inserted_id: None,
        })
    }

    /// Updates the first matching document or inserts one built from
    /// `selector` and `modifier`.
    pub fn upsert(&self, selector: &Value, modifier: &Document) -> LodestoneResult<UpdateResult> {
        self.update(selector, modifier, &UpdateOptions::new(false, true))
    }

    fn update_locked(
        &self,
        state: &mut CollectionState,
        selector: &Value,
        matcher: &Matcher,
        modifier: &Document,
        multi: bool,
    ) -> LodestoneResult<usize> {
        let mut recompute = IndexSet::new();
        let mut count = 0;
        for id in state.possibly_matching_ids(selector) {
            let Some(doc) = state.docs.get(&id).cloned() else { continue };
            let result = matcher.document_matches(&doc)?;
            if !result.result {
                continue;
            }
            state.save_original(&id, Some(&doc));
            self.modify_and_notify(state, &id, modifier, result.array_indices, &mut recompute)?;
            count += 1;
            if !multi {
                break;
            }
        }
        state.recompute_queries(recompute, &self.inner.queue)?;
        Ok(count)
    }

    fn modify_and_notify(
        &self,
        state: &mut CollectionState,
        id: &DocumentId,
        modifier: &Document,
        array_indices: Option<ArrayIndices>,
        recompute: &mut IndexSet<QueryKey>,
    ) -> LodestoneResult<()> {
        let Some(stored) = state.docs.get_mut(id) else { return Ok(()) };
        let old_doc = stored.clone();

        let mut matched_before = Vec::new();
        for key in state.queries.keys() {
            let Some(query) = state.queries.get_mut(key) else { continue };
            if !query.is_dirty() {
                matched_before.push((key, query.matched_before(id, &old_doc)?));
            }
        }

        modify(stored, modifier, &ModifyOptions::with_array_indices(array_indices))?;
        let doc = stored.clone();

        let queue = &self.inner.queue;
        for (key, before) in matched_before {
            let Some(query) = state.queries.get_mut(key) else { continue };
            let after = query.document_matches(&doc)?;
            if after.result {
                query.record_distance(id, after.distance);
            } else {
                query.forget_distance(id);
            }
            match (before, after.result) {
                (before, after) if query.has_skip_or_limit() => {
                    if before || after {
                        recompute.insert(key);
                    }
                }
                (true, false) => query.remove_from_results(id, queue, state.paused)?,
                (false, true) => query.insert_in_results(&doc, queue, state.paused)?,
                (true, true) => query.update_in_results(&doc, &old_doc, queue, state.paused)?,
                (false, false) => {}
            }
        }
        Ok(())
    }

    /// Runs `selector` against the collection.
    pub fn find(&self, selector: &Value, options: FindOptions) -> LodestoneResult<Cursor> {
        Cursor::new(self.clone(), selector, options)
    }

    /// The first document `selector` selects.
    pub fn find_one(&self, selector: &Value, options: FindOptions) -> LodestoneResult<Option<Document>> {
        let cursor = self.find(selector, options.limit(1))?;
        Ok(cursor.fetch()?.into_iter().next())
    }

    /// Stops delivering callbacks until [Collection::resume_observers].
    ///
    /// Live query results stay current while paused; resuming reports the
    /// net difference as one batch of callbacks.
    pub fn pause_observers(&self) {
        self.inner.state.write_with(|state| {
            if state.paused {
                return;
            }
            state.paused = true;
            for query in state.queries.iter_mut() {
                query.pause();
            }
        });
        log::debug!("Paused the observers of '{}'", self.name());
    }

    pub fn resume_observers(&self) -> LodestoneResult<()> {
        let queue = &self.inner.queue;
        let result = self.inner.state.write_with(|state| -> LodestoneResult<()> {
            if !state.paused {
                return Ok(());
            }
            state.paused = false;
            for key in state.queries.keys() {
                if let Some(query) = state.queries.get_mut(key) {
                    query.resume(&state.docs, queue)?;
                }
            }
            Ok(())
        });
        log::debug!("Resumed the observers of '{}'", self.name());
        self.finish(result)
    }

    /// Starts recording the original version of every document changed
    /// from now on.
    ///
    /// # Errors
    ///
    /// Returns a `UsageError` if originals are already being saved.
    pub fn save_originals(&self) -> LodestoneResult<()> {
        self.inner.state.write_with(|state| {
            if state.saved_originals.is_some() {
                log::error!("Called save_originals twice without retrieve_originals");
                return Err(LodestoneError::new(
                    "Called save_originals twice without retrieve_originals",
                    ErrorKind::UsageError,
                ));
            }
            state.saved_originals = Some(Originals::new());
            Ok(())
        })
    }

    /// Stops recording originals and returns what was recorded.
    ///
    /// # Errors
    ///
    /// Returns a `UsageError` if originals are not being saved.
    pub fn retrieve_originals(&self) -> LodestoneResult<Originals> {
        self.inner.state.write_with(|state| {
            state.saved_originals.take().ok_or_else(|| {
                log::error!("Called retrieve_originals without save_originals");
                LodestoneError::new(
                    "Called retrieve_originals without save_originals",
                    ErrorKind::UsageError,
                )
            })
        })
    }

    pub(crate) fn read_docs<R>(&self, f: impl FnOnce(&IndexMap<DocumentId, Document>) -> R) -> R {
        self.inner.state.read_with(|state| f(&state.docs))
    }

    /// Computes the initial results of `query` and registers it when
    /// `reactive`.
    pub(crate) fn register_query(&self, mut query: LiveQuery, reactive: bool) -> LodestoneResult<Option<QueryKey>> {
        self.inner.state.write_with(|state| -> LodestoneResult<Option<QueryKey>> {
            query.start(&state.docs, &self.inner.queue, state.paused)?;
            Ok(reactive.then(|| state.queries.insert(query)))
        })
    }

    pub(crate) fn unregister_query(&self, key: QueryKey) {
        let removed = self.inner.state.write_with(|state| state.queries.remove(key));
        if removed.is_some() {
            log::debug!("Stopped a live query of '{}'", self.name());
        }
    }

    #[cfg(test)]
    pub(crate) fn live_query_count(&self) -> usize {
        self.inner.state.read_with(|state| state.queries.len())
    }

    /// Number of `$near` distances tracked by each live query.
    #[cfg(test)]
    pub(crate) fn tracked_distances(&self) -> Vec<usize> {
        self.inner.state.write_with(|state| {
            state
                .queries
                .iter_mut()
                .filter_map(|query| query.distances().map(|distances| distances.len()))
                .collect()
        })
    }

    pub(crate) fn drain_queue(&self) -> LodestoneResult<()> {
        self.inner.queue.drain_if_idle()
    }

    /// Queues `task` behind the pending callbacks, then drains the queue
    /// unless a drain is already running.
    pub(crate) fn defer(&self, task: Task) -> LodestoneResult<()> {
        self.inner.queue.queue_task(task);
        self.drain_queue()
    }

    /// Drains the queued callbacks after a mutation. The mutation's own
    /// error takes precedence over a callback failure.
    fn finish<T>(&self, result: LodestoneResult<T>) -> LodestoneResult<T> {
        let drained = self.drain_queue();
        let value = result?;
        drained?;
        Ok(value)
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .field("size", &self.size())
            .field("live_queries", &self.inner.state.read_with(|state| state.queries.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{multi, upsert, ChangeCallbacks, ObserveCallbacks};
    use crate::{doc, val};
    use parking_lot::Mutex;

    // installs the logger once for the whole test binary
    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    type Events = Arc<Mutex<Vec<String>>>;

    fn events() -> Events {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn unordered_recorder(events: &Events) -> ChangeCallbacks {
        let (added, changed, removed) = (events.clone(), events.clone(), events.clone());
        ChangeCallbacks::new()
            .on_added(move |id, fields| {
                added.lock().push(format!("added {} {}", id, fields));
                Ok(())
            })
            .on_changed(move |id, fields| {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value.as_ref().map_or("-".to_string(), |v| v.to_string())))
                    .collect();
                changed.lock().push(format!("changed {} {}", id, fields.join(",")));
                Ok(())
            })
            .on_removed(move |id| {
                removed.lock().push(format!("removed {}", id));
                Ok(())
            })
    }

    fn taken(events: &Events) -> Vec<String> {
        std::mem::take(&mut *events.lock())
    }

    #[test]
    fn insert_assigns_ids_and_rejects_duplicates() {
        let collection = Collection::new("things");
        let id = collection.insert(doc! { a: 1 }).unwrap();
        assert_eq!(id.as_str().map(str::len), Some(17));
        let stored = collection.find_one(&id, FindOptions::new()).unwrap().unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));

        collection.insert(doc! { _id: 1, a: 1 }).unwrap();
        let err = collection.insert(doc! { _id: 1, a: 2 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreError);
        let err = collection.insert(doc! { "$a": 1 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ModifierError);
        assert_eq!(collection.size(), 2);
    }

    #[test]
    fn unordered_observation_follows_mutations() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1, a: 1 }).unwrap();
        let events = events();
        let cursor = collection.find(&val!(doc! { a: { "$lt": 10 } }), FindOptions::new()).unwrap();
        let handle = cursor.observe_changes(unordered_recorder(&events)).unwrap();
        assert_eq!(taken(&events), vec!["added 1 {\"a\":1}"]);

        collection.insert(doc! { _id: 2, a: 20 }).unwrap();
        collection.insert(doc! { _id: 3, a: 3 }).unwrap();
        collection.update(&val!(2), &doc! { "$set": { a: 2 } }, &UpdateOptions::default()).unwrap();
        collection.update(&val!(1), &doc! { "$set": { a: 11 } }, &UpdateOptions::default()).unwrap();
        collection.update(&val!(3), &doc! { "$unset": { a: 1 }, "$set": { b: 1 } }, &UpdateOptions::default()).unwrap();
        collection.remove(&val!(doc! { b: 1 })).unwrap();
        assert_eq!(
            taken(&events),
            vec![
                "added 3 {\"a\":3}",
                "added 2 {\"a\":2}",
                "removed 1",
                "removed 3",
            ]
        );

        collection.update(&val!(2), &doc! { "$set": { a: 5 } }, &UpdateOptions::default()).unwrap();
        assert_eq!(taken(&events), vec!["changed 2 a=5"]);

        handle.stop();
        collection.insert(doc! { _id: 4, a: 4 }).unwrap();
        assert!(taken(&events).is_empty());
        assert_eq!(collection.live_query_count(), 0);
    }

    #[test]
    fn unset_fields_are_reported_as_removed() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1, a: 1, b: 2 }).unwrap();
        let events = events();
        let _handle = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe_changes(unordered_recorder(&events))
            .unwrap();
        taken(&events);
        collection.update(&val!(1), &doc! { "$unset": { b: 1 } }, &UpdateOptions::default()).unwrap();
        assert_eq!(taken(&events), vec!["changed 1 b=-"]);
    }

    #[test]
    fn update_multi_and_counts() {
        let collection = Collection::new("things");
        for i in 0..3 {
            collection.insert(doc! { _id: i, a: 1 }).unwrap();
        }
        let single = collection.update(&val!(doc! {}), &doc! { "$inc": { a: 1 } }, &UpdateOptions::default()).unwrap();
        assert_eq!(single, UpdateResult { number_affected: 1, inserted_id: None });
        let all = collection.update(&val!(doc! {}), &doc! { "$inc": { a: 1 } }, &multi()).unwrap();
        assert_eq!(all.number_affected, 3);
        let docs = collection.find(&val!(doc! { a: 3 }), FindOptions::new()).unwrap().fetch().unwrap();
        assert_eq!(docs, vec![doc! { _id: 0, a: 3 }]);
    }

    #[test]
    fn update_rejects_id_changes() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1, a: 1 }).unwrap();
        let err = collection.update(&val!(1), &doc! { "$set": { _id: 2 } }, &UpdateOptions::default()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ModifierError);
        assert_eq!(collection.find_one(&val!(1), FindOptions::new()).unwrap(), Some(doc! { _id: 1, a: 1 }));
    }

    #[test]
    fn positional_updates_use_matched_indices() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1, items: [{ n: 1 }, { n: 2 }] }).unwrap();
        collection
            .update(&val!(doc! { "items.n": 2 }), &doc! { "$set": { "items.$.n": 20 } }, &UpdateOptions::default())
            .unwrap();
        let doc = collection.find_one(&val!(1), FindOptions::new()).unwrap().unwrap();
        assert_eq!(doc, doc! { _id: 1, items: [{ n: 1 }, { n: 20 }] });
    }

    #[test]
    fn upserts() {
        let collection = Collection::new("things");
        let result = collection.upsert(&val!(doc! { name: "x" }), &doc! { "$set": { n: 1 } }).unwrap();
        assert_eq!(result.number_affected, 1);
        let id = result.inserted_id.unwrap();
        assert_eq!(
            collection.find_one(&id, FindOptions::new()).unwrap(),
            Some(doc! { _id: (id.clone()), name: "x", n: 1 })
        );

        let again = collection.upsert(&val!(doc! { name: "x" }), &doc! { "$inc": { n: 1 } }).unwrap();
        assert_eq!(again, UpdateResult { number_affected: 1, inserted_id: None });

        let with_id = collection
            .update(&val!(doc! { name: "y" }), &doc! { "$set": { n: 5 } }, &upsert().inserted_id("fixed"))
            .unwrap();
        assert_eq!(with_id.inserted_id, Some(val!("fixed")));
        assert_eq!(collection.size(), 2);
    }

    #[test]
    fn near_distances_follow_matching_documents() {
        let collection = Collection::new("places");
        collection.insert(doc! { _id: "a", loc: [1, 0] }).unwrap();
        collection.insert(doc! { _id: "b", loc: [2, 0] }).unwrap();
        let handle = collection
            .find(&val!(doc! { loc: { "$near": [0, 0], "$maxDistance": 10 } }), FindOptions::new())
            .unwrap()
            .observe_changes(ChangeCallbacks::new().on_added_before(|_, _, _| Ok(())))
            .unwrap();
        assert_eq!(collection.tracked_distances(), vec![2]);

        let update = |id: &str, loc: Value| {
            collection
                .update(&val!(id), &doc! { "$set": { loc: loc } }, &UpdateOptions::default())
                .unwrap();
        };
        update("a", val!(vec![50, 50]));
        assert_eq!(collection.tracked_distances(), vec![1]);
        update("b", val!("nowhere"));
        assert_eq!(collection.tracked_distances(), vec![0]);
        update("a", val!(vec![3, 4]));
        assert_eq!(collection.tracked_distances(), vec![1]);

        handle.stop();
        assert!(collection.tracked_distances().is_empty());
    }

    #[test]
    fn remove_by_id_and_selector() {
        let collection = Collection::new("things");
        for i in 0..5 {
            collection.insert(doc! { _id: i, even: (i % 2 == 0) }).unwrap();
        }
        assert_eq!(collection.remove(&val!(doc! { _id: { "$in": [1, 3, 9] } })).unwrap(), 2);
        assert_eq!(collection.remove(&val!(doc! { even: true })).unwrap(), 3);
        assert_eq!(collection.remove(&val!(doc! {})).unwrap(), 0);
        assert_eq!(collection.size(), 0);
    }

    #[test]
    fn pause_and_resume_coalesce_changes() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1, a: 1 }).unwrap();
        collection.insert(doc! { _id: 2, a: 2 }).unwrap();
        let events = events();
        let _handle = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe_changes(unordered_recorder(&events))
            .unwrap();
        taken(&events);

        collection.pause_observers();
        collection.update(&val!(1), &doc! { "$set": { a: 10 } }, &UpdateOptions::default()).unwrap();
        collection.update(&val!(1), &doc! { "$set": { a: 1 } }, &UpdateOptions::default()).unwrap();
        collection.insert(doc! { _id: 3, a: 3 }).unwrap();
        collection.remove(&val!(3)).unwrap();
        collection.remove(&val!(2)).unwrap();
        assert!(taken(&events).is_empty());

        collection.resume_observers().unwrap();
        assert_eq!(taken(&events), vec!["removed 2"]);
    }

    #[test]
    fn paused_clear_removes_everything_at_once() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1 }).unwrap();
        collection.insert(doc! { _id: 2 }).unwrap();
        let events = events();
        let _handle = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe_changes(unordered_recorder(&events))
            .unwrap();
        taken(&events);

        collection.pause_observers();
        assert_eq!(collection.remove(&val!(doc! {})).unwrap(), 2);
        collection.insert(doc! { _id: 3 }).unwrap();
        collection.resume_observers().unwrap();
        assert_eq!(taken(&events), vec!["added 3 {}", "removed 1", "removed 2"]);
    }

    #[test]
    fn observing_while_paused_defers_initial_adds() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1 }).unwrap();
        collection.pause_observers();
        let events = events();
        let _handle = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe_changes(unordered_recorder(&events))
            .unwrap();
        assert!(taken(&events).is_empty());
        collection.resume_observers().unwrap();
        assert_eq!(taken(&events), vec!["added 1 {}"]);
    }

    #[test]
    fn originals_are_saved_once() {
        let collection = Collection::new("things");
        collection.insert(doc! { _id: 1, a: 1 }).unwrap();
        assert!(collection.retrieve_originals().is_err());

        collection.save_originals().unwrap();
        assert_eq!(collection.save_originals().unwrap_err().kind(), &ErrorKind::UsageError);
        collection.update(&val!(1), &doc! { "$set": { a: 2 } }, &UpdateOptions::default()).unwrap();
        collection.update(&val!(1), &doc! { "$set": { a: 3 } }, &UpdateOptions::default()).unwrap();
        collection.insert(doc! { _id: 2 }).unwrap();
        collection.remove(&val!(2)).unwrap();

        let originals = collection.retrieve_originals().unwrap();
        let one = DocumentId::new(val!(1)).unwrap();
        let two = DocumentId::new(val!(2)).unwrap();
        assert_eq!(originals.get(&one), Some(&Some(doc! { _id: 1, a: 1 })));
        assert_eq!(originals.get(&two), Some(&None));
        assert_eq!(originals.len(), 2);
    }

    #[test]
    fn callbacks_may_mutate_the_collection() {
        let collection = Collection::new("things");
        let events = events();
        let (inner, seen) = (collection.clone(), events.clone());
        let _handle = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe(ObserveCallbacks::new().on_added(move |doc| {
                seen.lock().push(format!("added {}", doc));
                let n = doc.get("n").and_then(Value::as_i64).unwrap_or(0);
                if n < 2 {
                    inner.insert(doc! { n: (n + 1) })?;
                }
                Ok(())
            }))
            .unwrap();

        collection.insert(doc! { _id: "a", n: 0 }).unwrap();
        let seen = taken(&events);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], "added {\"_id\":\"a\",\"n\":0}");
        assert_eq!(collection.size(), 3);
    }

    #[test]
    fn callback_errors_surface_after_the_mutation() {
        let collection = Collection::new("things");
        let events = events();
        let seen = events.clone();
        let _failing = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe_changes(ChangeCallbacks::new().on_added(|_, _| {
                Err(LodestoneError::new("observer failed", ErrorKind::UsageError))
            }))
            .unwrap();
        let _recording = collection
            .find(&val!(doc! {}), FindOptions::new())
            .unwrap()
            .observe_changes(ChangeCallbacks::new().on_added(move |id, _| {
                seen.lock().push(id.to_string());
                Ok(())
            }))
            .unwrap();

        let err = collection.insert(doc! { _id: 1 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::CallbackError);
        assert_eq!(collection.size(), 1);
        assert_eq!(taken(&events), vec!["1"]);
    }
}
