use crate::collection::cursor::QuerySpec;
use crate::collection::observe_queue::ObserveQueue;
use crate::collection::observer::ChangeCallbacks;
use crate::collection::projection::Projection;
use crate::collection::{Collection, Document, DocumentId};
use crate::diff::{diff_query_changes, fields_without_id, make_changed_fields, ChangedFields, DiffObserver, QueryResults};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::MatchResult;
use crate::sort::DistanceMap;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A registered observation whose results are kept current as the
/// collection changes.
pub(crate) struct LiveQuery {
    spec: QuerySpec,
    ordered: bool,
    projection: Projection,
    results: QueryResults,
    results_snapshot: Option<QueryResults>,
    distances: Option<DistanceMap>,
    dirty: bool,
    callbacks: ChangeCallbacks,
    stopped: Arc<AtomicBool>,
}

impl LiveQuery {
    pub(crate) fn new(
        spec: QuerySpec,
        ordered: bool,
        projection: Projection,
        callbacks: ChangeCallbacks,
        stopped: Arc<AtomicBool>,
    ) -> LiveQuery {
        let distances = (spec.matcher.has_geo_query() && ordered).then(DistanceMap::new);
        LiveQuery {
            spec,
            ordered,
            projection,
            results: QueryResults::new(ordered),
            results_snapshot: None,
            distances,
            dirty: false,
            callbacks,
            stopped,
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn has_skip_or_limit(&self) -> bool {
        self.spec.has_skip_or_limit()
    }

    #[cfg(test)]
    pub(crate) fn results(&self) -> &QueryResults {
        &self.results
    }

    #[cfg(test)]
    pub(crate) fn distances(&self) -> Option<&DistanceMap> {
        self.distances.as_ref()
    }

    pub(crate) fn document_matches(&self, doc: &Document) -> LodestoneResult<MatchResult> {
        self.spec.matcher.document_matches(doc)
    }

    /// Whether `doc`, before an update, belongs to the results. Ordered
    /// results are scanned by the matcher rather than by id.
    pub(crate) fn matched_before(&self, id: &DocumentId, doc: &Document) -> LodestoneResult<bool> {
        if self.ordered {
            self.spec.matcher.matches(doc)
        } else {
            Ok(self.results.contains(id))
        }
    }

    pub(crate) fn record_distance(&mut self, id: &DocumentId, distance: Option<f64>) {
        if let (Some(distances), Some(distance)) = (self.distances.as_mut(), distance) {
            distances.insert(id.clone(), distance);
        }
    }

    pub(crate) fn forget_distance(&mut self, id: &DocumentId) {
        if let Some(distances) = self.distances.as_mut() {
            distances.remove(id);
        }
    }

    /// Computes the results from scratch without notifying.
    pub(crate) fn initialize(&mut self, docs: &IndexMap<DocumentId, Document>) -> LodestoneResult<()> {
        if let Some(distances) = self.distances.as_mut() {
            distances.clear();
        }
        self.results = self.spec.compute_results(docs, self.ordered, self.distances.as_mut())?;
        Ok(())
    }

    /// Computes the initial results of a new observation and queues their
    /// adds. While paused the adds are left to the resume instead.
    pub(crate) fn start(
        &mut self,
        docs: &IndexMap<DocumentId, Document>,
        queue: &ObserveQueue,
        paused: bool,
    ) -> LodestoneResult<()> {
        self.initialize(docs)?;
        if paused {
            self.results_snapshot = Some(QueryResults::new(self.ordered));
            return Ok(());
        }
        self.send_initial_adds(queue)
    }

    /// Queues an add for every current result, in result order.
    fn send_initial_adds(&self, queue: &ObserveQueue) -> LodestoneResult<()> {
        let mut notifier = QueryNotifier::new(queue, &self.callbacks, &self.stopped, false);
        let project = |doc: &Document| self.projection.apply(doc);
        for doc in self.results.documents() {
            let id = DocumentId::of(doc)?;
            let fields = fields_without_id(doc, Some(&project));
            if self.ordered {
                notifier.added_before(&id, fields, None);
            } else {
                notifier.added(&id, fields);
            }
        }
        Ok(())
    }

    pub(crate) fn insert_in_results(
        &mut self,
        doc: &Document,
        queue: &ObserveQueue,
        paused: bool,
    ) -> LodestoneResult<()> {
        let id = DocumentId::of(doc)?;
        let mut notifier = QueryNotifier::new(queue, &self.callbacks, &self.stopped, paused);
        let projection = &self.projection;
        let fields = fields_without_id(doc, Some(&|doc: &Document| projection.apply(doc)));

        match &mut self.results {
            QueryResults::Ordered(results) => match self.spec.sorter.as_ref() {
                None => {
                    results.push(doc.clone());
                    notifier.added_before(&id, fields, None);
                }
                Some(sorter) => {
                    let index = sorter.insertion_index(results, doc, self.distances.as_ref())?;
                    results.insert(index, doc.clone());
                    let before = next_id(results, index)?;
                    notifier.added_before(&id, fields, before.as_ref());
                }
            },
            QueryResults::Unordered(results) => {
                results.insert(id.clone(), doc.clone());
                notifier.added(&id, fields);
            }
        }
        Ok(())
    }

    pub(crate) fn remove_from_results(
        &mut self,
        id: &DocumentId,
        queue: &ObserveQueue,
        paused: bool,
    ) -> LodestoneResult<()> {
        let mut notifier = QueryNotifier::new(queue, &self.callbacks, &self.stopped, paused);
        match &mut self.results {
            QueryResults::Ordered(results) => {
                let index = position_of(results, id)?;
                results.remove(index);
            }
            QueryResults::Unordered(results) => {
                if results.shift_remove(id).is_none() {
                    return Err(not_in_results(id));
                }
            }
        }
        notifier.removed(id);
        Ok(())
    }

    pub(crate) fn update_in_results(
        &mut self,
        doc: &Document,
        old_doc: &Document,
        queue: &ObserveQueue,
        paused: bool,
    ) -> LodestoneResult<()> {
        let id = DocumentId::of(doc)?;
        if DocumentId::of(old_doc)? != id {
            log::error!("Can't change a doc's _id while updating");
            return Err(LodestoneError::new(
                "Can't change a doc's _id while updating",
                ErrorKind::StoreError,
            ));
        }

        let mut notifier = QueryNotifier::new(queue, &self.callbacks, &self.stopped, paused);
        let changed_fields =
            make_changed_fields(&self.projection.apply(doc), &self.projection.apply(old_doc));
        if !changed_fields.is_empty() {
            notifier.changed(&id, changed_fields);
        }

        match &mut self.results {
            QueryResults::Unordered(results) => {
                results.insert(id, doc.clone());
            }
            QueryResults::Ordered(results) => {
                let old_index = position_of(results, &id)?;
                let Some(sorter) = self.spec.sorter.as_ref() else {
                    results[old_index] = doc.clone();
                    return Ok(());
                };
                results.remove(old_index);
                let new_index = sorter.insertion_index(results, doc, self.distances.as_ref())?;
                results.insert(new_index, doc.clone());
                if new_index != old_index {
                    let before = next_id(results, new_index)?;
                    notifier.moved_before(&id, before.as_ref());
                }
            }
        }
        Ok(())
    }

    /// Recomputes the results from the whole collection and notifies the
    /// difference to `old_results`, or to the current results when none are
    /// given. While paused the query is only marked dirty.
    pub(crate) fn recompute(
        &mut self,
        docs: &IndexMap<DocumentId, Document>,
        old_results: Option<QueryResults>,
        queue: &ObserveQueue,
        paused: bool,
    ) -> LodestoneResult<()> {
        if paused {
            self.dirty = true;
            return Ok(());
        }
        log::trace!("Recomputing the results of a live query");
        if let Some(distances) = self.distances.as_mut() {
            distances.clear();
        }
        let new_results = self.spec.compute_results(docs, self.ordered, self.distances.as_mut())?;
        let current = std::mem::replace(&mut self.results, new_results);
        let old_results = old_results.unwrap_or(current);

        let mut notifier = QueryNotifier::new(queue, &self.callbacks, &self.stopped, paused);
        let projection = &self.projection;
        diff_query_changes(
            &old_results,
            &self.results,
            &mut notifier,
            Some(&|doc: &Document| projection.apply(doc)),
        );
        Ok(())
    }

    pub(crate) fn pause(&mut self) {
        self.results_snapshot = Some(self.results.clone());
    }

    /// Notifies everything that changed since [LiveQuery::pause] in one
    /// batch.
    pub(crate) fn resume(
        &mut self,
        docs: &IndexMap<DocumentId, Document>,
        queue: &ObserveQueue,
    ) -> LodestoneResult<()> {
        let snapshot = self
            .results_snapshot
            .take()
            .unwrap_or_else(|| QueryResults::new(self.ordered));
        if self.dirty {
            self.dirty = false;
            return self.recompute(docs, Some(snapshot), queue, false);
        }
        let mut notifier = QueryNotifier::new(queue, &self.callbacks, &self.stopped, false);
        let projection = &self.projection;
        diff_query_changes(
            &snapshot,
            &self.results,
            &mut notifier,
            Some(&|doc: &Document| projection.apply(doc)),
        );
        Ok(())
    }

    pub(crate) fn clear_results(&mut self) {
        self.results.clear();
        if let Some(distances) = self.distances.as_mut() {
            distances.clear();
        }
    }
}

fn position_of(results: &[Document], id: &DocumentId) -> LodestoneResult<usize> {
    for (index, doc) in results.iter().enumerate() {
        if &DocumentId::of(doc)? == id {
            return Ok(index);
        }
    }
    Err(not_in_results(id))
}

fn next_id(results: &[Document], index: usize) -> LodestoneResult<Option<DocumentId>> {
    results.get(index + 1).map(DocumentId::of).transpose()
}

fn not_in_results(id: &DocumentId) -> LodestoneError {
    log::error!("Document {} is not in the live query results", id);
    LodestoneError::new(
        &format!("Document {} is not in the live query results", id),
        ErrorKind::InternalError,
    )
}

/// Queues the callbacks of one live query.
///
/// Nothing is queued while observers are paused. A queued callback is
/// skipped when its query is stopped before the callback runs.
pub(crate) struct QueryNotifier<'a> {
    queue: &'a ObserveQueue,
    callbacks: &'a ChangeCallbacks,
    stopped: &'a Arc<AtomicBool>,
    paused: bool,
}

impl<'a> QueryNotifier<'a> {
    pub(crate) fn new(
        queue: &'a ObserveQueue,
        callbacks: &'a ChangeCallbacks,
        stopped: &'a Arc<AtomicBool>,
        paused: bool,
    ) -> Self {
        QueryNotifier {
            queue,
            callbacks,
            stopped,
            paused,
        }
    }

    fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() -> LodestoneResult<()> + Send + 'static,
    {
        if self.paused {
            return;
        }
        let stopped = self.stopped.clone();
        self.queue.queue_task(Box::new(move || {
            if stopped.load(Ordering::Acquire) {
                return Ok(());
            }
            task()
        }));
    }
}

impl DiffObserver for QueryNotifier<'_> {
    fn added(&mut self, id: &DocumentId, fields: Document) {
        if let Some(added) = self.callbacks.added.clone() {
            let id = id.clone();
            self.enqueue(move || added(&id, &fields));
        }
    }

    fn added_before(&mut self, id: &DocumentId, fields: Document, before: Option<&DocumentId>) {
        if let Some(added_before) = self.callbacks.added_before.clone() {
            let (id, fields, before) = (id.clone(), fields.clone(), before.cloned());
            self.enqueue(move || added_before(&id, &fields, before.as_ref()));
        }
        self.added(id, fields);
    }

    fn changed(&mut self, id: &DocumentId, fields: ChangedFields) {
        if let Some(changed) = self.callbacks.changed.clone() {
            let id = id.clone();
            self.enqueue(move || changed(&id, &fields));
        }
    }

    fn moved_before(&mut self, id: &DocumentId, before: Option<&DocumentId>) {
        if let Some(moved_before) = self.callbacks.moved_before.clone() {
            let (id, before) = (id.clone(), before.cloned());
            self.enqueue(move || moved_before(&id, before.as_ref()));
        }
    }

    fn removed(&mut self, id: &DocumentId) {
        if let Some(removed) = self.callbacks.removed.clone() {
            let id = id.clone();
            self.enqueue(move || removed(&id));
        }
    }
}

/// Identifies a live query in its collection. Keys of stopped queries are
/// never handed out again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct QueryKey {
    index: usize,
    generation: u64,
}

struct Slot {
    generation: u64,
    query: Option<LiveQuery>,
}

/// Storage of the live queries of a collection.
#[derive(Default)]
pub(crate) struct QueryArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl QueryArena {
    pub(crate) fn new() -> Self {
        QueryArena::default()
    }

    pub(crate) fn insert(&mut self, query: LiveQuery) -> QueryKey {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.query = Some(query);
                QueryKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    query: Some(query),
                });
                QueryKey {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    pub(crate) fn remove(&mut self, key: QueryKey) -> Option<LiveQuery> {
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        let query = slot.query.take();
        if query.is_some() {
            self.free.push(key.index);
        }
        query
    }

    pub(crate) fn get_mut(&mut self, key: QueryKey) -> Option<&mut LiveQuery> {
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.query.as_mut()
    }

    /// Keys of the registered queries, in slot order.
    pub(crate) fn keys(&self) -> Vec<QueryKey> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.query.is_some())
            .map(|(index, slot)| QueryKey {
                index,
                generation: slot.generation,
            })
            .collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveQuery> {
        self.slots.iter_mut().filter_map(|slot| slot.query.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.query.is_some()).count()
    }
}

/// Handle of an observation started by
/// [crate::collection::Cursor::observe_changes] or
/// [crate::collection::Cursor::observe].
///
/// Dropping the handle does not stop the observation; call
/// [QueryHandle::stop].
#[derive(Clone, Debug)]
pub struct QueryHandle {
    collection: Collection,
    key: Option<QueryKey>,
    stopped: Arc<AtomicBool>,
}

impl QueryHandle {
    pub(crate) fn new(collection: Collection, key: Option<QueryKey>, stopped: Arc<AtomicBool>) -> Self {
        QueryHandle {
            collection,
            key,
            stopped,
        }
    }

    /// Stops the observation. Callbacks of this observation that are still
    /// queued are dropped. Stopping twice is a no-op.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(key) = self.key {
            self.collection.unregister_query(key);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
