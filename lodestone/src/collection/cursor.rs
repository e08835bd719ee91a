use crate::collection::live_query::{LiveQuery, QueryHandle};
use crate::collection::observer::{caching_observer, ChangeCallbacks, ObserveCallbacks};
use crate::collection::projection::Projection;
use crate::collection::{Collection, Document, DocumentId, FindOptions};
use crate::common::{Value, DOC_ID};
use crate::diff::QueryResults;
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{selector_is_id, selector_is_id_perhaps_as_object, Matcher};
use crate::sort::{DistanceMap, Sorter};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The compiled parts of a query that select and order its results.
#[derive(Clone)]
pub(crate) struct QuerySpec {
    pub(crate) matcher: Matcher,
    pub(crate) sorter: Option<Sorter>,
    pub(crate) skip: usize,
    pub(crate) limit: Option<usize>,
    pub(crate) selector_id: Option<DocumentId>,
}

impl QuerySpec {
    pub(crate) fn new(
        matcher: Matcher,
        sorter: Option<Sorter>,
        skip: usize,
        limit: Option<usize>,
        selector_id: Option<DocumentId>,
    ) -> Self {
        QuerySpec {
            matcher,
            sorter,
            skip,
            limit,
            selector_id,
        }
    }

    pub(crate) fn has_skip_or_limit(&self) -> bool {
        self.skip > 0 || self.limit.is_some()
    }

    /// Runs the query over `docs`.
    ///
    /// Ordered results are sorted and cut to the skip/limit window;
    /// unordered ones keep collection order. `$near` distances of the
    /// matched documents are recorded into `distances` when given.
    pub(crate) fn compute_results(
        &self,
        docs: &IndexMap<DocumentId, Document>,
        ordered: bool,
        mut distances: Option<&mut DistanceMap>,
    ) -> LodestoneResult<QueryResults> {
        let mut results = QueryResults::new(ordered);

        if let Some(id) = &self.selector_id {
            if self.skip > 0 {
                return Ok(results);
            }
            if let Some(doc) = docs.get(id) {
                match &mut results {
                    QueryResults::Ordered(results) => results.push(doc.clone()),
                    QueryResults::Unordered(results) => {
                        results.insert(id.clone(), doc.clone());
                    }
                }
            }
            return Ok(results);
        }

        let stop_early = self.skip == 0 && self.sorter.is_none();
        let mut matched: Vec<(&DocumentId, &Document)> = Vec::new();
        for (id, doc) in docs {
            let result = self.matcher.document_matches(doc)?;
            if !result.result {
                continue;
            }
            if let (Some(distances), Some(distance)) = (distances.as_deref_mut(), result.distance) {
                distances.insert(id.clone(), distance);
            }
            matched.push((id, doc));
            if stop_early && self.limit == Some(matched.len()) {
                break;
            }
        }

        match &mut results {
            QueryResults::Unordered(results) => {
                results.extend(matched.into_iter().map(|(id, doc)| (id.clone(), doc.clone())));
            }
            QueryResults::Ordered(results) => {
                let mut sorted: Vec<Document> = matched.into_iter().map(|(_, doc)| doc.clone()).collect();
                if let Some(sorter) = &self.sorter {
                    sorter.sort_documents(&mut sorted, distances.as_deref())?;
                }
                *results = self.window(sorted);
            }
        }
        Ok(results)
    }

    fn window(&self, docs: Vec<Document>) -> Vec<Document> {
        if !self.has_skip_or_limit() {
            return docs;
        }
        docs.into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// The documents a [Collection::find] selects, fetched on demand or
/// observed live.
///
/// Every fetch runs the query again; documents are returned projected.
#[derive(Clone)]
pub struct Cursor {
    collection: Collection,
    spec: QuerySpec,
    projection: Projection,
    excludes_id: bool,
    reactive: bool,
}

impl Cursor {
    pub(crate) fn new(collection: Collection, selector: &Value, options: FindOptions) -> LodestoneResult<Cursor> {
        let matcher = Matcher::new(selector)?;

        let selector_id = if selector_is_id_perhaps_as_object(selector) {
            let id = match selector {
                Value::Document(doc) => doc.id().cloned(),
                id if selector_is_id(id) => Some(id.clone()),
                _ => None,
            };
            id.map(DocumentId::new).transpose()?
        } else {
            None
        };

        let sorter = match (&selector_id, &options.sort) {
            (Some(_), _) => None,
            (None, Some(sort)) => Some(Sorter::with_matcher(sort, Some(&matcher))?),
            (None, None) if matcher.has_geo_query() => {
                Some(Sorter::with_matcher(&Value::Array(Vec::new()), Some(&matcher))?)
            }
            (None, None) => None,
        };

        let projection = Projection::from_option(options.fields.as_ref())?;
        let excludes_id = options
            .fields
            .as_ref()
            .and_then(|fields| fields.get(DOC_ID))
            .is_some_and(|rule| !rule.is_truthy());

        Ok(Cursor {
            collection,
            spec: QuerySpec::new(matcher, sorter, options.skip, options.limit, selector_id),
            projection,
            excludes_id,
            reactive: options.reactive,
        })
    }

    /// All selected documents, in query order.
    pub fn fetch(&self) -> LodestoneResult<Vec<Document>> {
        let results = self.collection.read_docs(|docs| {
            let mut distances = DistanceMap::new();
            let distances = self.spec.matcher.has_geo_query().then_some(&mut distances);
            self.spec.compute_results(docs, true, distances)
        })?;
        Ok(results
            .into_documents()
            .iter()
            .map(|doc| self.projection.apply(doc))
            .collect())
    }

    /// Calls `f` with every selected document and its position.
    pub fn for_each<F>(&self, mut f: F) -> LodestoneResult<()>
    where
        F: FnMut(&Document, usize),
    {
        for (index, doc) in self.fetch()?.iter().enumerate() {
            f(doc, index);
        }
        Ok(())
    }

    pub fn map<T, F>(&self, mut f: F) -> LodestoneResult<Vec<T>>
    where
        F: FnMut(&Document, usize) -> T,
    {
        Ok(self
            .fetch()?
            .iter()
            .enumerate()
            .map(|(index, doc)| f(doc, index))
            .collect())
    }

    /// Number of selected documents, within the skip/limit window.
    pub fn count(&self) -> LodestoneResult<usize> {
        self.collection.read_docs(|docs| -> LodestoneResult<usize> {
            let mut distances = DistanceMap::new();
            let distances = self.spec.matcher.has_geo_query().then_some(&mut distances);
            Ok(self.spec.compute_results(docs, true, distances)?.len())
        })
    }

    /// Starts a field level observation.
    ///
    /// The current results are delivered as adds before this returns.
    /// Unless the cursor was created with `reactive(false)` the observation
    /// then follows every change of the collection until stopped.
    ///
    /// # Errors
    ///
    /// Returns a `UsageError` for inconsistent callbacks, for unordered
    /// callbacks on a cursor with skip or limit, and for cursors whose
    /// projection excludes `_id`. Errors returned by the callbacks while the
    /// initial adds are delivered stop the observation and are returned.
    pub fn observe_changes(&self, callbacks: ChangeCallbacks) -> LodestoneResult<QueryHandle> {
        let ordered = callbacks.is_ordered()?;
        if !ordered && self.spec.has_skip_or_limit() {
            return Err(usage_error(
                "Must use an ordered observe with skip or limit (i.e. addedBefore for observeChanges or addedAt for observe, instead of added).",
            ));
        }
        if self.excludes_id {
            return Err(usage_error("You may not observe a cursor with {fields: {_id: 0}}"));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let query = LiveQuery::new(
            self.spec.clone(),
            ordered,
            self.projection.clone(),
            callbacks,
            stopped.clone(),
        );
        let key = self.collection.register_query(query, self.reactive)?;
        log::debug!(
            "Observing {} collection '{}' ({})",
            if ordered { "ordered" } else { "unordered" },
            self.collection.name(),
            if key.is_some() { "reactive" } else { "one shot" }
        );

        let handle = QueryHandle::new(self.collection.clone(), key, stopped);
        if let Err(err) = self.collection.drain_queue() {
            handle.stop();
            return Err(err);
        }
        Ok(handle)
    }

    /// Starts a document level observation, see [ObserveCallbacks].
    pub fn observe(&self, callbacks: ObserveCallbacks) -> LodestoneResult<QueryHandle> {
        let suppressed = Arc::new(AtomicBool::new(callbacks.is_suppressing_initial()));
        let changes = caching_observer(callbacks, suppressed.clone())?;
        let handle = self.observe_changes(changes)?;

        // runs after the initial adds, even when they wait on an outer drain
        let lowered = self.collection.defer(Box::new(move || {
            suppressed.store(false, Ordering::Release);
            Ok(())
        }));
        if let Err(err) = lowered {
            handle.stop();
            return Err(err);
        }
        Ok(handle)
    }
}

fn usage_error(message: &str) -> LodestoneError {
    log::error!("{}", message);
    LodestoneError::new(message, ErrorKind::UsageError)
}
