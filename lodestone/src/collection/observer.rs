use crate::collection::{Document, DocumentId};
use crate::common::DOC_ID;
use crate::diff::{apply_changes, ChangedFields};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) type AddedFn = dyn Fn(&DocumentId, &Document) -> LodestoneResult<()> + Send + Sync;
pub(crate) type AddedBeforeFn =
    dyn Fn(&DocumentId, &Document, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync;
pub(crate) type ChangedFn = dyn Fn(&DocumentId, &ChangedFields) -> LodestoneResult<()> + Send + Sync;
pub(crate) type MovedBeforeFn =
    dyn Fn(&DocumentId, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync;
pub(crate) type RemovedFn = dyn Fn(&DocumentId) -> LodestoneResult<()> + Send + Sync;

type DocFn = dyn Fn(&Document) -> LodestoneResult<()> + Send + Sync;
type DocAddedAtFn = dyn Fn(&Document, Option<usize>, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync;
type DocChangedFn = dyn Fn(&Document, &Document) -> LodestoneResult<()> + Send + Sync;
type DocChangedAtFn = dyn Fn(&Document, &Document, Option<usize>) -> LodestoneResult<()> + Send + Sync;
type DocRemovedAtFn = dyn Fn(&Document, Option<usize>) -> LodestoneResult<()> + Send + Sync;
type DocMovedToFn =
    dyn Fn(&Document, Option<usize>, Option<usize>, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync;

/// Field level callbacks of [crate::collection::Cursor::observe_changes].
///
/// Supplying `added_before` or `moved_before` makes the observation
/// ordered. `added` and `added_before` are mutually exclusive. In ordered
/// observations `before` is the id of the document the subject now
/// precedes, or `None` for the end of the results.
///
/// ```rust,ignore
/// let callbacks = ChangeCallbacks::new()
///     .on_added_before(|id, fields, before| {
///         println!("{} added before {:?}: {}", id, before, fields);
///         Ok(())
///     })
///     .on_removed(|id| Ok(()));
/// ```
#[derive(Clone, Default)]
pub struct ChangeCallbacks {
    pub(crate) added: Option<Arc<AddedFn>>,
    pub(crate) added_before: Option<Arc<AddedBeforeFn>>,
    pub(crate) changed: Option<Arc<ChangedFn>>,
    pub(crate) moved_before: Option<Arc<MovedBeforeFn>>,
    pub(crate) removed: Option<Arc<RemovedFn>>,
}

impl ChangeCallbacks {
    pub fn new() -> Self {
        ChangeCallbacks::default()
    }

    pub fn on_added<F>(mut self, f: F) -> Self
    where
        F: Fn(&DocumentId, &Document) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.added = Some(Arc::new(f));
        self
    }

    pub fn on_added_before<F>(mut self, f: F) -> Self
    where
        F: Fn(&DocumentId, &Document, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.added_before = Some(Arc::new(f));
        self
    }

    pub fn on_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&DocumentId, &ChangedFields) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.changed = Some(Arc::new(f));
        self
    }

    pub fn on_moved_before<F>(mut self, f: F) -> Self
    where
        F: Fn(&DocumentId, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.moved_before = Some(Arc::new(f));
        self
    }

    pub fn on_removed<F>(mut self, f: F) -> Self
    where
        F: Fn(&DocumentId) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.removed = Some(Arc::new(f));
        self
    }

    /// Whether these callbacks need ordered results.
    ///
    /// # Errors
    ///
    /// Returns a `UsageError` when both `added` and `added_before` are set.
    pub fn is_ordered(&self) -> LodestoneResult<bool> {
        if self.added.is_some() && self.added_before.is_some() {
            return Err(usage_error("Please specify only one of added() and addedBefore()"));
        }
        Ok(self.added_before.is_some() || self.moved_before.is_some())
    }
}

/// Document level callbacks of [crate::collection::Cursor::observe].
///
/// Supplying any of `added_at`, `changed_at`, `removed_at` or `moved_to`
/// makes the observation ordered, and each `*_at` callback excludes its
/// plain counterpart. Indices are positions in the observed results, or
/// `None` when the observer was created with [ObserveCallbacks::no_indices].
/// `changed` callbacks receive the new document first, then the old one.
#[derive(Clone, Default)]
pub struct ObserveCallbacks {
    added: Option<Arc<DocFn>>,
    added_at: Option<Arc<DocAddedAtFn>>,
    changed: Option<Arc<DocChangedFn>>,
    changed_at: Option<Arc<DocChangedAtFn>>,
    removed: Option<Arc<DocFn>>,
    removed_at: Option<Arc<DocRemovedAtFn>>,
    moved_to: Option<Arc<DocMovedToFn>>,
    suppress_initial: bool,
    no_indices: bool,
}

impl ObserveCallbacks {
    pub fn new() -> Self {
        ObserveCallbacks::default()
    }

    pub fn on_added<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.added = Some(Arc::new(f));
        self
    }

    pub fn on_added_at<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, Option<usize>, Option<&DocumentId>) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.added_at = Some(Arc::new(f));
        self
    }

    pub fn on_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, &Document) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.changed = Some(Arc::new(f));
        self
    }

    pub fn on_changed_at<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, &Document, Option<usize>) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.changed_at = Some(Arc::new(f));
        self
    }

    pub fn on_removed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.removed = Some(Arc::new(f));
        self
    }

    pub fn on_removed_at<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, Option<usize>) -> LodestoneResult<()> + Send + Sync + 'static,
    {
        self.removed_at = Some(Arc::new(f));
        self
    }

    pub fn on_moved_to<F>(mut self, f: F) -> Self
    where
        F: Fn(&Document, Option<usize>, Option<usize>, Option<&DocumentId>) -> LodestoneResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.moved_to = Some(Arc::new(f));
        self
    }

    /// Skip the `added` calls for the documents already in the results when
    /// observation starts.
    pub fn suppress_initial(mut self) -> Self {
        self.suppress_initial = true;
        self
    }

    /// Report `None` instead of computing positions.
    pub fn no_indices(mut self) -> Self {
        self.no_indices = true;
        self
    }

    pub(crate) fn is_suppressing_initial(&self) -> bool {
        self.suppress_initial
    }

    /// Whether these callbacks need ordered results.
    ///
    /// # Errors
    ///
    /// Returns a `UsageError` when a callback and its `*_at` counterpart are
    /// both set.
    pub fn is_ordered(&self) -> LodestoneResult<bool> {
        if self.added.is_some() && self.added_at.is_some() {
            return Err(usage_error("Please specify only one of added() and addedAt()"));
        }
        if self.changed.is_some() && self.changed_at.is_some() {
            return Err(usage_error("Please specify only one of changed() and changedAt()"));
        }
        if self.removed.is_some() && self.removed_at.is_some() {
            return Err(usage_error("Please specify only one of removed() and removedAt()"));
        }
        Ok(self.added_at.is_some()
            || self.changed_at.is_some()
            || self.removed_at.is_some()
            || self.moved_to.is_some())
    }
}

/// The observer's own copy of the results, in result order when ordered.
type CachedDocs = IndexMap<DocumentId, Document>;

/// Builds the field level callbacks that keep a copy of the observed
/// results and translate each change into document level `callbacks`.
///
/// `suppressed` is raised while the initial results are delivered when
/// initial adds are to be skipped.
pub(crate) fn caching_observer(
    callbacks: ObserveCallbacks,
    suppressed: Arc<AtomicBool>,
) -> LodestoneResult<ChangeCallbacks> {
    let ordered = callbacks.is_ordered()?;
    let callbacks = Arc::new(callbacks);
    let docs: Arc<Mutex<CachedDocs>> = Arc::new(Mutex::new(IndexMap::new()));
    let indices = !callbacks.no_indices;
    let mut changes = ChangeCallbacks::new();

    if ordered {
        let (cbs, cache, suppressed) = (callbacks.clone(), docs.clone(), suppressed.clone());
        changes = changes.on_added_before(move |id, fields, before| {
            let doc = with_id(id, fields);
            let index = {
                let mut cache = cache.lock();
                let index = before
                    .and_then(|before| cache.get_index_of(before))
                    .unwrap_or(cache.len());
                cache.shift_insert(index, id.clone(), doc.clone());
                index
            };
            if suppressed.load(Ordering::Acquire) {
                return Ok(());
            }
            match (&cbs.added_at, &cbs.added) {
                (Some(added_at), _) => added_at(&doc, indices.then_some(index), before),
                (None, Some(added)) => added(&doc),
                (None, None) => Ok(()),
            }
        });

        let (cbs, cache) = (callbacks.clone(), docs.clone());
        changes = changes.on_moved_before(move |id, before| {
            let (doc, from, to) = {
                let mut cache = cache.lock();
                let from = cache.get_index_of(id).ok_or_else(|| unknown_id("movedBefore", id))?;
                let mut to = before
                    .and_then(|before| cache.get_index_of(before))
                    .unwrap_or(cache.len());
                if to > from {
                    to -= 1;
                }
                cache.move_index(from, to);
                (cache[to].clone(), from, to)
            };
            match &cbs.moved_to {
                Some(moved_to) => moved_to(&doc, indices.then_some(from), indices.then_some(to), before),
                None => Ok(()),
            }
        });
    } else {
        let (cbs, cache, suppressed) = (callbacks.clone(), docs.clone(), suppressed.clone());
        changes = changes.on_added(move |id, fields| {
            let doc = with_id(id, fields);
            cache.lock().insert(id.clone(), doc.clone());
            match &cbs.added {
                Some(added) if !suppressed.load(Ordering::Acquire) => added(&doc),
                _ => Ok(()),
            }
        });
    }

    let (cbs, cache) = (callbacks.clone(), docs.clone());
    changes = changes.on_changed(move |id, fields| {
        let (old_doc, new_doc, index) = {
            let mut cache = cache.lock();
            let (index, _, doc) = cache.get_full_mut(id).ok_or_else(|| unknown_id("changed", id))?;
            let old_doc = doc.clone();
            apply_changes(doc, fields);
            (old_doc, doc.clone(), index)
        };
        match (&cbs.changed_at, &cbs.changed) {
            (Some(changed_at), _) => changed_at(&new_doc, &old_doc, indices.then_some(index)),
            (None, Some(changed)) => changed(&new_doc, &old_doc),
            (None, None) => Ok(()),
        }
    });

    let (cbs, cache) = (callbacks, docs);
    changes = changes.on_removed(move |id| {
        let (index, doc) = {
            let mut cache = cache.lock();
            let (index, _, doc) = cache.shift_remove_full(id).ok_or_else(|| unknown_id("removed", id))?;
            (index, doc)
        };
        match (&cbs.removed_at, &cbs.removed) {
            (Some(removed_at), _) => removed_at(&doc, indices.then_some(index)),
            (None, Some(removed)) => removed(&doc),
            (None, None) => Ok(()),
        }
    });

    Ok(changes)
}

fn with_id(id: &DocumentId, fields: &Document) -> Document {
    let mut doc = fields.clone();
    doc.put_first(DOC_ID, id.value().clone());
    doc
}

fn unknown_id(event: &str, id: &DocumentId) -> LodestoneError {
    log::error!("Unknown id for {}: {}", event, id);
    LodestoneError::new(&format!("Unknown id for {}: {}", event, id), ErrorKind::InternalError)
}

fn usage_error(message: &str) -> LodestoneError {
    log::error!("{}", message);
    LodestoneError::new(message, ErrorKind::UsageError)
}
