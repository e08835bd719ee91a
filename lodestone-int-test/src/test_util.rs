use lodestone::collection::{ChangeCallbacks, Collection, Document, DocumentId};
use lodestone::diff::{ChangedFields, DiffObserver};
use lodestone::errors::LodestoneResult;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Runs `test` between `before` and `after`, making sure `after` runs even
/// when the test panics.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: Fn() -> LodestoneResult<TestContext>,
    T: Fn(TestContext) -> LodestoneResult<()>,
    A: Fn(TestContext) -> LodestoneResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(err) => panic!("Failed to set up test context: {}", err),
    };

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| test(ctx.clone())));
    let elapsed = started.elapsed();

    if let Err(err) = after(ctx) {
        eprintln!("Cleanup failed: {}", err);
    }

    match outcome {
        Ok(Ok(())) => log::debug!("Test passed in {:?}", elapsed),
        Ok(Err(err)) => panic!("Test failed after {:?}: {}", elapsed, err),
        Err(payload) => panic::resume_unwind(payload),
    }
}

#[derive(Clone)]
pub struct TestContext {
    collection: Collection,
}

impl TestContext {
    pub fn new(collection: Collection) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> Collection {
        self.collection.clone()
    }
}

pub fn create_test_context() -> LodestoneResult<TestContext> {
    let name = format!("test-{}", rand::random::<u32>());
    let collection = Collection::builder().name(&name).build()?;
    Ok(TestContext::new(collection))
}

pub fn cleanup(ctx: TestContext) -> LodestoneResult<()> {
    let collection = ctx.collection();
    collection.resume_observers()?;
    collection.remove(&lodestone::val!(lodestone::doc! {}))?;
    Ok(())
}

/// Records callback invocations as strings, in the order they fire.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn push(&self, event: String) {
        self.events.lock().push(event);
    }

    /// Returns the recorded events and starts over.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn ordered_callbacks(&self) -> ChangeCallbacks {
        let (a, c, m, r) = (self.clone(), self.clone(), self.clone(), self.clone());
        ChangeCallbacks::new()
            .on_added_before(move |id, fields, before| {
                a.push(format!("added {} {} before {}", id, fields, position(before)));
                Ok(())
            })
            .on_changed(move |id, fields| {
                c.push(format!("changed {} {}", id, changes(fields)));
                Ok(())
            })
            .on_moved_before(move |id, before| {
                m.push(format!("moved {} before {}", id, position(before)));
                Ok(())
            })
            .on_removed(move |id| {
                r.push(format!("removed {}", id));
                Ok(())
            })
    }

    pub fn unordered_callbacks(&self) -> ChangeCallbacks {
        let (a, c, r) = (self.clone(), self.clone(), self.clone());
        ChangeCallbacks::new()
            .on_added(move |id, fields| {
                a.push(format!("added {} {}", id, fields));
                Ok(())
            })
            .on_changed(move |id, fields| {
                c.push(format!("changed {} {}", id, changes(fields)));
                Ok(())
            })
            .on_removed(move |id| {
                r.push(format!("removed {}", id));
                Ok(())
            })
    }
}

/// A [DiffObserver] that writes the same lines as [EventLog].
#[derive(Default)]
pub struct DiffRecorder {
    pub events: Vec<String>,
}

impl DiffObserver for DiffRecorder {
    fn added(&mut self, id: &DocumentId, fields: Document) {
        self.events.push(format!("added {} {}", id, fields));
    }

    fn added_before(&mut self, id: &DocumentId, fields: Document, before: Option<&DocumentId>) {
        self.events
            .push(format!("added {} {} before {}", id, fields, position(before)));
    }

    fn changed(&mut self, id: &DocumentId, fields: ChangedFields) {
        self.events.push(format!("changed {} {}", id, changes(&fields)));
    }

    fn moved_before(&mut self, id: &DocumentId, before: Option<&DocumentId>) {
        self.events.push(format!("moved {} before {}", id, position(before)));
    }

    fn removed(&mut self, id: &DocumentId) {
        self.events.push(format!("removed {}", id));
    }
}

fn position(before: Option<&DocumentId>) -> String {
    before.map_or_else(|| "end".to_string(), |id| id.to_string())
}

/// `k=v` pairs, with `k=-` for removed fields.
fn changes(fields: &ChangedFields) -> String {
    fields
        .iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}={}", k, v),
            None => format!("{}=-", k),
        })
        .collect::<Vec<_>>()
        .join(",")
}
