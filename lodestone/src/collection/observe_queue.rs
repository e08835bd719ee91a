use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A deferred callback invocation.
pub(crate) type Task = Box<dyn FnOnce() -> LodestoneResult<()> + Send>;

/// FIFO of pending observer callbacks of one collection.
///
/// Mutations only queue callbacks; they run when the queue is drained at the
/// end of the public call, after every collection lock has been released.
/// Callbacks may mutate the collection again: the resulting callbacks are
/// appended to the queue and run by the drain already in progress.
pub(crate) struct ObserveQueue {
    tasks: Mutex<VecDeque<Task>>,
    draining: AtomicBool,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ObserveQueue {
    pub(crate) fn new() -> Self {
        ObserveQueue {
            tasks: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub(crate) fn queue_task(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Runs queued callbacks until the queue is empty.
    ///
    /// A failing callback does not stop the drain. The first failure is
    /// returned as a `CallbackError` once the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns a `UsageError` when called while the queue is already
    /// draining.
    pub(crate) fn drain(&self) -> LodestoneResult<()> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::error!("Can't drain the observe queue while it is already draining");
            return Err(LodestoneError::new(
                "Can't drain the observe queue while it is already draining",
                ErrorKind::UsageError,
            ));
        }
        let _guard = DrainGuard(&self.draining);

        log::trace!("Draining {} observer callbacks", self.len());
        let mut failure = None;
        loop {
            let task = self.tasks.lock().pop_front();
            let Some(task) = task else { break };
            if let Err(err) = task() {
                if failure.is_none() {
                    failure = Some(err);
                } else {
                    log::warn!("Observer callback failed, continuing the drain: {}", err);
                }
            }
        }

        match failure {
            Some(err) => {
                log::error!("Observer callback failed: {}", err);
                Err(LodestoneError::new_with_cause(
                    "Observer callback failed",
                    ErrorKind::CallbackError,
                    err,
                ))
            }
            None => Ok(()),
        }
    }

    /// Drains the queue unless a drain further up the stack will pick the
    /// pending callbacks up.
    pub(crate) fn drain_if_idle(&self) -> LodestoneResult<()> {
        if self.is_draining() {
            return Ok(());
        }
        self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> Arc<Mutex<Vec<i32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn runs_tasks_in_order() {
        let queue = ObserveQueue::new();
        let seen = recorder();
        for i in 0..3 {
            let seen = seen.clone();
            queue.queue_task(Box::new(move || {
                seen.lock().push(i);
                Ok(())
            }));
        }
        assert_eq!(queue.len(), 3);
        queue.drain().unwrap();
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(queue.len(), 0);
        assert!(!queue.is_draining());
    }

    #[test]
    fn continues_after_failure() {
        let queue = ObserveQueue::new();
        let seen = recorder();
        queue.queue_task(Box::new(|| Err(LodestoneError::new("boom", ErrorKind::UsageError))));
        let later = seen.clone();
        queue.queue_task(Box::new(move || {
            later.lock().push(1);
            Ok(())
        }));

        let err = queue.drain().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::CallbackError);
        assert_eq!(err.cause().map(|c| c.message()), Some("boom"));
        assert_eq!(*seen.lock(), vec![1]);
        assert!(!queue.is_draining());
    }

    #[test]
    fn tasks_queued_while_draining_run_in_the_same_drain() {
        let queue = Arc::new(ObserveQueue::new());
        let seen = recorder();
        let (inner_queue, inner_seen) = (queue.clone(), seen.clone());
        queue.queue_task(Box::new(move || {
            inner_seen.lock().push(1);
            let nested = inner_seen.clone();
            inner_queue.queue_task(Box::new(move || {
                nested.lock().push(3);
                Ok(())
            }));
            // nested drains are deferred to the running one
            inner_queue.drain_if_idle()?;
            let err = inner_queue.drain().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::UsageError);
            inner_seen.lock().push(2);
            Ok(())
        }));
        queue.drain().unwrap();
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
