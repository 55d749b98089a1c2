//! Queue of synchronous-lane callbacks, flushed from a host microtask or
//! explicitly.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;

type SyncCallback = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct SyncQueue {
    callbacks: RefCell<VecDeque<SyncCallback>>,
    flushing: Cell<bool>,
    microtask_scheduled: Cell<bool>,
}

impl SyncQueue {
    pub(crate) fn push(&self, callback: SyncCallback) {
        self.callbacks.borrow_mut().push_back(callback);
    }

    /// Returns `true` exactly once until the next flush, so a single
    /// microtask drains any number of pushes.
    pub(crate) fn claim_microtask(&self) -> bool {
        !self.microtask_scheduled.replace(true)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Runs queued callbacks until the queue is empty, including ones pushed
    /// while flushing. Re-entrant calls return immediately.
    pub(crate) fn flush(&self) -> usize {
        if self.flushing.replace(true) {
            return 0;
        }
        self.microtask_scheduled.set(false);
        let mut ran = 0;
        loop {
            let next = self.callbacks.borrow_mut().pop_front();
            let Some(callback) = next else {
                break;
            };
            callback();
            ran += 1;
        }
        self.flushing.set(false);
        ran
    }
}

impl core::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("len", &self.callbacks.borrow().len())
            .field("flushing", &self.flushing.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn flush_runs_callbacks_pushed_during_flush() {
        let queue = Rc::new(SyncQueue::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_queue = queue.clone();
        let inner_log = log.clone();
        queue.push(Box::new(move || {
            inner_log.borrow_mut().push(1);
            let log = inner_log.clone();
            inner_queue.push(Box::new(move || log.borrow_mut().push(2)));
            // Nested flushes are no-ops.
            assert_eq!(inner_queue.flush(), 0);
        }));

        assert_eq!(queue.flush(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn microtask_is_claimed_once_per_flush() {
        let queue = SyncQueue::default();
        assert!(queue.claim_microtask());
        assert!(!queue.claim_microtask());
        queue.flush();
        assert!(queue.claim_microtask());
    }
}
