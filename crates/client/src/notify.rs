//! Ordered, re-entrant delivery of callbacks.
//!
//! Both the store and the connection manager compute *who* to notify while
//! holding their state lock, then hand the work to the [`shared`] queue and
//! deliver after releasing it. The queue gives three guarantees:
//!
//! * jobs run in the order they were pushed, one at a time, so all
//!   notifications of one transition finish before the next transition's
//!   begin;
//! * a callback may call back into its owner (dispatch, emit, disconnect):
//!   the nested jobs are appended and run by the drain already active on
//!   that thread instead of deadlocking or recursing;
//! * a drain started on any other thread blocks until the active drainer
//!   has emptied the queue, so `dispatch` and `disconnect` return only after
//!   their own notifications ran.
//!
//! Jobs must be pushed while the owner's state lock is held so queue order
//! matches mutation order, and `drain` must be called with no lock held.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

struct QueueState {
    pending: VecDeque<Job>,
    /// Thread currently running jobs.
    owner: Option<ThreadId>,
}

pub(crate) struct NotifyQueue {
    state: Mutex<QueueState>,
    idle: Condvar,
}

static SHARED: NotifyQueue = NotifyQueue::new();

/// The queue every store and connection manager delivers through.
///
/// One queue for all of them keeps cross-owner callbacks (a status observer
/// writing to a store, a store callback calling `disconnect`) from ever
/// waiting on each other's drainers.
pub(crate) fn shared() -> &'static NotifyQueue {
    &SHARED
}

impl NotifyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                owner: None,
            }),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, job: Job) {
        self.lock().pending.push_back(job);
    }

    pub(crate) fn extend(&self, jobs: impl IntoIterator<Item = Job>) {
        self.lock().pending.extend(jobs);
    }

    /// Run queued jobs until the queue is empty.
    ///
    /// No-op when called from inside a job: the outer drain on this thread
    /// picks the new jobs up. If another thread is draining, waits for it to
    /// finish; everything pushed before this call has run by then.
    pub(crate) fn drain(&self) {
        let me = thread::current().id();
        {
            let mut state = self.lock();
            loop {
                let owner = state.owner;
                match owner {
                    Some(owner) if owner == me => return,
                    Some(_) => {
                        state = self
                            .idle
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    None => break,
                }
            }
            if state.pending.is_empty() {
                return;
            }
            state.owner = Some(me);
        }

        // Releases ownership if a job panics; remaining jobs stay queued for
        // the next drainer.
        let _release = Release(self);
        loop {
            let job = {
                let mut state = self.lock();
                match state.pending.pop_front() {
                    Some(job) => job,
                    // Ownership is released by `_release` once the lock
                    // that saw the queue empty is gone; a push landing in
                    // between is run by whoever drains next.
                    None => return,
                }
            };
            job();
        }
    }
}

struct Release<'a>(&'a NotifyQueue);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.lock().owner = None;
        self.0.idle.notify_all();
    }
}
