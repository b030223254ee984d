//! The store engine: state, dispatch and selector subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::{unbounded, UnboundedReceiver};

use super::{ShallowEq, StoreState};
use crate::notify::{self, Job, NotifyQueue};

/// Handle returned by [`Store::subscribe`]; required to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A selector plus its cached output, type-erased over the output type.
trait Subscriber<S>: Send {
    /// Re-run the selector; returns the notification to deliver if the
    /// output changed.
    fn refresh(&mut self, state: &S) -> Option<Job>;
    fn cancel(&self);
}

struct Selected<S, V> {
    selector: Box<dyn Fn(&S) -> V + Send>,
    last: V,
    callback: Arc<dyn Fn(V) + Send + Sync>,
    live: Arc<AtomicBool>,
}

impl<S, V> Subscriber<S> for Selected<S, V>
where
    S: 'static,
    V: ShallowEq + Clone + Send + 'static,
{
    fn refresh(&mut self, state: &S) -> Option<Job> {
        let next = (self.selector)(state);
        if next.shallow_eq(&self.last) {
            return None;
        }
        self.last = next.clone();

        let callback = self.callback.clone();
        let live = self.live.clone();
        Some(Box::new(move || {
            // Unsubscribed between evaluation and delivery.
            if live.load(Ordering::Acquire) {
                callback(next);
            }
        }))
    }

    fn cancel(&self) {
        self.live.store(false, Ordering::Release);
    }
}

struct StoreInner<S> {
    state: S,
    subscribers: Vec<(SubscriptionId, Box<dyn Subscriber<S>>)>,
    next_id: u64,
}

/// Reactive state container with per-subscriber change filtering.
///
/// Cloning is cheap and yields another handle to the same store.
pub struct Store<S> {
    name: Arc<str>,
    inner: Arc<Mutex<StoreInner<S>>>,
    queue: &'static NotifyQueue,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: self.inner.clone(),
            queue: self.queue,
        }
    }
}

impl<S: StoreState> Store<S> {
    pub fn new(name: &str, initial: S) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(StoreInner {
                state: initial,
                subscribers: Vec::new(),
                next_id: 1,
            })),
            queue: notify::shared(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // A panicking selector poisons the mutex; the panic itself already
    // reached the caller, so later users just take the state as it is.
    fn lock(&self) -> MutexGuard<'_, StoreInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the whole state.
    pub fn get_state(&self) -> S
    where
        S: Clone,
    {
        self.lock().state.clone()
    }

    /// Borrow the state for the duration of `f`.
    ///
    /// `f` runs under the store lock and must not call back into the store.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock().state)
    }

    /// Apply one field update. Returns whether the state changed.
    pub fn dispatch(&self, update: S::Update) -> bool {
        self.batch_update(std::iter::once(update))
    }

    /// Apply several field updates as one transition: every field is written
    /// before any subscriber is evaluated, and each subscriber is notified at
    /// most once.
    pub fn batch_update(&self, updates: impl IntoIterator<Item = S::Update>) -> bool {
        self.update(|_| updates)
    }

    /// Read-modify-write as one transition.
    ///
    /// `f` derives the updates from the current state and runs under the
    /// store lock, so no other dispatch can land between the read and the
    /// write. Like [`read`](Self::read), `f` must not call back into the
    /// store.
    pub fn update<I>(&self, f: impl FnOnce(&S) -> I) -> bool
    where
        I: IntoIterator<Item = S::Update>,
    {
        let changed = {
            let mut guard = self.lock();
            let StoreInner {
                state, subscribers, ..
            } = &mut *guard;

            let mut changed = false;
            for update in f(state) {
                changed |= state.apply(update);
            }

            if changed {
                let state = &*state;
                let jobs: Vec<Job> = subscribers
                    .iter_mut()
                    .filter_map(|(_, subscriber)| subscriber.refresh(state))
                    .collect();
                crate::log_debug!(
                    "store '{}': state changed, notifying {} of {} subscribers",
                    self.name,
                    jobs.len(),
                    subscribers.len()
                );
                self.queue.extend(jobs);
            }
            changed
        };

        if changed {
            self.queue.drain();
        }
        changed
    }

    /// Register `selector` and get its current output immediately.
    ///
    /// `callback` fires with the new output whenever a later dispatch changes
    /// it under [`ShallowEq`].
    pub fn subscribe<V, F, C>(&self, selector: F, callback: C) -> (SubscriptionId, V)
    where
        V: ShallowEq + Clone + Send + 'static,
        F: Fn(&S) -> V + Send + 'static,
        C: Fn(V) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let current = selector(&inner.state);

        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        let subscriber: Box<dyn Subscriber<S>> = Box::new(Selected {
            selector: Box::new(selector),
            last: current.clone(),
            callback: Arc::new(callback),
            live: Arc::new(AtomicBool::new(true)),
        });
        inner.subscribers.push((id, subscriber));

        (id, current)
    }

    /// Like [`subscribe`](Self::subscribe), but changes arrive on a stream.
    pub fn watch<V, F>(&self, selector: F) -> (SubscriptionId, V, UnboundedReceiver<V>)
    where
        V: ShallowEq + Clone + Send + 'static,
        F: Fn(&S) -> V + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let (id, current) = self.subscribe(selector, move |value| {
            let _ = tx.unbounded_send(value);
        });
        (id, current, rx)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        match inner.subscribers.iter().position(|(sid, _)| *sid == id) {
            Some(idx) => {
                let (_, subscriber) = inner.subscribers.remove(idx);
                subscriber.cancel();
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}
