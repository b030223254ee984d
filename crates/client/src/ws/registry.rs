//! Event listener bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by `on()`; pass it to `off()` to remove that one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Event name → listeners in registration order. The same callback may be
/// registered more than once and then runs once per registration.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    by_event: HashMap<String, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, event: &str, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_event
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.by_event.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.by_event.remove(event);
        }
        removed
    }

    pub(crate) fn remove_all(&mut self, event: &str) -> usize {
        self.by_event.remove(event).map_or(0, |l| l.len())
    }

    /// Snapshot of the listeners for `event`, in invocation order.
    pub(crate) fn listeners(&self, event: &str) -> Vec<Listener> {
        self.by_event
            .get(event)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.by_event.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Listener {
        let log = log.clone();
        Arc::new(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn listeners_keep_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::default();
        registry.add("x", recorder(&log, "first"));
        registry.add("x", recorder(&log, "second"));
        registry.add("y", recorder(&log, "other"));

        for listener in registry.listeners("x") {
            listener(&Value::Null);
        }
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn duplicates_are_removed_individually() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = recorder(&log, "dup");
        let mut registry = ListenerRegistry::default();
        let a = registry.add("x", shared.clone());
        registry.add("x", shared);

        assert!(registry.remove("x", a));
        assert!(!registry.remove("x", a));
        assert_eq!(registry.listeners("x").len(), 1);
        assert_eq!(registry.remove_all("x"), 1);
        assert_eq!(registry.len(), 0);
    }
}
