//! Registry of record observers.

use crate::diff::DiffMap;
use crate::error::{RecordError, Result};
use crate::record::Record;
use indexmap::IndexMap;
use std::fmt;

use super::types::{Event, Observer, ObserverId};

/// Holds attached observers and dispatches events to them.
///
/// Observers are removed by the [`ObserverId`] returned at attach time, so
/// the same closure may be attached several times under different filters
/// and each attachment detached on its own.
pub struct ObserverRegistry {
    /// Attached observers by ID.
    observers: IndexMap<ObserverId, Observer>,
    /// Counter for generating observer IDs.
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: IndexMap::new(),
            next_id: 1,
        }
    }

    /// Attach an observer and return its removal token.
    pub fn attach(&mut self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.insert(id, observer);
        tracing::trace!(observer = id.0, "observer attached");
        id
    }

    /// Detach an observer. Returns false if it was not attached.
    pub fn detach(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.shift_remove(&id).is_some();
        tracing::trace!(observer = id.0, removed, "observer detached");
        removed
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Run every observer against the same `diff`.
    ///
    /// Changes an observer makes to `diff` are seen by the observers after it
    /// and by the caller. The first failing observer ends the round.
    pub fn notify(&self, record: &Record, event: Event, diff: &mut DiffMap) -> Result<()> {
        tracing::trace!(?event, observers = self.observers.len(), keys = diff.len(), "notify");

        for (id, observer) in &self.observers {
            if let Err(source) = observer(record, event, &mut *diff) {
                tracing::debug!(?event, observer = id.0, error = %source, "observer failed");
                return Err(RecordError::Observer { event, source });
            }
        }
        Ok(())
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Change;
    use crate::observers::{filtered, ObserverResult};
    use crate::record::{Record, RecordConfig};
    use crate::types::Key;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn make_test_record() -> Record {
        Record::new(json!({"a": 1}).into(), RecordConfig::default()).unwrap()
    }

    fn noop() -> Observer {
        Box::new(|_: &Record, _: Event, _: &mut DiffMap| -> ObserverResult { Ok(()) })
    }

    fn one_key_diff() -> DiffMap {
        [(Key::from("a"), Change::set(2))].into_iter().collect()
    }

    #[test]
    fn test_attach_detach() {
        let mut registry = ObserverRegistry::new();

        let first = registry.attach(noop());
        let second = registry.attach(noop());
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        assert!(registry.detach(first));
        assert!(!registry.detach(first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_filter_by_event() {
        let record = make_test_record();
        let mut registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&seen);
        registry.attach(filtered(Event::AFTER_COMMIT, move |_, _| {
            *counter.lock() += 1;
            Ok(())
        }));

        let mut diff = one_key_diff();
        registry.notify(&record, Event::BEFORE_COMMIT, &mut diff).unwrap();
        assert_eq!(*seen.lock(), 0);

        registry.notify(&record, Event::AFTER_COMMIT, &mut diff).unwrap();
        assert_eq!(*seen.lock(), 1);

        // Reserved bits outside the known set are skipped
        registry
            .notify(&record, Event::from_bits_retain(1 << 10), &mut diff)
            .unwrap();
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_combined_mask() {
        let record = make_test_record();
        let mut registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        registry.attach(Box::new(
            move |_: &Record, event: Event, _: &mut DiffMap| -> ObserverResult {
                log.lock().push(event);
                Ok(())
            },
        ));
        let log = Arc::clone(&seen);
        registry.attach(filtered(
            Event::AFTER_FETCH | Event::AFTER_COMMIT,
            move |_, _| {
                log.lock().push(Event::empty());
                Ok(())
            },
        ));

        let mut diff = one_key_diff();
        registry.notify(&record, Event::AFTER_FETCH, &mut diff).unwrap();
        registry.notify(&record, Event::BEFORE_COMMIT, &mut diff).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.iter().filter(|e| e.is_empty()).count(), 1);
    }

    #[test]
    fn test_shared_diff_mutation() {
        let record = make_test_record();
        let mut registry = ObserverRegistry::new();
        let sizes = Arc::new(Mutex::new(Vec::new()));

        registry.attach(filtered(Event::BEFORE_LOCAL_CHANGE, |_, diff| {
            diff.clear();
            Ok(())
        }));
        let log = Arc::clone(&sizes);
        registry.attach(filtered(Event::BEFORE_LOCAL_CHANGE, move |_, diff| {
            log.lock().push(diff.len());
            Ok(())
        }));

        let mut diff = one_key_diff();
        registry
            .notify(&record, Event::BEFORE_LOCAL_CHANGE, &mut diff)
            .unwrap();

        assert!(diff.is_empty());
        assert_eq!(*sizes.lock(), vec![0]);
    }

    #[test]
    fn test_failing_observer_stops_round() {
        let record = make_test_record();
        let mut registry = ObserverRegistry::new();
        let reached = Arc::new(Mutex::new(false));

        registry.attach(filtered(Event::BEFORE_COMMIT, |_, _| Err("rejected".into())));
        let flag = Arc::clone(&reached);
        registry.attach(filtered(Event::BEFORE_COMMIT, move |_, _| {
            *flag.lock() = true;
            Ok(())
        }));

        let mut diff = one_key_diff();
        let result = registry.notify(&record, Event::BEFORE_COMMIT, &mut diff);

        assert!(matches!(
            result,
            Err(RecordError::Observer { event, .. }) if event == Event::BEFORE_COMMIT
        ));
        assert!(!*reached.lock());
    }
}
