//! The tracked record: working state versus stored state.

use crate::diff::{apply_in_place, diff, diff_apply, Change, DiffMap, DiffOptions, EqualityPolicy};
use crate::error::{BoxError, RecordError, Result};
use crate::observers::{filtered, Event, ObserverId, ObserverRegistry, ObserverResult};
use crate::source::{Getter, Setter};
use crate::sub_record::{Slot, SubRecord};
use crate::types::{state_to_json, Key, Path, RecordState, Value};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A record shared between owners. The record itself does no locking.
pub type SharedRecord = Arc<Mutex<Record>>;

/// Record configuration.
#[derive(Clone, Default)]
pub struct RecordConfig {
    /// Identifying handle for the getter and setter (a row key, say).
    pub id: Option<Value>,

    /// Identifying query for the getter and setter.
    pub query: Option<Value>,

    /// How opaque leaf values are compared when diffing.
    pub object_comparer: EqualityPolicy,

    /// Reads the full state from the source.
    /// Default: returns the current working state.
    pub getter: Option<Getter>,

    /// Persists a diff and returns the authoritative full state.
    /// Default: the stored state with the diff applied.
    pub setter: Option<Setter>,
}

impl RecordConfig {
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<Value>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_comparer(mut self, object_comparer: EqualityPolicy) -> Self {
        self.object_comparer = object_comparer;
        self
    }

    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Record) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Record, &DiffMap) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }
}

impl fmt::Debug for RecordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordConfig")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("object_comparer", &self.object_comparer)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// An observable, diffable nested record.
///
/// Tracks two snapshots:
/// - `stored`: the last state fetched from or committed to the source
/// - `working`: the current state, including uncommitted local edits
///
/// Local edits only touch `working` and are gated by the
/// `BEFORE_LOCAL_CHANGE`/`AFTER_LOCAL_CHANGE` events. [`apply`](Self::apply)
/// sends `diff(working, stored)` through the setter and is gated by
/// `BEFORE_COMMIT`/`AFTER_COMMIT`. Both keep the immediately previous
/// snapshot for a single step back.
pub struct Record {
    id: Option<Value>,
    query: Option<Value>,

    working: RecordState,
    stored: RecordState,

    /// `working` before the last local change or fetch.
    working_previous: RecordState,
    /// `stored` before the last commit.
    stored_previous: RecordState,

    getter: Option<Getter>,
    setter: Option<Setter>,
    diff_options: DiffOptions,
    observers: ObserverRegistry,
}

impl Record {
    /// Create a record from initial data, which must be a map.
    pub fn new(data: Value, config: RecordConfig) -> Result<Self> {
        let state = into_state(data, "initial data")?;
        let mut record = Self::from_config(config);
        record.reset_to(state);
        Ok(record)
    }

    /// Create a record whose initial data comes from the getter.
    pub fn fetch(config: RecordConfig) -> Result<Self> {
        let mut record = Self::from_config(config);
        let state = record.read_source()?;
        debug!(id = ?record.id, keys = state.len(), "record fetched at construction");
        record.reset_to(state);
        Ok(record)
    }

    fn from_config(config: RecordConfig) -> Self {
        Self {
            id: config.id,
            query: config.query,
            working: RecordState::new(),
            stored: RecordState::new(),
            working_previous: RecordState::new(),
            stored_previous: RecordState::new(),
            getter: config.getter,
            setter: config.setter,
            diff_options: DiffOptions::with_comparer(config.object_comparer),
            observers: ObserverRegistry::new(),
        }
    }

    fn reset_to(&mut self, state: RecordState) {
        self.working_previous = state.clone();
        self.stored_previous = state.clone();
        self.stored = state.clone();
        self.working = state;
    }

    /// Wrap the record for shared ownership.
    pub fn into_shared(self) -> SharedRecord {
        Arc::new(Mutex::new(self))
    }

    // --- Accessors ---

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub fn query(&self) -> Option<&Value> {
        self.query.as_ref()
    }

    pub fn working(&self) -> &RecordState {
        &self.working
    }

    pub fn stored(&self) -> &RecordState {
        &self.stored
    }

    pub fn working_previous(&self) -> &RecordState {
        &self.working_previous
    }

    pub fn stored_previous(&self) -> &RecordState {
        &self.stored_previous
    }

    pub fn diff_options(&self) -> &DiffOptions {
        &self.diff_options
    }

    // --- Source ---

    fn read_source(&self) -> Result<RecordState> {
        let value = match &self.getter {
            Some(getter) => getter(self).map_err(RecordError::Getter)?,
            None => Value::Map(self.working.clone()),
        };
        into_state(value, "getter")
    }

    fn write_source(&self, changes: &DiffMap) -> Result<RecordState> {
        let value = match &self.setter {
            Some(setter) => setter(self, changes).map_err(RecordError::Setter)?,
            None => Value::Map(diff_apply(&self.stored, changes)),
        };
        into_state(value, "setter")
    }

    /// Re-read from the getter, replacing both snapshots.
    ///
    /// Emits `AFTER_FETCH` with the diff from the pre-fetch working state.
    pub fn get(&mut self) -> Result<&RecordState> {
        let fetched = self.read_source()?;
        self.working_previous = std::mem::replace(&mut self.working, fetched.clone());
        self.stored = fetched;

        let mut changes = self.previous_changes();
        debug!(id = ?self.id, keys = changes.len(), "record fetched");
        self.notify(Event::AFTER_FETCH, &mut changes)?;
        Ok(&self.working)
    }

    // --- Diffs ---

    /// Uncommitted local edits: `diff(working, stored)`.
    pub fn changes(&self) -> DiffMap {
        diff(&self.working, &self.stored, &self.diff_options)
    }

    /// Edits since the previous working state (the last fetch or local change).
    pub fn previous_changes(&self) -> DiffMap {
        diff(&self.working, &self.working_previous, &self.diff_options)
    }

    /// What `local_replace(target)` would change, without applying it.
    pub fn calculate_changes(&self, target: &RecordState) -> DiffMap {
        diff(target, &self.working, &self.diff_options)
    }

    // --- Local changes ---

    /// Replace the working state, running the local change events.
    ///
    /// Returns the applied diff. It is empty when nothing changed or when a
    /// `BEFORE_LOCAL_CHANGE` observer emptied it, and then `working` is left
    /// untouched.
    pub fn local_replace(&mut self, new_working: RecordState) -> Result<DiffMap> {
        self.working_previous = self.working.clone();

        let mut changes = diff(&new_working, &self.working, &self.diff_options);
        if changes.is_empty() {
            return Ok(changes);
        }

        self.notify(Event::BEFORE_LOCAL_CHANGE, &mut changes)?;
        if changes.is_empty() {
            debug!(id = ?self.id, "local change vetoed");
            return Ok(changes);
        }

        apply_in_place(&mut self.working, &changes);
        debug!(id = ?self.id, keys = changes.len(), "local change applied");

        self.notify(Event::AFTER_LOCAL_CHANGE, &mut changes)?;
        Ok(changes)
    }

    /// Overlay top-level keys onto the working state.
    ///
    /// The overlay is shallow: a map in `partial` replaces the whole value
    /// under its key. Use [`local_patch`](Self::local_patch) or a
    /// [`SubRecord`] to touch nested keys only.
    pub fn local_update(&mut self, partial: RecordState) -> Result<DiffMap> {
        let mut next = self.working.clone();
        next.extend(partial);
        self.local_replace(next)
    }

    /// Apply a diff (nested changes and deletions included) to the working
    /// state, running the local change events.
    pub fn local_patch(&mut self, patch: &DiffMap) -> Result<DiffMap> {
        let next = diff_apply(&self.working, patch);
        self.local_replace(next)
    }

    /// Undo the last local change by replacing with the previous working state.
    pub fn local_replace_reverse(&mut self) -> Result<DiffMap> {
        let previous = self.working_previous.clone();
        self.local_replace(previous)
    }

    /// Update both snapshots directly, without diffing or notifying.
    pub fn deaf_set(&mut self, partial: RecordState) {
        self.working.extend(partial.clone());
        self.stored.extend(partial);
    }

    // --- Commits ---

    /// Commit `changes()` through the setter.
    ///
    /// Emits `BEFORE_COMMIT` (observers may shrink or empty the diff), then
    /// replaces both snapshots with the setter's result and emits
    /// `AFTER_FETCH` and `AFTER_COMMIT`. Returns the committed diff, which
    /// is empty if there was nothing to commit or the commit was vetoed.
    /// A failing setter leaves the record as it was.
    pub fn apply(&mut self) -> Result<DiffMap> {
        let prior = std::mem::replace(&mut self.stored_previous, self.stored.clone());

        let mut changes = self.changes();
        if changes.is_empty() {
            return Ok(changes);
        }

        if let Err(e) = self.notify(Event::BEFORE_COMMIT, &mut changes) {
            self.stored_previous = prior;
            return Err(e);
        }
        if changes.is_empty() {
            debug!(id = ?self.id, "commit vetoed");
            return Ok(changes);
        }

        let committed = match self.write_source(&changes) {
            Ok(state) => state,
            Err(e) => {
                warn!(id = ?self.id, error = %e, "commit failed");
                self.stored_previous = prior;
                return Err(e);
            }
        };
        self.stored = committed.clone();
        self.working = committed;
        debug!(id = ?self.id, keys = changes.len(), "commit applied");

        self.notify(Event::AFTER_FETCH, &mut changes)?;
        self.notify(Event::AFTER_COMMIT, &mut changes)?;
        Ok(changes)
    }

    /// Alias for [`apply`](Self::apply).
    pub fn save(&mut self) -> Result<DiffMap> {
        self.apply()
    }

    /// Commit the state that was stored before the last commit.
    ///
    /// This re-commits the old state forward through the setter; it does not
    /// roll back anything the source already persisted.
    pub fn apply_reverse(&mut self) -> Result<DiffMap> {
        self.working = self.stored_previous.clone();
        self.apply()
    }

    /// `local_replace` followed by `apply`. Returns the commit diff.
    pub fn replace(&mut self, new_working: RecordState) -> Result<DiffMap> {
        self.local_replace(new_working)?;
        self.apply()
    }

    /// `local_update` followed by `apply`. Returns the commit diff.
    pub fn update(&mut self, partial: RecordState) -> Result<DiffMap> {
        self.local_update(partial)?;
        self.apply()
    }

    // --- Observers ---

    /// Attach an observer that receives every event along with its type.
    pub fn attach<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Record, Event, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.observers.attach(Box::new(observer))
    }

    /// Attach an observer for every event in `mask`.
    pub fn on_events<F>(&mut self, mask: Event, observer: F) -> ObserverId
    where
        F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.observers.attach(filtered(mask, observer))
    }

    pub fn on_after_fetch<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.on_events(Event::AFTER_FETCH, observer)
    }

    pub fn on_before_local_change<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.on_events(Event::BEFORE_LOCAL_CHANGE, observer)
    }

    pub fn on_after_local_change<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.on_events(Event::AFTER_LOCAL_CHANGE, observer)
    }

    pub fn on_before_commit<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.on_events(Event::BEFORE_COMMIT, observer)
    }

    pub fn on_after_commit<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
    {
        self.on_events(Event::AFTER_COMMIT, observer)
    }

    /// Detach an observer. Returns false if it was not attached.
    pub fn detach(&mut self, id: ObserverId) -> bool {
        self.observers.detach(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Dispatch `event` to the observers. Reserved event bits may be used
    /// for caller-defined events.
    pub fn notify(&self, event: Event, changes: &mut DiffMap) -> Result<()> {
        self.observers.notify(self, event, changes)
    }

    // --- Key access ---

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Key, Value> {
        self.working.iter()
    }

    /// Read a top-level value of the working state.
    pub fn field(&self, key: impl Into<Key>) -> Option<&Value> {
        self.working.get(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.working.contains_key(&key.into())
    }

    /// Set a top-level key locally.
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<DiffMap> {
        let mut partial = RecordState::new();
        partial.insert(key.into(), value.into());
        self.local_update(partial)
    }

    /// Remove a top-level key locally.
    pub fn remove(&mut self, key: impl Into<Key>) -> Result<DiffMap> {
        let patch = DiffMap::at_path(&[], key.into(), Change::Deleted);
        self.local_patch(&patch)
    }

    /// Read a top-level key: maps come back as a [`SubRecord`] bound to the
    /// key, everything else as a plain value.
    pub fn slot(&mut self, key: impl Into<Key>) -> Option<Slot<'_>> {
        let key = key.into();
        if self.working.get(&key)?.is_map() {
            Some(Slot::Nested(SubRecord::new(self, Path::root().child(key))))
        } else {
            self.working.get(&key).map(Slot::Leaf)
        }
    }

    /// A [`SubRecord`] for the map under `key`, if it holds a map.
    pub fn sub(&mut self, key: impl Into<Key>) -> Option<SubRecord<'_>> {
        match self.slot(key)? {
            Slot::Nested(sub) => Some(sub),
            Slot::Leaf(_) => None,
        }
    }

    /// The working state as plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        state_to_json(&self.working)
    }
}

fn into_state(value: Value, origin: &str) -> Result<RecordState> {
    match value {
        Value::Map(state) => Ok(state),
        other => Err(RecordError::InvalidState(format!(
            "{} must be a map, got {}",
            origin,
            other.type_name()
        ))),
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a Key, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, Key, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.working.iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("working", &self.working)
            .field("stored", &self.stored)
            .field("observers", &self.observers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::state_from_json;
    use serde_json::json;

    fn state(json: serde_json::Value) -> RecordState {
        state_from_json(json).unwrap()
    }

    fn make_record(json: serde_json::Value) -> Record {
        Record::new(json.into(), RecordConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_scalar() {
        let result = Record::new(Value::Int(3), RecordConfig::default());
        assert!(matches!(result, Err(RecordError::InvalidState(_))));
    }

    #[test]
    fn test_snapshots_equal_at_construction() {
        let record = make_record(json!({"a": 1}));
        assert_eq!(record.working(), record.stored());
        assert_eq!(record.working_previous(), record.stored());
        assert!(record.changes().is_empty());
    }

    #[test]
    fn test_local_update_is_shallow() {
        let mut record = make_record(json!({"a": 1, "b": {"c": 2, "d": 4}}));

        record.local_update(state(json!({"b": {"c": 3}}))).unwrap();

        assert_eq!(record.working(), &state(json!({"a": 1, "b": {"c": 3}})));
        assert_eq!(record.stored(), &state(json!({"a": 1, "b": {"c": 2, "d": 4}})));
    }

    #[test]
    fn test_local_patch_is_deep() {
        let mut record = make_record(json!({"b": {"c": 2, "d": 4}}));
        let patch = DiffMap::at_path(&[Key::from("b")], Key::from("c"), Change::set(3));

        record.local_patch(&patch).unwrap();

        assert_eq!(record.working(), &state(json!({"b": {"c": 3, "d": 4}})));
    }

    #[test]
    fn test_remove_marks_deleted() {
        let mut record = make_record(json!({"a": 1, "b": 2}));
        record.remove("a").unwrap();

        assert!(!record.contains_key("a"));
        assert_eq!(record.changes().get(&Key::from("a")), Some(&Change::Deleted));
    }

    #[test]
    fn test_local_replace_reverse() {
        let mut record = make_record(json!({"a": 1}));
        record.set("a", 2).unwrap();
        assert_eq!(record.field("a"), Some(&Value::Int(2)));

        record.local_replace_reverse().unwrap();
        assert_eq!(record.field("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_default_setter_echoes_working() {
        let mut record = make_record(json!({"a": 1, "b": 2}));
        record.set("a", 5).unwrap();
        record.remove("b").unwrap();

        let committed = record.apply().unwrap();

        assert_eq!(committed.len(), 2);
        assert_eq!(record.stored(), &state(json!({"a": 5})));
        assert_eq!(record.working(), record.stored());
        assert!(record.changes().is_empty());
    }

    #[test]
    fn test_apply_with_nothing_to_commit() {
        let mut record = make_record(json!({"a": 1}));
        assert!(record.apply().unwrap().is_empty());
    }

    #[test]
    fn test_apply_reverse_recommits_previous() {
        let mut record = make_record(json!({"a": 1}));
        record.update(state(json!({"a": 2}))).unwrap();
        assert_eq!(record.stored_previous(), &state(json!({"a": 1})));

        let reverted = record.apply_reverse().unwrap();

        assert_eq!(reverted.get(&Key::from("a")), Some(&Change::Set(Value::Int(1))));
        assert_eq!(record.stored(), &state(json!({"a": 1})));
        assert_eq!(record.stored_previous(), &state(json!({"a": 2})));
    }

    #[test]
    fn test_deaf_set_updates_both_silently() {
        let mut record = make_record(json!({"a": 1}));
        record.on_events(Event::all(), |_, _| Err("should not fire".into()));

        record.deaf_set(state(json!({"b": 2})));

        assert_eq!(record.working(), &state(json!({"a": 1, "b": 2})));
        assert_eq!(record.stored(), record.working());
        assert!(record.changes().is_empty());
    }

    #[test]
    fn test_calculate_changes_does_not_apply() {
        let record = make_record(json!({"a": 1}));
        let target = state(json!({"a": 2}));

        let changes = record.calculate_changes(&target);

        assert_eq!(changes.len(), 1);
        assert_eq!(record.field("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_iteration_surface() {
        let record = make_record(json!({"a": 1, "b": {"c": 2}}));

        assert_eq!(record.len(), 2);
        let keys: Vec<_> = (&record).into_iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"a": 1, "b": {"c": 2}})
        );
    }
}
