//! Path-bound views into nested maps of a record.

use crate::diff::{Change, DiffMap};
use crate::error::Result;
use crate::record::Record;
use crate::types::{state_to_json, Key, Path, RecordState, Value};

/// The result of reading a key through a record or sub-record.
#[derive(Debug)]
pub enum Slot<'a> {
    /// A non-map value.
    Leaf(&'a Value),
    /// A map, wrapped so writes go back through the owning record.
    Nested(SubRecord<'a>),
}

impl<'a> Slot<'a> {
    pub fn into_leaf(self) -> Option<&'a Value> {
        match self {
            Slot::Leaf(v) => Some(v),
            Slot::Nested(_) => None,
        }
    }

    pub fn into_nested(self) -> Option<SubRecord<'a>> {
        match self {
            Slot::Leaf(_) => None,
            Slot::Nested(sub) => Some(sub),
        }
    }
}

/// A view of the map found at `path` inside a [`Record`].
///
/// Reads resolve against the record's working state. Writes become a
/// `local_patch` on the record that touches only the addressed key, so the
/// record's observers, `changes()` and `apply()` all see them at the right
/// nested location.
#[derive(Debug)]
pub struct SubRecord<'a> {
    record: &'a mut Record,
    path: Path,
}

impl<'a> SubRecord<'a> {
    pub(crate) fn new(record: &'a mut Record, path: Path) -> Self {
        Self { record, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The map this view points at, or `None` if the path no longer
    /// resolves to a map.
    pub fn state(&self) -> Option<&RecordState> {
        self.path
            .keys()
            .iter()
            .try_fold(self.record.working(), |state, key| state.get(key)?.as_map())
    }

    pub fn field(&self, key: impl Into<Key>) -> Option<&Value> {
        self.state()?.get(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.field(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.state().map_or(0, RecordState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.state().into_iter().flatten()
    }

    /// Read `key`, wrapping maps in a sub-record one level deeper.
    pub fn slot(&mut self, key: impl Into<Key>) -> Option<Slot<'_>> {
        let key = key.into();
        if self.field(key.clone())?.is_map() {
            let path = self.path.child(key);
            Some(Slot::Nested(SubRecord::new(&mut *self.record, path)))
        } else {
            self.field(key).map(Slot::Leaf)
        }
    }

    /// The sub-record for the map under `key`, if it holds a map.
    pub fn sub(&mut self, key: impl Into<Key>) -> Option<SubRecord<'_>> {
        self.slot(key)?.into_nested()
    }

    /// Set `key` in this map through the owning record.
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<DiffMap> {
        let patch = DiffMap::at_path(self.path.keys(), key.into(), Change::Set(value.into()));
        self.record.local_patch(&patch)
    }

    /// Remove `key` from this map through the owning record.
    pub fn remove(&mut self, key: impl Into<Key>) -> Result<DiffMap> {
        let patch = DiffMap::at_path(self.path.keys(), key.into(), Change::Deleted);
        self.record.local_patch(&patch)
    }

    /// Overlay several keys of this map in one local change.
    pub fn update(&mut self, partial: RecordState) -> Result<DiffMap> {
        let changes: DiffMap = partial
            .into_iter()
            .map(|(key, value)| (key, Change::Set(value)))
            .collect();
        let patch = DiffMap::nest(self.path.keys(), changes);
        self.record.local_patch(&patch)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.state()
            .map(state_to_json)
            .unwrap_or(serde_json::Value::Null)
    }
}
