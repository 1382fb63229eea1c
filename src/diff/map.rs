//! Sparse structural deltas between two record states.

use crate::types::{Key, Value};
use indexmap::IndexMap;

/// What happened to a single key.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// The key now holds this value.
    Set(Value),
    /// Both sides were maps; the nested delta applies below this key.
    Nested(DiffMap),
    /// The key was removed.
    Deleted,
}

impl Change {
    /// Shorthand for `Change::Set(value.into())`.
    pub fn set(value: impl Into<Value>) -> Self {
        Change::Set(value.into())
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Change::Deleted)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Change::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&DiffMap> {
        match self {
            Change::Nested(d) => Some(d),
            _ => None,
        }
    }
}

/// A sparse delta: keys absent from the map are unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiffMap(IndexMap<Key, Change>);

impl DiffMap {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Change> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Change> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<Key>, change: Change) -> Option<Change> {
        self.0.insert(key.into(), change)
    }

    /// Drop a key from the delta, leaving that key unchanged.
    pub fn remove(&mut self, key: &Key) -> Option<Change> {
        self.0.shift_remove(key)
    }

    /// Drop every key; a vetoing observer calls this.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Key, &mut Change) -> bool,
    {
        self.0.retain(keep);
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Key, Change> {
        self.0.iter()
    }

    /// Build a delta that touches only `key` below `path`.
    ///
    /// Every ancestor becomes a `Nested` change so siblings stay untouched.
    pub fn at_path(path: &[Key], key: Key, change: Change) -> Self {
        let mut diff = DiffMap::new();
        diff.insert(key, change);
        Self::nest(path, diff)
    }

    /// Wrap `inner` in one `Nested` change per key of `path`, outermost first.
    pub fn nest(path: &[Key], inner: DiffMap) -> Self {
        path.iter().rev().fold(inner, |diff, ancestor| {
            let mut outer = DiffMap::new();
            outer.insert(ancestor.clone(), Change::Nested(diff));
            outer
        })
    }
}

impl FromIterator<(Key, Change)> for DiffMap {
    fn from_iter<I: IntoIterator<Item = (Key, Change)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for DiffMap {
    type Item = (Key, Change);
    type IntoIter = indexmap::map::IntoIter<Key, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DiffMap {
    type Item = (&'a Key, &'a Change);
    type IntoIter = indexmap::map::Iter<'a, Key, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
