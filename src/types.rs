//! Core types for tracked records.

use crate::error::{RecordError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A key into a [`RecordState`].
///
/// Lists are modelled as mappings with sequential `Index` keys. Names that
/// spell a canonical decimal integer (`"0"`, `"-3"`, but not `"01"`) are the
/// same key as the index, so every conversion from a string folds them into
/// `Index`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Key {
    Index(i64),
    Name(String),
}

impl Key {
    /// Build a key from a name, folding canonical integers into `Index`.
    pub fn from_name(name: String) -> Self {
        match canonical_index(&name) {
            Some(i) => Key::Index(i),
            None => Key::Name(name),
        }
    }

    /// Get the name if this is a named key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(n) => Some(n),
            Key::Index(_) => None,
        }
    }

    /// Get the index if this is an index key.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Key::Name(_) => None,
            Key::Index(i) => Some(*i),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(n) => write!(f, "{:?}", n),
            Key::Index(i) => write!(f, "{}", i),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(n) => write!(f, "{}", n),
            Key::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::from_name(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::from_name(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::from_name(s.clone())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Index(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Index(i64::from(i))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i as i64)
    }
}

fn canonical_index(name: &str) -> Option<i64> {
    let index: i64 = name.parse().ok()?;
    (index.to_string() == name).then_some(index)
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawKey {
            Index(i64),
            Name(String),
        }

        Ok(match RawKey::deserialize(deserializer)? {
            RawKey::Index(i) => Key::Index(i),
            RawKey::Name(name) => Key::from_name(name),
        })
    }
}

/// A location inside a record, as a sequence of keys from the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Key>);

impl Path {
    /// The empty path (the record root).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Return a new path extended by `key`.
    pub fn child(&self, key: impl Into<Key>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        write!(f, "$")?;
        for key in &self.0 {
            match key {
                Key::Name(n) => write!(f, ".{}", n)?,
                Key::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

impl<K: Into<Key>> FromIterator<K> for Path {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A nested mapping: the shape of both the working and the stored state.
pub type RecordState = IndexMap<Key, Value>;

/// Behaviour required of an opaque leaf object.
///
/// Blanket-implemented for anything serialisable and debuggable.
pub trait OpaqueLeaf: Any + Send + Sync + fmt::Debug {
    fn to_json(&self) -> serde_json::Value;
    fn as_any(&self) -> &dyn Any;
}

impl<T> OpaqueLeaf for T
where
    T: Any + Send + Sync + fmt::Debug + Serialize,
{
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An opaque leaf value (a timestamp, a money amount, ...).
///
/// The diff engine never looks inside it; whether two opaque values are
/// equal is decided by the configured [`EqualityPolicy`](crate::EqualityPolicy).
#[derive(Clone)]
pub struct OpaqueValue(Arc<dyn OpaqueLeaf>);

impl OpaqueValue {
    pub fn new<T: OpaqueLeaf>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the wrapped object as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// True if both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &OpaqueValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        (*self.0).to_json()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.0).finish()
    }
}

/// A value stored under a key.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Opaque(OpaqueValue),
    Map(RecordState),
}

impl Value {
    /// Wrap an arbitrary object as an opaque leaf.
    pub fn opaque<T: OpaqueLeaf>(value: T) -> Self {
        Value::Opaque(OpaqueValue::new(value))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&RecordState> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut RecordState> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<RecordState> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueValue> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Opaque(_) => "opaque",
            Value::Map(_) => "map",
        }
    }

    /// Render as plain JSON.
    ///
    /// Maps keyed exactly `0..n` in order render as arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Opaque(o) => o.to_json(),
            Value::Map(m) => state_to_json(m),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Map(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Key::from(i), Value::from(v)))
                    .collect(),
            ),
            serde_json::Value::Object(fields) => Value::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (Key::from_name(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<OpaqueValue> for Value {
    fn from(o: OpaqueValue) -> Self {
        Value::Opaque(o)
    }
}

impl From<RecordState> for Value {
    fn from(m: RecordState) -> Self {
        Value::Map(m)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// Convert a JSON object or array into a [`RecordState`].
pub fn state_from_json(json: serde_json::Value) -> Result<RecordState> {
    let value = Value::from(json);
    let found = value.type_name();
    value.into_map().ok_or_else(|| {
        RecordError::InvalidState(format!("record must be a map, got {}", found))
    })
}

/// Parse JSON text into a [`RecordState`].
pub fn state_from_str(text: &str) -> Result<RecordState> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    state_from_json(json)
}

/// Render a [`RecordState`] as plain JSON.
pub fn state_to_json(state: &RecordState) -> serde_json::Value {
    let is_list = !state.is_empty()
        && state
            .keys()
            .enumerate()
            .all(|(i, k)| k.as_index() == Some(i as i64));

    if is_list {
        serde_json::Value::Array(state.values().map(Value::to_json).collect())
    } else {
        serde_json::Value::Object(
            state
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}
