//! Contracts for the external source behind a record, plus an in-memory table.

use crate::diff::{apply_in_place, DiffMap};
use crate::error::BoxError;
use crate::record::{Record, RecordConfig};
use crate::types::{RecordState, Value};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Reads the full state for a record. Must return a map.
pub type Getter = Arc<dyn Fn(&Record) -> Result<Value, BoxError> + Send + Sync>;

/// Persists a diff for a record and returns the authoritative full state
/// (server-assigned fields included). Must return a map.
pub type Setter = Arc<dyn Fn(&Record, &DiffMap) -> Result<Value, BoxError> + Send + Sync>;

#[derive(Default)]
struct TableInner {
    rows: IndexMap<String, RecordState>,
    commits: u64,
}

/// An in-process table of rows keyed by record id.
///
/// Hands out getter/setter pairs that read and write the row named by the
/// record's `id`. Clones share the same rows.
#[derive(Clone, Default)]
pub struct MemoryTable {
    inner: Arc<Mutex<TableInner>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, row: RecordState) {
        self.inner.lock().rows.insert(id.into(), row);
    }

    pub fn row(&self, id: &str) -> Option<RecordState> {
        self.inner.lock().rows.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().rows.is_empty()
    }

    /// Number of successful setter calls.
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    /// A getter returning the row for the record's id.
    pub fn getter(&self) -> Getter {
        let table = self.clone();
        Arc::new(move |record: &Record| -> Result<Value, BoxError> {
            let id = row_id(record)?;
            table
                .row(&id)
                .map(Value::Map)
                .ok_or_else(|| format!("row not found: {}", id).into())
        })
    }

    /// A setter applying the diff to the record's row (creating it if
    /// needed) and returning the row.
    pub fn setter(&self) -> Setter {
        let table = self.clone();
        Arc::new(move |record: &Record, changes: &DiffMap| -> Result<Value, BoxError> {
            let id = row_id(record)?;
            let mut inner = table.inner.lock();
            let row = {
                let row = inner.rows.entry(id).or_default();
                apply_in_place(row, changes);
                row.clone()
            };
            inner.commits += 1;
            Ok(Value::Map(row))
        })
    }

    /// Config for a record backed by the row `id`.
    pub fn config(&self, id: impl Into<String>) -> RecordConfig {
        RecordConfig {
            id: Some(Value::String(id.into())),
            getter: Some(self.getter()),
            setter: Some(self.setter()),
            ..Default::default()
        }
    }
}

fn row_id(record: &Record) -> Result<String, BoxError> {
    record
        .id()
        .map(Value::to_string)
        .ok_or_else(|| "record has no id".into())
}
