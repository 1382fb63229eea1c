//! # Tracked Record
//!
//! A nested, observable, diffable record: an arbitrarily deep map that
//! tracks how its current working state diverges from the last state known
//! to its source.
//!
//! ## Core Concepts
//!
//! - **Records**: a working state and a stored state, plus one step of history
//! - **Diffs**: sparse structural deltas with an explicit deletion marker
//! - **Observers**: synchronous callbacks that can inspect or veto changes
//! - **Sub-records**: path-bound views whose writes land on the owning record
//! - **Sources**: injected getter/setter closures; the record does no I/O
//!
//! ## Example
//!
//! ```ignore
//! use tracked_record::{Record, RecordConfig, Value};
//! use serde_json::json;
//!
//! let mut record = Record::new(
//!     json!({"name": "ada", "address": {"city": "London"}}).into(),
//!     RecordConfig::default(),
//! )?;
//!
//! // Veto any change to the name
//! record.on_before_local_change(|_, diff| {
//!     diff.remove(&"name".into());
//!     Ok(())
//! });
//!
//! // Write through a sub-record
//! record.sub("address").unwrap().set("city", "Paris")?;
//!
//! // Commit through the setter
//! let committed = record.apply()?;
//! ```

pub mod diff;
pub mod error;
pub mod observers;
pub mod record;
pub mod source;
pub mod sub_record;
pub mod types;

// Re-exports
pub use diff::{diff, diff_apply, Change, DiffMap, DiffOptions, EqualityPolicy, ObjectComparer};
pub use error::{BoxError, RecordError, Result};
pub use observers::{Event, ObserverId, ObserverRegistry, ObserverResult};
pub use record::{Record, RecordConfig, SharedRecord};
pub use source::{Getter, MemoryTable, Setter};
pub use sub_record::{Slot, SubRecord};
pub use types::*;
