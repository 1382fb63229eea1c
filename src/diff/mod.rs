//! Structural diff engine.
//!
//! Pure functions over [`RecordState`](crate::RecordState):
//! - [`diff`] computes the sparse delta between two states
//! - [`diff_apply`] replays a delta on top of a base state
//!
//! Deletions are represented by [`Change::Deleted`], so "set to null" and
//! "removed" stay distinguishable. Opaque leaves are compared through the
//! [`EqualityPolicy`] carried in [`DiffOptions`].

mod engine;
mod map;
mod policy;

pub use engine::{apply_in_place, diff, diff_apply};
pub use map::{Change, DiffMap};
pub use policy::{DiffOptions, EqualityPolicy, ObjectComparer};
