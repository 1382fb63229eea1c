//! Observer types.

use crate::diff::DiffMap;
use crate::error::BoxError;
use crate::record::Record;
use bitflags::bitflags;

bitflags! {
    /// Lifecycle events emitted by a [`Record`].
    ///
    /// Flags combine, so one observer can listen to several events. Bits
    /// outside the named set are reserved for caller-defined events.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Event: u32 {
        /// Fresh state was observed from the source (fetch or commit).
        const AFTER_FETCH = 1;
        /// A local change is about to be applied; the diff may be vetoed.
        const BEFORE_LOCAL_CHANGE = 2;
        const AFTER_LOCAL_CHANGE = 4;
        /// A commit is about to reach the setter; the diff may be vetoed.
        const BEFORE_COMMIT = 8;
        const AFTER_COMMIT = 16;
    }
}

/// Unique identifier for an attached observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Result returned by observers. An error aborts the triggering operation.
pub type ObserverResult = std::result::Result<(), BoxError>;

/// A raw observer: sees every event together with its type.
pub type Observer = Box<dyn Fn(&Record, Event, &mut DiffMap) -> ObserverResult + Send + Sync>;

/// Wrap `observer` so it only runs for events intersecting `mask`.
///
/// Events sharing no bit with `mask`, including reserved ones, are skipped.
pub fn filtered<F>(mask: Event, observer: F) -> Observer
where
    F: Fn(&Record, &mut DiffMap) -> ObserverResult + Send + Sync + 'static,
{
    Box::new(move |record: &Record, event: Event, diff: &mut DiffMap| {
        if event.intersects(mask) {
            observer(record, diff)
        } else {
            Ok(())
        }
    })
}
