//! Observer system for record lifecycle events.
//!
//! Observers are synchronous callbacks invoked in-line by the operation that
//! triggers them:
//! - fetches and commits (`AFTER_FETCH`)
//! - local changes (`BEFORE_LOCAL_CHANGE`, `AFTER_LOCAL_CHANGE`)
//! - commits (`BEFORE_COMMIT`, `AFTER_COMMIT`)
//!
//! Every observer in one round receives the same mutable diff. A `BEFORE_*`
//! observer vetoes a change by emptying that diff.
//!
//! # Example
//!
//! ```ignore
//! let id = record.on_before_commit(|_, diff| {
//!     diff.remove(&Key::from("password"));
//!     Ok(())
//! });
//!
//! record.update(changes)?;
//! record.detach(id);
//! ```

mod registry;
mod types;

pub use registry::ObserverRegistry;
pub use types::{filtered, Event, Observer, ObserverId, ObserverResult};
