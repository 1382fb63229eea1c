//! Equality rules for opaque leaf values.

use crate::types::OpaqueValue;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied comparer for opaque values.
pub type ObjectComparer = Arc<dyn Fn(&OpaqueValue, &OpaqueValue) -> bool + Send + Sync>;

/// Decides whether two opaque leaf values are equal.
///
/// Only consulted when both sides of a comparison are opaque; scalars and
/// maps never reach it.
#[derive(Clone, Default)]
pub enum EqualityPolicy {
    /// Opaque values are never equal, so they are always replaced.
    #[default]
    Never,
    /// Equal when both sides share the same allocation.
    Identity,
    Custom(ObjectComparer),
}

impl EqualityPolicy {
    /// Build a policy from a comparer closure.
    pub fn custom<F>(comparer: F) -> Self
    where
        F: Fn(&OpaqueValue, &OpaqueValue) -> bool + Send + Sync + 'static,
    {
        EqualityPolicy::Custom(Arc::new(comparer))
    }

    pub fn equals(&self, a: &OpaqueValue, b: &OpaqueValue) -> bool {
        match self {
            EqualityPolicy::Never => false,
            EqualityPolicy::Identity => a.ptr_eq(b),
            EqualityPolicy::Custom(comparer) => comparer(a, b),
        }
    }
}

impl fmt::Debug for EqualityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualityPolicy::Never => write!(f, "Never"),
            EqualityPolicy::Identity => write!(f, "Identity"),
            EqualityPolicy::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// Options for [`diff`](super::diff).
#[derive(Clone, Debug, Default)]
pub struct DiffOptions {
    pub object_comparer: EqualityPolicy,
}

impl DiffOptions {
    pub fn with_comparer(object_comparer: EqualityPolicy) -> Self {
        Self { object_comparer }
    }
}
