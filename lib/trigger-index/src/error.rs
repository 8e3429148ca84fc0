//! Error types for the trigger index.
//!
//! Store and catalog failures reach callers wrapped in a rootcause
//! [`Report`](rootcause::Report). Stale trigger references are not errors;
//! the compiler skips them.

use sensorflow_device::CatalogError;
use std::fmt;

/// Errors from compiling or matching the trigger index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerIndexError {
    /// The index store could not be read or written.
    Store { reason: String },
    /// The device catalog could not answer.
    Catalog(CatalogError),
}

impl fmt::Display for TriggerIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store { reason } => write!(f, "trigger index store failed: {reason}"),
            Self::Catalog(e) => write!(f, "trigger index catalog lookup failed: {e}"),
        }
    }
}

impl std::error::Error for TriggerIndexError {}

impl From<CatalogError> for TriggerIndexError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_side() {
        let store = TriggerIndexError::Store {
            reason: "lock poisoned".to_string(),
        };
        assert_eq!(store.to_string(), "trigger index store failed: lock poisoned");

        let catalog = TriggerIndexError::from(CatalogError::Unavailable {
            reason: "timeout".to_string(),
        });
        assert!(catalog.to_string().contains("catalog lookup failed"));
        assert!(catalog.to_string().contains("timeout"));
    }
}
