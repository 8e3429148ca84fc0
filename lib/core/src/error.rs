//! Shared error plumbing.
//!
//! Only the `Result` alias lives here. Domain crates own their error enums
//! (graph structure, node configuration, trigger index storage, pipeline) and
//! wrap them in a rootcause [`Report`] where a failure crosses a crate boundary.

use rootcause::Report;

/// Result alias carrying a rootcause [`Report`] with context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
