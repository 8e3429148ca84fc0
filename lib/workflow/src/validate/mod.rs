//! Publish-time validation.
//!
//! A graph is validated in two passes before it is compiled or published:
//! [`GraphStructureValidator`] checks that it is a well-formed DAG with a
//! trigger, then [`NodeConfigValidator`] checks each node's configuration
//! against the device catalog.

mod config;
mod structure;

pub use config::NodeConfigValidator;
pub use structure::GraphStructureValidator;
