//! Error types for the device crate.

use std::fmt;

/// Errors from catalog lookups.
///
/// A missing entity is not an error; lookups return `None` for that. These
/// variants describe the catalog itself being unable to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The backing store could not be reached.
    Unavailable { reason: String },
    /// A stored record could not be decoded.
    CorruptRecord { entity: &'static str, reason: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "device catalog unavailable: {reason}"),
            Self::CorruptRecord { entity, reason } => {
                write!(f, "corrupt {entity} record: {reason}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Errors raised while handing a command to the device transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The transport rejected or could not deliver the command.
    Transport { reason: String },
    /// The device has no broker or topic configuration to publish to.
    NotRoutable { reason: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => write!(f, "command transport failed: {reason}"),
            Self::NotRoutable { reason } => write!(f, "command not routable: {reason}"),
        }
    }
}

impl std::error::Error for DispatchError {}
