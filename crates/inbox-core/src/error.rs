//! Error types for parsing core identifiers.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown domain: {0} (expected messages or notifications)")]
    UnknownDomain(String),

    #[error("unknown visibility: {0} (expected visible or hidden)")]
    UnknownVisibility(String),
}
