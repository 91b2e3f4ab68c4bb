//! Error type shared by every fallible engine operation.
//!
//! Nothing in this subsystem is fatal to the page: callers either fall back
//! to a safe default (bundle loading) or surface the message to the user
//! (map upload, roster import).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VttError {
    /// The persisted scene bundle could not be parsed as JSON at all.
    #[error("scene bundle is not valid JSON: {0}")]
    InvalidBundle(#[source] serde_json::Error),

    #[error("roster could not be read: {0}")]
    InvalidRoster(String),

    /// User-facing: shown before anything is written to storage.
    #[error(
        "Map image is too large ({bytes} bytes, limit {budget} bytes). Please upload a smaller or compressed image."
    )]
    MapTooLarge { bytes: usize, budget: usize },

    #[error("map image reference is invalid: {0}")]
    InvalidMapReference(String),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}
