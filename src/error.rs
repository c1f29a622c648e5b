//! Error types for the document engine

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ElementId;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers of the intent surface
#[derive(Error, Debug)]
pub enum Error {
    /// A mutation was rejected or referenced a missing element
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Saved data could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Failed to set up the session
    #[error("Session initialization failed: {0}")]
    Initialization(String),

    /// The owner task has stopped
    #[error("Session is closed")]
    SessionClosed,
}

impl Error {
    /// True when the error only says the referenced element does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Model(e) if e.is_not_found())
    }
}

/// Rejections produced by the document model
///
/// Validation failures leave the document untouched. `NotFound` is a no-op
/// signal rather than a failure: nothing was changed and no notification was
/// emitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Element content must not be empty")]
    InvalidContent,

    #[error("Element size must be positive, got {0}")]
    InvalidSize(i32),

    #[error("Scale factor must be positive and finite, got {0}")]
    InvalidScale(f64),

    #[error("No element with id {0}")]
    NotFound(ElementId),

    #[error("No element ids left to issue")]
    IdSpaceExhausted,
}

impl ModelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }
}

/// Codec failures; fatal to the encode or decode call only
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The document could not be serialized
    #[error("Couldn't serialize document: {0}")]
    Encode(String),

    /// Bytes are not the expected structured format
    #[error("Malformed document data: {0}")]
    MalformedData(String),

    /// Well-formed data that breaks a document invariant
    #[error("Document schema violation: {0}")]
    SchemaViolation(String),
}

/// Autosave failures, reported asynchronously and never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Couldn't encode document: {0}")]
    Encode(#[from] CodecError),

    #[error("Failed to write {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Background image retrieval failures, surfaced only as a fetch status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}
