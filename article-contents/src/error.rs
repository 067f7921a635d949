//! Error types for the capture pipeline

use crate::schema::FieldType;
use thiserror::Error;

/// Error returned by a capture listener. Listeners are not isolated from the
/// coordinator, so this surfaces as [`CaptureError::Listener`].
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by a message handler registered on the router.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by the host when content scripts cannot be installed.
pub type RegistrarError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A payload did not match the schema registered for its channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is not a {expected}")]
    WrongType { field: String, expected: FieldType },
}

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The counter could not hand out a page id. Nothing was broadcast or stored.
    #[error("failed to allocate page id: {0}")]
    Allocation(#[source] StorageError),

    /// The record was broadcast but could not be written.
    #[error("failed to persist page {page_id}: {source}")]
    Persistence {
        page_id: u64,
        #[source]
        source: StorageError,
    },

    /// A listener failed; later listeners were skipped and nothing was stored.
    #[error("listener failed for page {page_id}: {source}")]
    Listener {
        page_id: u64,
        #[source]
        source: ListenerError,
    },

    #[error("malformed capture payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no listener registered for channel `{0}`")]
    UnknownChannel(String),

    #[error("payload rejected on channel `{channel}`: {source}")]
    Schema {
        channel: String,
        #[source]
        source: SchemaError,
    },

    #[error("handler failed on channel `{channel}`: {source}")]
    Handler {
        channel: String,
        #[source]
        source: HandlerError,
    },
}

#[derive(Error, Debug)]
pub enum StudyError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("content script registration failed: {0}")]
    Registration(#[source] RegistrarError),
}
