//! Article Contents capture service
//!
//! Receives article text extracted from pages in the configured domains,
//! assigns each capture a durable, strictly increasing page id, fans it out
//! to in-process listeners and stores it in SQLite.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod listeners;
pub mod matching;
pub mod messaging;
pub mod payload;
pub mod registrar;
pub mod schema;
pub mod server;
pub mod storage;
pub mod study;

pub use config::{Config, ConfigSource};
pub use coordinator::CaptureCoordinator;
pub use error::{CaptureError, DispatchError, SchemaError, StorageError, StudyError};
pub use listeners::{ListenerHandle, ListenerRegistry};
pub use matching::{normalize_url, ObservationScope};
pub use messaging::{MessageHandler, MessageRouter};
pub use payload::{ArticleContentMessage, CaptureRecord, MessageEnvelope, MessageSender, TabInfo};
pub use registrar::{ContentScriptRegistrar, RecordingRegistrar};
pub use server::CaptureServer;
pub use storage::{Database, KeyValueStore, PageCounter};
pub use study::{load_study_data, ArticleContentsStudy, StudyOptions, ARTICLE_CONTENT_CHANNEL};
