//! Article contents study lifecycle
//!
//! Owns the listener registry and, after the first successful
//! [`ArticleContentsStudy::run_study`], the storage namespace, page counter
//! and capture coordinator. Later calls to `run_study` are no-ops.

use crate::coordinator::CaptureCoordinator;
use crate::error::{ListenerError, StorageError, StudyError};
use crate::listeners::{ListenerHandle, ListenerRegistry};
use crate::matching::ObservationScope;
use crate::messaging::MessageRouter;
use crate::payload::CaptureRecord;
use crate::registrar::{ContentScriptRegistrar, ContentScriptRegistration, RunAt};
use crate::schema::{FieldType, MessageSchema};
use crate::storage::{Database, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Key-value namespace holding `pageId -> CaptureRecord`
pub const STORAGE_NAMESPACE: &str = "WebScience.Measurements.ArticleContents";

/// Counter handing out page ids
pub const PAGE_ID_COUNTER: &str = "WebScience.Measurements.ArticleContents.nextPageId";

/// Channel the content observer posts extracted articles to
pub const ARTICLE_CONTENT_CHANNEL: &str = "WebScience.articleContent";

/// Scripts injected into observed pages, in load order
pub const CONTENT_SCRIPTS: &[&str] = &[
    "/src/WebScience/Measurements/content-scripts/Readability.js",
    "/src/WebScience/Measurements/content-scripts/page-content.js",
];

/// Payload shape accepted on [`ARTICLE_CONTENT_CHANNEL`]
pub fn article_content_schema() -> MessageSchema {
    MessageSchema::new()
        .field("type", FieldType::String)
        .field("url", FieldType::String)
        .field("title", FieldType::String)
        .field("text", FieldType::String)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyOptions {
    /// Domains of interest; subdomains are included
    #[serde(default)]
    pub domains: Vec<String>,
}

struct StudyContext {
    storage: Arc<dyn KeyValueStore>,
    scope: ObservationScope,
}

pub struct ArticleContentsStudy {
    database: Database,
    router: Arc<MessageRouter>,
    registrar: Arc<dyn ContentScriptRegistrar>,
    listeners: Arc<ListenerRegistry>,
    context: OnceCell<StudyContext>,
}

impl ArticleContentsStudy {
    pub fn new(
        database: Database,
        router: Arc<MessageRouter>,
        registrar: Arc<dyn ContentScriptRegistrar>,
    ) -> Self {
        Self {
            database,
            router,
            registrar,
            listeners: Arc::new(ListenerRegistry::new()),
            context: OnceCell::new(),
        }
    }

    /// Start the study.
    ///
    /// Only the first successful call takes effect, including its `domains`.
    /// Concurrent calls wait for that one. If initialization fails nothing is
    /// kept and a later call tries again.
    pub async fn run_study(&self, options: StudyOptions) -> Result<(), StudyError> {
        if self.context.initialized() {
            debug!("Article contents study already running, ignoring {:?}", options.domains);
            return Ok(());
        }

        self.context
            .get_or_try_init(|| self.initialize(options))
            .await?;
        Ok(())
    }

    async fn initialize(&self, options: StudyOptions) -> Result<StudyContext, StudyError> {
        let storage: Arc<dyn KeyValueStore> =
            Arc::new(self.database.key_value_storage(STORAGE_NAMESPACE).await?);
        let counter = Arc::new(self.database.counter(PAGE_ID_COUNTER).await?);

        let scope = ObservationScope::new(&options.domains);

        self.registrar
            .register(ContentScriptRegistration {
                matches: scope.match_patterns(),
                js: CONTENT_SCRIPTS.iter().map(|s| s.to_string()).collect(),
                run_at: RunAt::DocumentIdle,
            })
            .await
            .map_err(StudyError::Registration)?;

        let coordinator = CaptureCoordinator::new(
            Arc::clone(&storage),
            counter,
            Arc::clone(&self.listeners),
        );
        self.router.register_listener(
            ARTICLE_CONTENT_CHANNEL,
            Arc::new(coordinator),
            article_content_schema(),
        );

        info!(
            "Article contents study started for {} domain(s)",
            options.domains.len()
        );
        Ok(StudyContext { storage, scope })
    }

    pub fn is_running(&self) -> bool {
        self.context.initialized()
    }

    /// Scope from the first successful `run_study`
    pub fn scope(&self) -> Option<&ObservationScope> {
        self.context.get().map(|ctx| &ctx.scope)
    }

    /// Subscribe to every coordinated capture. Works before the study starts.
    pub fn register_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&CaptureRecord) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    /// All stored captures keyed by page id, or `None` before the study has
    /// started. Reads the whole namespace, so this gets slow with many pages.
    pub async fn get_study_data_as_object(
        &self,
    ) -> Result<Option<BTreeMap<String, CaptureRecord>>, StorageError> {
        let Some(context) = self.context.get() else {
            return Ok(None);
        };

        decode_records(context.storage.as_ref()).await.map(Some)
    }
}

/// Read stored captures straight from the database without starting a study.
///
/// Registers nothing and allocates no counter, so it is safe for offline dumps.
pub async fn load_study_data(
    database: &Database,
) -> Result<BTreeMap<String, CaptureRecord>, StorageError> {
    let storage = database.key_value_storage(STORAGE_NAMESPACE).await?;
    decode_records(&storage).await
}

async fn decode_records(
    storage: &dyn KeyValueStore,
) -> Result<BTreeMap<String, CaptureRecord>, StorageError> {
    let mut records = BTreeMap::new();
    for (key, value) in storage.get_contents_as_object().await? {
        records.insert(key, serde_json::from_value(value)?);
    }
    Ok(records)
}
