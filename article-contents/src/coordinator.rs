//! Capture coordinator: page id allocation, enrichment, fan-out and persistence

use crate::error::{CaptureError, HandlerError};
use crate::listeners::ListenerRegistry;
use crate::messaging::MessageHandler;
use crate::payload::{ArticleContentMessage, CaptureRecord, MessageSender};
use crate::storage::{KeyValueStore, PageCounter};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Processes article content messages for one study.
///
/// Each capture runs these steps in order:
/// 1. allocate a page id from the counter
/// 2. replace the URL with the sender's normalized URL and attach the tab id
/// 3. broadcast to all listeners
/// 4. write the record under the stringified page id
///
/// Listeners see a record before it is written. If the write then fails the
/// broadcast is not retracted and the caller gets [`CaptureError::Persistence`].
/// A failing listener aborts the capture before the write, leaving a gap in
/// the page id sequence.
pub struct CaptureCoordinator {
    storage: Arc<dyn KeyValueStore>,
    counter: Arc<dyn PageCounter>,
    listeners: Arc<ListenerRegistry>,
}

impl CaptureCoordinator {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        counter: Arc<dyn PageCounter>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            storage,
            counter,
            listeners,
        }
    }

    /// Coordinate one capture, returning the page id it was stored under
    pub async fn capture(
        &self,
        message: ArticleContentMessage,
        sender: &MessageSender,
    ) -> Result<u64, CaptureError> {
        let page_id = self
            .counter
            .get_and_increment()
            .await
            .map_err(CaptureError::Allocation)?;

        let record = CaptureRecord::enrich(message, sender);
        let value = serde_json::to_value(&record)?;

        self.listeners
            .broadcast(&record)
            .map_err(|source| CaptureError::Listener { page_id, source })?;

        self.storage
            .set(&page_id.to_string(), &value)
            .await
            .map_err(|source| CaptureError::Persistence { page_id, source })?;

        debug!("Stored page {}: {}", page_id, value);
        Ok(page_id)
    }
}

#[async_trait]
impl MessageHandler for CaptureCoordinator {
    async fn handle(&self, payload: Value, sender: &MessageSender) -> Result<(), HandlerError> {
        let message: ArticleContentMessage =
            serde_json::from_value(payload).map_err(CaptureError::from)?;
        self.capture(message, sender).await?;
        Ok(())
    }
}
