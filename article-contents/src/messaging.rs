//! Named-channel message dispatch with per-listener payload schemas

use crate::error::{DispatchError, HandlerError, SchemaError};
use crate::payload::{MessageEnvelope, MessageSender};
use crate::schema::MessageSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{trace, warn};

/// Receives messages whose payload passed the channel schema
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Value, sender: &MessageSender) -> Result<(), HandlerError>;
}

struct Route {
    handler: Arc<dyn MessageHandler>,
    schema: MessageSchema,
}

/// Routes message envelopes to the handlers registered on their channel
#[derive(Default)]
pub struct MessageRouter {
    routes: RwLock<HashMap<String, Vec<Arc<Route>>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler to `channel`. Payloads failing `schema` never reach it.
    pub fn register_listener(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
        schema: MessageSchema,
    ) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(Arc::new(Route { handler, schema }));
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Deliver an envelope to every handler on its channel, in registration
    /// order. The first handler error is returned and later handlers are skipped.
    pub async fn dispatch(&self, envelope: MessageEnvelope) -> Result<(), DispatchError> {
        let routes: Vec<Arc<Route>> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.channel)
            .cloned()
            .unwrap_or_default();

        if routes.is_empty() {
            return Err(DispatchError::UnknownChannel(envelope.channel));
        }

        let mut rejection: Option<SchemaError> = None;
        let mut delivered = 0usize;

        for route in routes {
            if let Err(e) = route.schema.validate(&envelope.payload) {
                warn!("Rejected message on {}: {}", envelope.channel, e);
                rejection.get_or_insert(e);
                continue;
            }

            trace!("Dispatching message on {}", envelope.channel);
            route
                .handler
                .handle(envelope.payload.clone(), &envelope.sender)
                .await
                .map_err(|source| DispatchError::Handler {
                    channel: envelope.channel.clone(),
                    source,
                })?;
            delivered += 1;
        }

        match rejection {
            Some(source) if delivered == 0 => Err(DispatchError::Schema {
                channel: envelope.channel,
                source,
            }),
            _ => Ok(()),
        }
    }
}
