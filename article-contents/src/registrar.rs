//! Content observer injection requests

use crate::error::RegistrarError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunAt {
    DocumentStart,
    DocumentEnd,
    DocumentIdle,
}

/// Scripts to inject into every page matching `matches`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentScriptRegistration {
    pub matches: Vec<String>,
    pub js: Vec<String>,
    pub run_at: RunAt,
}

/// Host hook that installs the content observer
#[async_trait]
pub trait ContentScriptRegistrar: Send + Sync {
    async fn register(
        &self,
        registration: ContentScriptRegistration,
    ) -> Result<(), RegistrarError>;
}

/// Keeps registrations in memory and logs them.
///
/// Used when the observer is installed by a browser extension that reads the
/// match patterns from the service rather than being injected directly.
#[derive(Default)]
pub struct RecordingRegistrar {
    registrations: Mutex<Vec<ContentScriptRegistration>>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> Vec<ContentScriptRegistration> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContentScriptRegistrar for RecordingRegistrar {
    async fn register(
        &self,
        registration: ContentScriptRegistration,
    ) -> Result<(), RegistrarError> {
        if registration.matches.is_empty() {
            warn!("Content scripts registered with no match patterns; no pages will be observed");
        } else {
            info!(
                "Content scripts {:?} registered for {:?}",
                registration.js, registration.matches
            );
        }

        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);
        Ok(())
    }
}
