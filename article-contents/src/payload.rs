//! Capture message, record and transport types

use crate::matching::normalize_url;
use serde::{Deserialize, Serialize};

/// Article content extracted by the in-page observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleContentMessage {
    /// Capture kind, opaque to the pipeline
    #[serde(rename = "type")]
    pub kind: String,
    /// URL as seen by the observer; replaced by the sender's normalized URL
    pub url: String,
    pub title: String,
    pub text: String,
}

/// Browser tab the message originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
}

/// Context the host attaches to every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    pub url: String,
    pub tab: TabInfo,
}

/// The enriched record that is broadcast and persisted.
///
/// The page id is the storage key and is not part of the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub title: String,
    pub text: String,
    #[serde(rename = "tabId")]
    pub tab_id: i64,
}

impl CaptureRecord {
    /// Build a record from a message, taking the URL and tab from the sender
    pub fn enrich(message: ArticleContentMessage, sender: &MessageSender) -> Self {
        Self {
            kind: message.kind,
            url: normalize_url(&sender.url),
            title: message.title,
            text: message.text,
            tab_id: sender.tab.id,
        }
    }
}

/// One line on the capture socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub channel: String,
    pub payload: serde_json::Value,
    pub sender: MessageSender,
}

/// Response written back for every envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Rejected,
    Error,
}

impl DispatchResponse {
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            status: ResponseStatus::Rejected,
            message: Some(reason.to_string()),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender() -> MessageSender {
        MessageSender {
            url: "https://news.example.com/story?utm_source=feed#top".to_string(),
            tab: TabInfo { id: 42 },
        }
    }

    #[test]
    fn test_enrich_overwrites_url_and_sets_tab() {
        let message = ArticleContentMessage {
            kind: "article".to_string(),
            url: "https://spoofed.invalid/".to_string(),
            title: "Story".to_string(),
            text: "Body".to_string(),
        };

        let record = CaptureRecord::enrich(message, &make_sender());
        assert_eq!(record.url, "https://news.example.com/story");
        assert_eq!(record.tab_id, 42);
        assert_eq!(record.kind, "article");
    }

    #[test]
    fn test_record_field_names() {
        let record = CaptureRecord {
            kind: "page".to_string(),
            url: "http://example.com/a".to_string(),
            title: "A".to_string(),
            text: "hello".to_string(),
            tab_id: 7,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "page",
                "url": "http://example.com/a",
                "title": "A",
                "text": "hello",
                "tabId": 7
            })
        );
    }

    #[test]
    fn test_envelope_requires_tab() {
        let line = r#"{"channel":"c","payload":{},"sender":{"url":"http://example.com/"}}"#;
        assert!(serde_json::from_str::<MessageEnvelope>(line).is_err());
    }

    #[test]
    fn test_response_omits_empty_message() {
        let json = serde_json::to_string(&DispatchResponse::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }
}
