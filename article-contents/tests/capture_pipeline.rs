//! End-to-end tests for the capture pipeline.
//!
//! Messages go through the router exactly as the socket server delivers them,
//! so schema checks, page id allocation, listener fan-out and storage are all
//! exercised together.

use article_contents::{
    ArticleContentsStudy, CaptureRecord, Database, DispatchError, MessageEnvelope, MessageRouter,
    MessageSender, RecordingRegistrar, SchemaError, StudyOptions, TabInfo,
    ARTICLE_CONTENT_CHANNEL,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

struct Harness {
    study: Arc<ArticleContentsStudy>,
    router: Arc<MessageRouter>,
    seen: Arc<Mutex<Vec<CaptureRecord>>>,
}

fn harness(database: Database) -> Harness {
    let router = Arc::new(MessageRouter::new());
    let study = Arc::new(ArticleContentsStudy::new(
        database,
        Arc::clone(&router),
        Arc::new(RecordingRegistrar::new()),
    ));

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        study.register_listener(move |record: &CaptureRecord| {
            seen.lock().unwrap().push(record.clone());
            Ok(())
        });
    }

    Harness { study, router, seen }
}

async fn started(domains: &[&str]) -> Harness {
    let h = harness(Database::open_in_memory().unwrap());
    h.study
        .run_study(StudyOptions {
            domains: domains.iter().map(|d| d.to_string()).collect(),
        })
        .await
        .unwrap();
    h
}

fn envelope(payload: Value, sender_url: &str, tab: i64) -> MessageEnvelope {
    MessageEnvelope {
        channel: ARTICLE_CONTENT_CHANNEL.to_string(),
        payload,
        sender: MessageSender {
            url: sender_url.to_string(),
            tab: TabInfo { id: tab },
        },
    }
}

fn page(text: &str) -> Value {
    json!({"type": "page", "url": "http://example.com/a", "title": "A", "text": text})
}

#[tokio::test]
async fn test_single_capture_is_broadcast_and_stored() {
    let h = started(&["example.com"]).await;

    h.router
        .dispatch(envelope(page("hello"), "http://example.com/a", 7))
        .await
        .unwrap();

    let expected = CaptureRecord {
        kind: "page".to_string(),
        url: "http://example.com/a".to_string(),
        title: "A".to_string(),
        text: "hello".to_string(),
        tab_id: 7,
    };
    assert_eq!(*h.seen.lock().unwrap(), vec![expected.clone()]);

    let data = h.study.get_study_data_as_object().await.unwrap().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data["0"], expected);
}

#[tokio::test]
async fn test_back_to_back_captures_get_distinct_keys() {
    let h = started(&["example.com"]).await;

    for text in ["first", "second"] {
        h.router
            .dispatch(envelope(page(text), "http://example.com/a", 1))
            .await
            .unwrap();
    }

    let data = h.study.get_study_data_as_object().await.unwrap().unwrap();
    assert_eq!(data.keys().cloned().collect::<Vec<_>>(), vec!["0", "1"]);
    assert_eq!(data["0"].text, "first");
    assert_eq!(data["1"].text, "second");
}

#[tokio::test]
async fn test_study_data_before_start_is_none() {
    let h = harness(Database::open_in_memory().unwrap());
    assert!(h.study.get_study_data_as_object().await.unwrap().is_none());
}

#[tokio::test]
async fn test_message_without_url_is_rejected() {
    let h = started(&["example.com"]).await;

    let result = h
        .router
        .dispatch(envelope(
            json!({"type": "page", "title": "A", "text": "hello"}),
            "http://example.com/a",
            1,
        ))
        .await;

    assert!(matches!(
        result,
        Err(DispatchError::Schema { source: SchemaError::MissingField(ref f), .. }) if f == "url"
    ));
    assert!(h.seen.lock().unwrap().is_empty());
    assert!(h.study.get_study_data_as_object().await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn test_message_without_text_is_rejected() {
    let h = started(&["example.com"]).await;

    let result = h
        .router
        .dispatch(envelope(
            json!({"type": "page", "url": "http://example.com/a", "title": "A"}),
            "http://example.com/a",
            1,
        ))
        .await;

    assert!(result.is_err());
    assert!(h.seen.lock().unwrap().is_empty());
    assert!(h.study.get_study_data_as_object().await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_run_study_keeps_first_scope() {
    let h = started(&["example.com"]).await;

    h.study
        .run_study(StudyOptions {
            domains: vec!["other.org".to_string()],
        })
        .await
        .unwrap();

    assert_eq!(h.router.listener_count(ARTICLE_CONTENT_CHANNEL), 1);
    let scope = h.study.scope().unwrap();
    assert_eq!(scope.match_patterns(), vec!["*://*.example.com/*".to_string()]);

    h.router
        .dispatch(envelope(page("once"), "http://example.com/a", 1))
        .await
        .unwrap();
    assert_eq!(h.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_page_ids_continue_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.db");

    {
        let h = harness(Database::open(&path).unwrap());
        h.study.run_study(StudyOptions::default()).await.unwrap();
        h.router
            .dispatch(envelope(page("before"), "http://example.com/a", 1))
            .await
            .unwrap();
    }

    let h = harness(Database::open(&path).unwrap());
    h.study.run_study(StudyOptions::default()).await.unwrap();
    h.router
        .dispatch(envelope(page("after"), "http://example.com/a", 1))
        .await
        .unwrap();

    let data = h.study.get_study_data_as_object().await.unwrap().unwrap();
    assert_eq!(data["0"].text, "before");
    assert_eq!(data["1"].text, "after");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Concurrent captures never share a page id and leave no holes when
    /// every capture succeeds.
    #[test]
    fn prop_concurrent_captures_get_unique_page_ids(count in 1usize..40) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (keys, broadcasts) = runtime.block_on(async move {
            let h = started(&["example.com"]).await;

            let mut tasks = Vec::new();
            for i in 0..count {
                let router = Arc::clone(&h.router);
                tasks.push(tokio::spawn(async move {
                    router
                        .dispatch(envelope(page(&i.to_string()), "http://example.com/a", i as i64))
                        .await
                        .unwrap();
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            let data = h.study.get_study_data_as_object().await.unwrap().unwrap();
            let broadcasts = h.seen.lock().unwrap().len();
            (data.keys().cloned().collect::<HashSet<_>>(), broadcasts)
        });

        let expected: HashSet<String> = (0..count).map(|i| i.to_string()).collect();
        prop_assert_eq!(keys, expected);
        prop_assert_eq!(broadcasts, count);
    }

    /// Sequential captures are numbered in the order they were processed.
    #[test]
    fn prop_sequential_page_ids_increase(count in 1usize..20) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let data = runtime.block_on(async move {
            let h = started(&[]).await;
            for i in 0..count {
                h.router
                    .dispatch(envelope(page(&i.to_string()), "http://example.com/a", 1))
                    .await
                    .unwrap();
            }
            h.study.get_study_data_as_object().await.unwrap().unwrap()
        });

        for i in 0..count {
            prop_assert_eq!(&data[&i.to_string()].text, &i.to_string());
        }
    }
}
