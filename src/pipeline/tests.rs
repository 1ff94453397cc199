use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::*;
use crate::event::{MAX_VALUE_LEN, TRUNCATION_MARKER};
use crate::sink::MockSink;
use crate::source::mock::{notification, MockKeyReader, ScriptedNotifications, Tail};

#[tokio::test]
async fn test_set_event_is_enriched_and_recorded() {
    let reader = Arc::new(MockKeyReader::new().with_entry("user:42", "alice", Some(120)));
    let sink = Arc::new(MockSink::new());
    let mut feed = ScriptedNotifications::new(
        vec![notification("__keyevent@0__:set", "user:42")],
        Tail::Close,
    );

    let (_tx, rx) = watch::channel(false);
    let mut pipeline = Pipeline::new(reader, sink.clone(), "test");
    pipeline.run(&mut feed, rx).await.unwrap();

    let events = sink.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation, "SET");
    assert_eq!(events[0].key, "user:42");
    assert_eq!(events[0].value, "alice");
    assert_eq!(events[0].ttl, Some(120));
    assert_eq!(events[0].instance, "test");
    assert!(events[0].field.is_none());
    assert!(events[0].client_info.is_none());

    let stats = pipeline.stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.written, 1);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_deleted_key_records_empty_state() {
    let reader = Arc::new(MockKeyReader::new());
    let sink = Arc::new(MockSink::new());
    let mut feed = ScriptedNotifications::new(
        vec![notification("__keyevent@0__:del", "user:42")],
        Tail::Close,
    );

    let (_tx, rx) = watch::channel(false);
    let mut pipeline = Pipeline::new(reader, sink.clone(), "test");
    pipeline.run(&mut feed, rx).await.unwrap();

    let events = sink.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation, "DEL");
    assert_eq!(events[0].key, "user:42");
    assert_eq!(events[0].value, "");
    assert_eq!(events[0].ttl, None);

    assert_eq!(pipeline.stats().misses, 1);
}

#[tokio::test]
async fn test_oversized_value_is_truncated() {
    let long_value = "y".repeat(2000);
    let reader = Arc::new(MockKeyReader::new().with_entry("blob", &long_value, None));
    let sink = Arc::new(MockSink::new());
    let mut feed = ScriptedNotifications::new(
        vec![notification("__keyevent@0__:set", "blob")],
        Tail::Close,
    );

    let (_tx, rx) = watch::channel(false);
    let mut pipeline = Pipeline::new(reader, sink.clone(), "test");
    pipeline.run(&mut feed, rx).await.unwrap();

    let events = sink.events().await;
    assert_eq!(events[0].value.len(), MAX_VALUE_LEN + TRUNCATION_MARKER.len());
    assert!(events[0].value.ends_with(TRUNCATION_MARKER));
    assert!(long_value.starts_with(&events[0].value[..MAX_VALUE_LEN]));
}

#[tokio::test]
async fn test_unparseable_channel_records_unknown_operation() {
    let reader = Arc::new(MockKeyReader::new());
    let sink = Arc::new(MockSink::new());
    let mut feed =
        ScriptedNotifications::new(vec![notification("keyevent", "user:42")], Tail::Close);

    let (_tx, rx) = watch::channel(false);
    let mut pipeline = Pipeline::new(reader, sink.clone(), "test");
    pipeline.run(&mut feed, rx).await.unwrap();

    assert_eq!(sink.events().await[0].operation, "UNKNOWN");
}

#[tokio::test]
async fn test_failed_write_does_not_stop_the_loop() {
    let reader = Arc::new(MockKeyReader::new().with_entry("a", "1", None).with_entry("b", "2", None));
    let sink = Arc::new(MockSink::new());
    sink.fail_next_writes(1).await;

    let mut feed = ScriptedNotifications::new(
        vec![
            notification("__keyevent@0__:set", "a"),
            notification("__keyevent@0__:set", "b"),
        ],
        Tail::Close,
    );

    let (_tx, rx) = watch::channel(false);
    let mut pipeline = Pipeline::new(reader, sink.clone(), "test");
    pipeline.run(&mut feed, rx).await.unwrap();

    // The first event is dropped, the second still lands.
    let events = sink.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "b");

    let stats = pipeline.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.written, 1);
    assert_eq!(stats.dropped, 1);
}

#[tokio::test]
async fn test_stream_failure_terminates_with_error() {
    let reader = Arc::new(MockKeyReader::new().with_entry("a", "1", None));
    let sink = Arc::new(MockSink::new());
    let mut feed = ScriptedNotifications::new(
        vec![notification("__keyevent@0__:set", "a")],
        Tail::Fail,
    );

    let (_tx, rx) = watch::channel(false);
    let mut pipeline = Pipeline::new(reader, sink.clone(), "test");
    let result = pipeline.run(&mut feed, rx).await;

    assert!(matches!(
        result,
        Err(PipelineError::Stream(SourceError::StreamClosed))
    ));
    // Events before the failure were still recorded.
    assert_eq!(sink.events().await.len(), 1);
}

#[tokio::test]
async fn test_shutdown_unblocks_idle_loop() {
    let reader = Arc::new(MockKeyReader::new());
    let sink = Arc::new(MockSink::new());
    let (tx, rx) = watch::channel(false);

    let worker = tokio::spawn(async move {
        let mut feed = ScriptedNotifications::new(vec![], Tail::Pend);
        let mut pipeline = Pipeline::new(reader, sink, "test");
        pipeline.run(&mut feed, rx).await
    });

    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("loop did not exit after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_sink_close_is_idempotent() {
    let sink = MockSink::new();
    sink.close().await.unwrap();
    sink.close().await.unwrap();
    assert_eq!(sink.close_calls().await, 2);
}
