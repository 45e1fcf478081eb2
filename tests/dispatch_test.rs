//! Integration tests for chunked delivery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeSink;
use vk_wall_relay::relay::Dispatcher;

fn dispatcher(sink: &Arc<FakeSink>) -> Dispatcher {
    Dispatcher::new(sink.clone(), "-1001", None).with_chunk_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_short_message_is_one_chunk() {
    let sink = Arc::new(FakeSink::new());

    let report = dispatcher(&sink).send("hello").await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(sink.texts(), vec!["hello".to_string()]);
}

#[tokio::test]
async fn test_failed_chunk_does_not_stop_the_rest() {
    let sink = Arc::new(FakeSink::failing_calls(&[2]));
    let text = "a".repeat(4096 * 2 + 10);

    let report = dispatcher(&sink).send(&text).await;

    assert_eq!(sink.calls(), 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    let texts = sink.texts();
    assert_eq!(texts[0].chars().count(), 4096);
    assert_eq!(texts[1].chars().count(), 10);
}

#[tokio::test]
async fn test_link_preview_and_thread_flags() {
    let sink = Arc::new(FakeSink::new());
    let dispatcher = Dispatcher::new(sink.clone(), "@channel", Some(9))
        .with_chunk_delay(Duration::ZERO)
        .with_link_preview(false);

    dispatcher.send("text").await;

    let sent = sink.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, "@channel");
    assert_eq!(sent[0].thread_id, Some(9));
    assert!(sent[0].disable_notification);
    assert!(sent[0].disable_link_preview);
}

#[tokio::test]
async fn test_blank_message_sends_nothing() {
    let sink = Arc::new(FakeSink::new());

    let report = dispatcher(&sink).send("  \n ").await;

    assert_eq!(report.sent + report.failed, 0);
    assert_eq!(sink.calls(), 0);
}
