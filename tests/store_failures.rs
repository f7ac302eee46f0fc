mod common;

use clickgate::telemetry::{GateEvent, StoreEvent};
use clickgate::{Decision, ErrorKind, EscalationPolicy, GateError};
use common::{harness_with, FaultyStore, SharedWriter};
use std::error::Error;
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[tokio::test]
async fn failing_read_is_retryable_and_writes_nothing() {
    let h = harness_with(FaultyStore::new(), EscalationPolicy::default());
    h.store.fail_reads(true);

    let err = h.gate.evaluate_click("u1").await.unwrap_err();
    assert!(matches!(err, GateError::Storage(_)));
    assert!(err.is_retryable());
    assert!(err.source().unwrap().to_string().contains("store unreachable"));
    assert!(h.store.inner.is_empty());
    assert_eq!(h.sink.events(), vec![GateEvent::Store(StoreEvent::Failure { operation: "get" })]);
}

#[tokio::test]
async fn failing_write_leaves_the_record_untouched() {
    let h = harness_with(FaultyStore::new(), EscalationPolicy::default());
    h.gate.evaluate_click("u1").await.unwrap();
    let before = h.gate.subject("u1").await.unwrap();

    h.store.fail_writes(true);
    let err = h.gate.evaluate_click("u1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(h.gate.subject("u1").await.unwrap(), before);

    let rendered = h.gate.render(&Decision::from_result(Err(err)));
    assert_eq!(rendered.status, "error");
    assert_eq!(rendered.message, "temporary failure, try again");

    h.store.fail_writes(false);
    assert!(h.gate.evaluate_click("u1").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out() {
    let h = harness_with(FaultyStore::new(), EscalationPolicy::default());
    let gate = h.gate.with_store_timeout(Duration::from_millis(250));
    h.store.hang(true);

    let err = gate.force_release("u1").await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.is_retryable());
    assert!(matches!(
        h.sink.events().as_slice(),
        [GateEvent::Store(StoreEvent::Timeout { operation: "get", .. })]
    ));
    assert!(h.store.inner.is_empty());
}

#[tokio::test]
async fn store_failures_are_logged_at_warn() {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(writer.clone()))
        .with_ansi(false)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness_with(FaultyStore::new(), EscalationPolicy::default());
    h.store.fail_reads(true);
    let _ = h.gate.list_subjects().await;

    let logs = writer.contents();
    assert!(logs.contains("WARN"), "logs: {logs}");
    assert!(logs.contains("record store call failed"), "logs: {logs}");
    assert!(logs.contains("operation=\"list\""), "logs: {logs}");
}
