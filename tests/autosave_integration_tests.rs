//! Integration tests for the autosave policy
//!
//! These tests drive the policy with a paused tokio clock and a recording
//! persistence sink, verifying that:
//! - A burst of edits coalesces into one write carrying the final document
//! - The quiet window restarts on every edit (last-writer-wins)
//! - Persistence is suppressed while the server reports a restart
//! - A failed write surfaces a notice and is not retried

use async_trait::async_trait;
use botdeck::models::{ChannelEvent, ConfigValue, ServerEvent};
use botdeck::services::{AutosavePolicy, ConfigSink, SaveNotice};
use botdeck::{ConfigStore, EventAggregator};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep, timeout};

/// Sink that records every persisted document, optionally failing.
struct RecordingSink {
    writes: Mutex<Vec<ConfigValue>>,
    fail: bool,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn last_write(&self) -> Option<ConfigValue> {
        self.writes.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ConfigSink for RecordingSink {
    async fn persist(&self, doc: &ConfigValue) -> anyhow::Result<()> {
        self.writes.lock().unwrap().push(doc.clone());
        if self.fail {
            anyhow::bail!("simulated persistence failure");
        }
        Ok(())
    }
}

fn sample_doc() -> ConfigValue {
    ConfigValue::object([(
        "prefix",
        ConfigValue::from("!"),
    )])
}

fn setup(sink: Arc<RecordingSink>) -> (ConfigStore, EventAggregator, AutosavePolicy) {
    let store = ConfigStore::new();
    store.load(sample_doc());
    let feed = EventAggregator::new();
    let policy = AutosavePolicy::spawn(&store, &feed, sink, Duration::from_millis(1_000));
    (store, feed, policy)
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_coalesces_into_one_write() {
    let sink = RecordingSink::new();
    let (store, _feed, policy) = setup(Arc::clone(&sink));
    let mut notices = policy.subscribe_notices();

    for prefix in ["?", "$", "%"] {
        store.set_path("prefix", ConfigValue::from(prefix)).unwrap();
        sleep(Duration::from_millis(100)).await;
    }

    sleep(Duration::from_millis(1_100)).await;

    assert_eq!(sink.write_count(), 1, "Burst must coalesce into one write");
    let written = sink.last_write().unwrap();
    assert_eq!(
        written.as_object().unwrap()["prefix"].as_ref(),
        &ConfigValue::from("%"),
        "The write must carry the final document"
    );

    let notice = timeout(Duration::from_millis(100), notices.recv())
        .await
        .expect("Timeout waiting for notice")
        .expect("Channel closed");
    assert_eq!(notice, SaveNotice::Saved);

    policy.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_window_restarts_on_every_edit() {
    let sink = RecordingSink::new();
    let (store, _feed, policy) = setup(Arc::clone(&sink));

    // Keep editing every 800ms; the 1000ms window never elapses.
    for i in 0..5 {
        store
            .set_path("prefix", ConfigValue::from(format!("v{i}")))
            .unwrap();
        sleep(Duration::from_millis(800)).await;
        assert_eq!(sink.write_count(), 0, "Window must restart on each edit");
    }

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(sink.write_count(), 1);

    policy.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_restart_suppresses_pending_and_new_edits() {
    let sink = RecordingSink::new();
    let (store, feed, policy) = setup(Arc::clone(&sink));

    // A pending write exists, then the server announces a restart.
    store.set_path("prefix", ConfigValue::from("?")).unwrap();
    sleep(Duration::from_millis(100)).await;
    feed.apply(ChannelEvent::Server(ServerEvent::Status {
        is_restarting: true,
    }));
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(sink.write_count(), 0, "Pending write must be dropped");

    // Edits during the restart are discarded too.
    store.set_path("prefix", ConfigValue::from("$")).unwrap();
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(sink.write_count(), 0, "Edits during restart must not save");

    // After the restart clears, the next edit persists normally.
    feed.apply(ChannelEvent::Server(ServerEvent::Status {
        is_restarting: false,
    }));
    sleep(Duration::from_millis(10)).await;
    store.set_path("prefix", ConfigValue::from("%")).unwrap();
    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(sink.write_count(), 1);

    policy.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_notifies_and_does_not_retry() {
    let sink = RecordingSink::failing();
    let (store, _feed, policy) = setup(Arc::clone(&sink));
    let mut notices = policy.subscribe_notices();

    store.set_path("prefix", ConfigValue::from("?")).unwrap();
    sleep(Duration::from_millis(1_100)).await;

    let notice = timeout(Duration::from_millis(100), notices.recv())
        .await
        .expect("Timeout waiting for notice")
        .expect("Channel closed");
    assert!(
        matches!(notice, SaveNotice::Failed { .. }),
        "Expected failure notice, got: {notice:?}"
    );

    // No retry: still exactly one attempt after another full window.
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(sink.write_count(), 1);

    policy.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_list_shape_edits_do_not_schedule_a_write() {
    let sink = RecordingSink::new();
    let store = ConfigStore::new();
    store.load(ConfigValue::object([(
        "words",
        ConfigValue::list(["a", "b"]),
    )]));
    let feed = EventAggregator::new();
    let policy = AutosavePolicy::spawn(
        &store,
        &feed,
        Arc::clone(&sink) as Arc<dyn ConfigSink>,
        Duration::from_millis(1_000),
    );

    store.append_list_item("words", "c").unwrap();
    store.remove_list_item("words", "a").unwrap();
    sleep(Duration::from_millis(2_000)).await;

    assert_eq!(
        sink.write_count(),
        0,
        "List shape changes are persisted by their own endpoints, not autosave"
    );

    policy.shutdown();
}
