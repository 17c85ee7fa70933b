//! Coalesced persistence of configuration edits.
//!
//! One network write per editing burst, not per keystroke: every scalar
//! mutation replaces a single pending-write slot and resets its timer; when
//! the timer fires, the document captured by the most recent edit is
//! persisted (last-writer-wins). While the server reports `restarting`,
//! nothing is scheduled and any pending slot is dropped — the edit stays
//! local until a mutation after the restart clears.

use crate::config::{ConfigStore, DocumentChange};
use crate::models::ConfigValue;
use crate::state::{EventAggregator, StateChange};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default coalescing window between the last edit and the write.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(1000);

/// Destination of coalesced persistence writes.
///
/// [`crate::services::ApiClient`] implements this against `POST /config`;
/// tests substitute a recording fake.
#[async_trait]
pub trait ConfigSink: Send + Sync {
    async fn persist(&self, doc: &ConfigValue) -> anyhow::Result<()>;
}

/// User-facing notification about a persistence attempt.
///
/// A failed write is never retried automatically: local state is retained
/// and the next edit (or an explicit resave) triggers the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveNotice {
    Saved,
    Failed { reason: String },
}

/// Watches a [`ConfigStore`] and persists edits through a [`ConfigSink`],
/// coalescing bursts and respecting live restart status.
pub struct AutosavePolicy {
    notice_tx: broadcast::Sender<SaveNotice>,
    task: JoinHandle<()>,
}

impl AutosavePolicy {
    /// Spawn the autosave task for `store`, consulting `feed` for restart
    /// status.
    pub fn spawn(
        store: &ConfigStore,
        feed: &EventAggregator,
        sink: Arc<dyn ConfigSink>,
        delay: Duration,
    ) -> Self {
        let (notice_tx, _) = broadcast::channel(64);
        let task = tokio::spawn(autosave_task(
            store.subscribe(),
            feed.subscribe(),
            feed.clone(),
            sink,
            delay,
            notice_tx.clone(),
        ));
        Self { notice_tx, task }
    }

    /// Subscribe to save outcome notifications.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SaveNotice> {
        self.notice_tx.subscribe()
    }

    /// Stop watching. Any pending (unfired) write is discarded.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// The single-slot pending write.
struct Pending {
    doc: Arc<ConfigValue>,
    deadline: Instant,
}

/// Select loop over document changes, feed changes, and the pending timer.
///
/// The pending slot is replaced, never queued: at most one timer exists, and
/// replacing it forgets the superseded deadline so a stale write can never
/// fire after a newer one was scheduled.
async fn autosave_task(
    mut doc_rx: broadcast::Receiver<DocumentChange>,
    mut feed_rx: broadcast::Receiver<StateChange>,
    feed: EventAggregator,
    sink: Arc<dyn ConfigSink>,
    delay: Duration,
    notice_tx: broadcast::Sender<SaveNotice>,
) {
    let mut pending: Option<Pending> = None;

    loop {
        // Far-future placeholder keeps the select arm inert while idle.
        let deadline = pending
            .as_ref()
            .map(|p| p.deadline)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

        tokio::select! {
            biased;

            change = doc_rx.recv() => {
                match change {
                    Ok(change) => handle_change(change, &feed, delay, &mut pending),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("autosave lagged, missed {n} document changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("config store dropped, autosave task exiting");
                        return;
                    }
                }
            }

            feed_change = feed_rx.recv() => {
                match feed_change {
                    Ok(StateChange::RestartingChanged { restarting: true }) => {
                        if pending.take().is_some() {
                            tracing::info!("restart in progress, dropped pending config write");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("autosave lagged, missed {n} feed changes");
                        // The flag itself is re-read at schedule time, so a
                        // missed notification only delays the pending drop.
                        if feed.is_restarting() {
                            pending = None;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("feed dropped, autosave task exiting");
                        return;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                let fired = pending.take().expect("pending checked by select guard");
                write_document(&*sink, &fired.doc, &notice_tx).await;
            }
        }
    }
}

/// Schedule (or decline to schedule) a write for one document change.
fn handle_change(
    change: DocumentChange,
    feed: &EventAggregator,
    delay: Duration,
    pending: &mut Option<Pending>,
) {
    if !change.kind.schedules_save() {
        // List-shape edits stay local; the document rides along with the
        // next scalar edit's snapshot.
        tracing::debug!(kind = ?change.kind, "local-only edit, no write scheduled");
        return;
    }

    if feed.is_restarting() {
        tracing::info!("server restarting, config write suppressed");
        *pending = None;
        return;
    }

    *pending = Some(Pending {
        doc: change.doc,
        deadline: Instant::now() + delay,
    });
}

/// Issue one persistence write and report the outcome.
async fn write_document(
    sink: &dyn ConfigSink,
    doc: &ConfigValue,
    notice_tx: &broadcast::Sender<SaveNotice>,
) {
    match sink.persist(doc).await {
        Ok(()) => {
            tracing::info!("configuration saved");
            let _ = notice_tx.send(SaveNotice::Saved);
        }
        Err(e) => {
            tracing::error!("configuration save failed: {e}");
            let _ = notice_tx.send(SaveNotice::Failed {
                reason: e.to_string(),
            });
        }
    }
}
