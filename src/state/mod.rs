// Live feed state module
//
// This module provides the EventAggregator which folds push-channel events
// into bounded, consistent feed state using Arc<RwLock<T>> and emits change
// events for UI consumers.

use crate::models::{ChannelEvent, ServerEvent};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Maximum number of retained lines per log buffer.
pub const LOG_BUFFER_CAPACITY: usize = 200;

/// Change events emitted when feed state is modified
///
/// These events are emitted to notify interested parties (primarily the UI)
/// about feed changes without requiring them to poll the state. Consumers
/// may coalesce rapid buffer notifications into a single re-render, but a
/// `RestartingChanged` must always be acted on.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The transport connection came up or went down
    ConnectionChanged { connected: bool },

    /// The server reported a restart-state transition
    RestartingChanged { restarting: bool },

    /// The general log buffer was mutated
    LogsUpdated,

    /// The database log buffer was mutated
    DbLogsUpdated,
}

/// Snapshot of the aggregated feed at a point in time.
///
/// Internally consistent: the flag and both buffers reflect events processed
/// strictly in arrival order, never a partially-applied event.
#[derive(Clone, Debug, Default)]
pub struct FeedState {
    pub connected: bool,
    pub restarting: bool,
    pub log_lines: VecDeque<String>,
    pub db_log_lines: VecDeque<String>,
}

/// Thread-safe aggregator of push-channel events with change emission
///
/// This is the single consumer of raw [`ChannelEvent`]s and the single
/// source of feed state for any number of UI readers:
/// - [`apply()`](Self::apply) processes one event fully (buffers, flag,
///   notification) before the next
/// - [`snapshot()`](Self::snapshot) / [`read()`](Self::read) for pull-based
///   access without polling
/// - [`subscribe()`](Self::subscribe) for listening to feed changes
///
/// # Related Types
///
/// - [`crate::channel::PushChannel`]: Produces the events consumed here
/// - [`crate::services::AutosavePolicy`]: Consults the restart flag before
///   scheduling persistence writes
pub struct EventAggregator {
    /// The feed state protected by RwLock for thread-safe access
    state: Arc<RwLock<FeedState>>,

    /// Broadcast channel for emitting feed change events
    state_tx: broadcast::Sender<StateChange>,
}

impl EventAggregator {
    /// Create a new EventAggregator with empty buffers
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(FeedState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current feed state
    pub fn snapshot(&self) -> FeedState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the feed state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&FeedState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Whether the server currently reports a restart in progress
    pub fn is_restarting(&self) -> bool {
        self.state.read().unwrap().restarting
    }

    /// Whether the push channel is currently connected
    pub fn is_connected(&self) -> bool {
        self.state.read().unwrap().connected
    }

    /// Subscribe to feed change events
    ///
    /// Returns a receiver that will get notified of all future feed changes.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Apply one channel event to the feed state.
    ///
    /// The write lock is held across the full application and the subscriber
    /// notification, so no snapshot can observe a half-applied event and
    /// notifications go out in event-arrival order.
    pub fn apply(&self, event: ChannelEvent) {
        let mut state = self.state.write().unwrap();
        match event {
            ChannelEvent::Connected => {
                state.connected = true;
                self.notify(StateChange::ConnectionChanged { connected: true });
            }
            ChannelEvent::Disconnected => {
                state.connected = false;
                self.notify(StateChange::ConnectionChanged { connected: false });
            }
            ChannelEvent::Server(ServerEvent::Status { is_restarting }) => {
                state.restarting = is_restarting;
                // Notified on every status event, changed or not: a restart
                // transition must never be dropped.
                self.notify(StateChange::RestartingChanged {
                    restarting: is_restarting,
                });
            }
            ChannelEvent::Server(ServerEvent::LogSnapshot(lines)) => {
                state.log_lines = seed_buffer(lines);
                self.notify(StateChange::LogsUpdated);
            }
            ChannelEvent::Server(ServerEvent::LogLine(line)) => {
                push_bounded(&mut state.log_lines, line);
                self.notify(StateChange::LogsUpdated);
            }
            ChannelEvent::Server(ServerEvent::DbLogLine(line)) => {
                // Database events are a subset view of the general stream,
                // so the line lands in both buffers.
                push_bounded(&mut state.db_log_lines, line.clone());
                push_bounded(&mut state.log_lines, line);
                self.notify(StateChange::DbLogsUpdated);
                self.notify(StateChange::LogsUpdated);
            }
        }
    }

    /// Locally acknowledge the restart notice without a server round trip.
    ///
    /// Used once a consumer has acted on the notice (e.g. dismissed a
    /// banner); the next `status` event remains authoritative.
    pub fn clear_restarting(&self) {
        let mut state = self.state.write().unwrap();
        if state.restarting {
            state.restarting = false;
            self.notify(StateChange::RestartingChanged { restarting: false });
        }
    }

    /// Clear the general log buffer (local-only).
    pub fn clear_logs(&self) {
        let mut state = self.state.write().unwrap();
        state.log_lines.clear();
        self.notify(StateChange::LogsUpdated);
    }

    /// Clear the database log buffer (local-only).
    pub fn clear_db_logs(&self) {
        let mut state = self.state.write().unwrap();
        state.db_log_lines.clear();
        self.notify(StateChange::DbLogsUpdated);
    }

    /// Spawn the feed task: drain a channel subscription in arrival order.
    ///
    /// Each event is fully applied (including notification) before the next
    /// is received; the transport's ordering is preserved end to end.
    pub fn run_feed(&self, mut rx: broadcast::Receiver<ChannelEvent>) -> JoinHandle<()> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => aggregator.apply(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("feed consumer lagged, dropped {n} channel events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("push channel closed, feed task exiting");
                        break;
                    }
                }
            }
        })
    }

    fn notify(&self, change: StateChange) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.state_tx.send(change);
    }
}

/// Append with FIFO eviction at the buffer bound.
fn push_bounded(buffer: &mut VecDeque<String>, line: String) {
    if buffer.len() >= LOG_BUFFER_CAPACITY {
        buffer.pop_front();
    }
    buffer.push_back(line);
}

/// Build the general buffer from a snapshot payload: blank lines dropped,
/// trimmed to the most recent [`LOG_BUFFER_CAPACITY`] entries.
fn seed_buffer(lines: Vec<String>) -> VecDeque<String> {
    let mut kept: Vec<String> = lines
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if kept.len() > LOG_BUFFER_CAPACITY {
        kept.drain(..kept.len() - LOG_BUFFER_CAPACITY);
    }
    kept.into()
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// Make EventAggregator cloneable for sharing across tasks
impl Clone for EventAggregator {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn log_line(s: &str) -> ChannelEvent {
        ChannelEvent::Server(ServerEvent::LogLine(s.to_string()))
    }

    #[test]
    fn test_new_aggregator_is_empty() {
        let feed = EventAggregator::new();
        let state = feed.snapshot();
        assert!(!state.connected);
        assert!(!state.restarting);
        assert!(state.log_lines.is_empty());
        assert!(state.db_log_lines.is_empty());
    }

    #[test]
    fn test_connection_transitions() {
        let feed = EventAggregator::new();
        let mut rx = feed.subscribe();

        feed.apply(ChannelEvent::Connected);
        assert!(feed.is_connected());
        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::ConnectionChanged { connected: true }
        );

        feed.apply(ChannelEvent::Disconnected);
        assert!(!feed.is_connected());
        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::ConnectionChanged { connected: false }
        );
    }

    #[test]
    fn test_status_sets_flag_and_notifies() {
        let feed = EventAggregator::new();
        let mut rx = feed.subscribe();

        feed.apply(ChannelEvent::Server(ServerEvent::Status {
            is_restarting: true,
        }));
        assert!(feed.is_restarting());
        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::RestartingChanged { restarting: true }
        );

        // A repeated identical status still notifies
        feed.apply(ChannelEvent::Server(ServerEvent::Status {
            is_restarting: true,
        }));
        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::RestartingChanged { restarting: true }
        );
    }

    #[test]
    fn test_clear_restarting_is_local() {
        let feed = EventAggregator::new();
        feed.apply(ChannelEvent::Server(ServerEvent::Status {
            is_restarting: true,
        }));

        feed.clear_restarting();
        assert!(!feed.is_restarting());

        // Idempotent: no second notification when already clear
        let mut rx = feed.subscribe();
        feed.clear_restarting();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_seeds_buffer_dropping_blanks() {
        let feed = EventAggregator::new();
        feed.apply(ChannelEvent::Server(ServerEvent::LogSnapshot(vec![
            "first".to_string(),
            "".to_string(),
            "   ".to_string(),
            "second".to_string(),
        ])));

        let state = feed.snapshot();
        assert_eq!(Vec::from(state.log_lines), vec!["first", "second"]);
    }

    #[test]
    fn test_snapshot_trims_to_last_200() {
        let feed = EventAggregator::new();
        let lines: Vec<String> = (0..300).map(|i| format!("line {i}")).collect();
        feed.apply(ChannelEvent::Server(ServerEvent::LogSnapshot(lines)));

        let state = feed.snapshot();
        assert_eq!(state.log_lines.len(), LOG_BUFFER_CAPACITY);
        assert_eq!(state.log_lines.front().unwrap(), "line 100");
        assert_eq!(state.log_lines.back().unwrap(), "line 299");
    }

    #[test]
    fn test_log_line_evicts_oldest() {
        let feed = EventAggregator::new();
        for i in 0..(LOG_BUFFER_CAPACITY + 5) {
            feed.apply(log_line(&format!("line {i}")));
        }

        let state = feed.snapshot();
        assert_eq!(state.log_lines.len(), LOG_BUFFER_CAPACITY);
        assert_eq!(state.log_lines.front().unwrap(), "line 5");
        assert_eq!(
            state.log_lines.back().unwrap(),
            &format!("line {}", LOG_BUFFER_CAPACITY + 4)
        );
    }

    #[test]
    fn test_db_line_dual_write() {
        let feed = EventAggregator::new();
        let mut rx = feed.subscribe();

        feed.apply(ChannelEvent::Server(ServerEvent::DbLogLine(
            "insert ok".to_string(),
        )));

        let state = feed.snapshot();
        assert_eq!(Vec::from(state.db_log_lines), vec!["insert ok"]);
        assert_eq!(Vec::from(state.log_lines), vec!["insert ok"]);

        assert_eq!(rx.try_recv().unwrap(), StateChange::DbLogsUpdated);
        assert_eq!(rx.try_recv().unwrap(), StateChange::LogsUpdated);
    }

    #[test]
    fn test_clear_buffers() {
        let feed = EventAggregator::new();
        feed.apply(log_line("a"));
        feed.apply(ChannelEvent::Server(ServerEvent::DbLogLine("b".to_string())));

        feed.clear_logs();
        assert!(feed.snapshot().log_lines.is_empty());
        assert_eq!(Vec::from(feed.snapshot().db_log_lines), vec!["b"]);

        feed.clear_db_logs();
        assert!(feed.snapshot().db_log_lines.is_empty());
    }

    #[test]
    fn test_multiple_subscribers() {
        let feed = EventAggregator::new();
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        feed.apply(log_line("hello"));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    proptest! {
        #[test]
        fn prop_buffer_holds_most_recent_lines_in_order(
            lines in proptest::collection::vec("[a-z0-9 ]{0,12}", 0..500)
        ) {
            let feed = EventAggregator::new();
            for line in &lines {
                feed.apply(ChannelEvent::Server(ServerEvent::LogLine(line.clone())));
            }

            let state = feed.snapshot();
            prop_assert!(state.log_lines.len() <= LOG_BUFFER_CAPACITY);

            let start = lines.len().saturating_sub(LOG_BUFFER_CAPACITY);
            let expected: Vec<String> = lines[start..].to_vec();
            let actual: Vec<String> = state.log_lines.iter().cloned().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
