//! Reconnecting push channel for server-sent events.
//!
//! Owns the single WebSocket connection of a console session and fans raw
//! [`ChannelEvent`]s out to any number of subscribers. Handles:
//!
//! - One transport connection per channel, owned by a background task
//! - Decoding text frames into [`ServerEvent`]s (malformed frames are
//!   logged and skipped, never fatal)
//! - Automatic reconnection with exponential backoff, bounded by
//!   configuration; exceeding the bound leaves the channel `disconnected`
//!   with no further attempts
//! - Explicit teardown via [`PushChannel::close`] with no transport leak
//!   across close/reconnect cycles

use crate::models::{ChannelEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Capacity of the channel-event broadcast.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Connection policy for the push channel.
///
/// Reconnection is a configurable policy, not a hand-rolled retry loop:
/// delays grow exponentially from `reconnect_delay_ms` up to
/// `max_reconnect_delay_ms`, and `max_reconnect_attempts` bounds the total
/// number of consecutive failures before the channel gives up.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// WebSocket endpoint, e.g. `ws://localhost:3000/gateway`.
    pub url: String,
    pub auto_reconnect: bool,
    /// `None` retries indefinitely.
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub connect_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/gateway".to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: Some(10),
            reconnect_delay_ms: 500,
            max_reconnect_delay_ms: 30_000,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands sent from the public handle to the background connection task.
enum ChannelCmd {
    Shutdown,
}

/// Why the streaming loop returned.
enum StreamExit {
    /// Transport dropped; reconnection may follow.
    Dropped,
    /// Explicit shutdown; the task must end.
    Shutdown,
}

/// Handle to the session's single push connection.
///
/// Constructed once at session scope and passed to consumers as a
/// capability; subscriber churn never creates or drops transports. Dropping
/// the handle (or calling [`close`](Self::close)) ends the background task
/// and releases the transport, after which a fresh [`connect`](Self::connect)
/// yields a fresh connection.
pub struct PushChannel {
    event_tx: broadcast::Sender<ChannelEvent>,
    cmd_tx: mpsc::Sender<ChannelCmd>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    /// Spawn the connection task and return the owning handle.
    ///
    /// The first connection attempt happens in the background; subscribers
    /// learn the outcome through `ChannelEvent::Connected` or, after the
    /// retry budget is spent, by the absence of one.
    pub fn connect(options: ChannelOptions) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(connection_task(
            options,
            cmd_rx,
            event_tx.clone(),
            Arc::clone(&connected),
        ));

        Self {
            event_tx,
            cmd_tx,
            connected,
            task: Some(task),
        }
    }

    /// Get a new receiver for raw channel events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Whether the background task has ended (shutdown or retry budget spent).
    pub fn is_closed(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Gracefully close the transport and end the background task.
    pub async fn close(mut self) {
        let _ = self.cmd_tx.send(ChannelCmd::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        // Best-effort shutdown signal.
        let _ = self.cmd_tx.try_send(ChannelCmd::Shutdown);
    }
}

/// The background task owning the WebSocket connection.
///
/// Lifecycle:
/// 1. Connect (with timeout); emit `Connected` on success
/// 2. Stream frames, decoding text into [`ServerEvent`]s
/// 3. On transport loss: emit `Disconnected`, back off, reconnect
/// 4. On budget exhaustion or shutdown: release the transport and return
async fn connection_task(
    options: ChannelOptions,
    mut cmd_rx: mpsc::Receiver<ChannelCmd>,
    event_tx: broadcast::Sender<ChannelEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut attempts: u32 = 0;

    loop {
        match establish(&options).await {
            Ok(ws) => {
                attempts = 0;
                connected.store(true, Ordering::Relaxed);
                let _ = event_tx.send(ChannelEvent::Connected);
                tracing::info!(url = %options.url, "push channel connected");

                let exit = run_stream(ws, &mut cmd_rx, &event_tx).await;

                connected.store(false, Ordering::Relaxed);
                let _ = event_tx.send(ChannelEvent::Disconnected);

                if matches!(exit, StreamExit::Shutdown) {
                    tracing::debug!("push channel shut down");
                    return;
                }
                tracing::warn!("push channel lost, evaluating reconnect policy");
            }
            Err(e) => {
                tracing::warn!("push channel connection failed: {e}");
            }
        }

        if !options.auto_reconnect {
            tracing::warn!("auto-reconnect disabled, push channel staying down");
            return;
        }

        attempts += 1;
        if let Some(max) = options.max_reconnect_attempts {
            if attempts > max {
                tracing::warn!("max reconnection attempts ({max}) reached, giving up");
                return;
            }
        }

        let delay = backoff_delay(&options, attempts);
        tracing::info!("reconnecting in {}ms (attempt {attempts})", delay.as_millis());

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChannelCmd::Shutdown) | None => return,
                }
            }
        }
    }
}

/// Open the WebSocket within the configured timeout.
async fn establish(options: &ChannelOptions) -> anyhow::Result<WsStream> {
    let connect = connect_async(options.url.as_str());
    let (ws, _response) = tokio::time::timeout(options.connect_timeout, connect)
        .await
        .map_err(|_| anyhow::anyhow!("connection timeout ({:?})", options.connect_timeout))??;
    Ok(ws)
}

/// Stream frames until the transport drops or a shutdown command arrives.
async fn run_stream(
    mut ws: WsStream,
    cmd_rx: &mut mpsc::Receiver<ChannelCmd>,
    event_tx: &broadcast::Sender<ChannelEvent>,
) -> StreamExit {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChannelCmd::Shutdown) | None => {
                        let _ = ws.close(None).await;
                        return StreamExit::Shutdown;
                    }
                }
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => {
                                let _ = event_tx.send(ChannelEvent::Server(event));
                            }
                            Err(e) => {
                                tracing::warn!("unrecognized push frame, skipping: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {
                        tracing::debug!("ignoring non-text push frame");
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("server closed the push channel");
                        return StreamExit::Dropped;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("push channel transport error: {e}");
                        return StreamExit::Dropped;
                    }
                    None => {
                        tracing::info!("push channel stream ended");
                        return StreamExit::Dropped;
                    }
                }
            }
        }
    }
}

/// Exponential backoff capped at `max_reconnect_delay_ms`.
fn backoff_delay(options: &ChannelOptions, attempt: u32) -> Duration {
    let exp = options
        .reconnect_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(exp.min(options.max_reconnect_delay_ms))
}
