use serde::{Deserialize, Serialize};

/// Server-pushed events, as they appear on the wire.
///
/// Each frame is a JSON object `{"event": <name>, "data": <payload>}`. The
/// four event kinds are independently fireable and arbitrarily interleaved;
/// [`crate::state::EventAggregator`] folds them into a consistent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Authoritative restart-state transition.
    #[serde(rename = "status")]
    Status {
        #[serde(rename = "isRestarting")]
        is_restarting: bool,
    },

    /// One-time seed of the last known log lines, sent once per connection.
    #[serde(rename = "logSnapshot")]
    LogSnapshot(Vec<String>),

    /// A single new general log line.
    #[serde(rename = "logLine")]
    LogLine(String),

    /// A single database log line, mirrored into the general stream as well.
    #[serde(rename = "dbLogLine")]
    DbLogLine(String),
}

/// Events observable on the push channel.
///
/// `Connected`/`Disconnected` are transport transitions emitted by
/// [`crate::channel::PushChannel`] itself; `Server` wraps a decoded
/// [`ServerEvent`] frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}
