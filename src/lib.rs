// BotDeck - client core for the bot admin console
//
// This is the library crate containing the sync layer: the push channel,
// the event aggregator, the configuration store, and the autosave policy.
// The binary crate (main.rs) provides a headless console entry point.

pub mod channel;
pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod session;
pub mod settings;
pub mod state;

// Re-export commonly used types for convenience
pub use channel::{ChannelOptions, PushChannel};
pub use config::{ConfigError, ConfigStore, DocumentChange, KeyPath};
pub use models::{ChannelEvent, ConfigValue, ServerEvent};
pub use services::{ApiClient, AutosavePolicy, ConfigSink, SaveNotice};
pub use session::Session;
pub use settings::Settings;
pub use state::{EventAggregator, StateChange};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
