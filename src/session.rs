//! Wires the client stack together: REST access, the live push channel,
//! the event aggregator, the config store, and the autosave policy.

use crate::channel::PushChannel;
use crate::config::ConfigStore;
use crate::services::{ApiClient, AutosavePolicy, SaveNotice};
use crate::settings::Settings;
use crate::state::EventAggregator;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A running client session.
///
/// Owns the push channel and the background tasks that keep the aggregator
/// and autosave policy fed. Dropping the session tears everything down;
/// [`Session::shutdown`] does so explicitly and awaits the channel task.
pub struct Session {
    pub api: ApiClient,
    pub store: ConfigStore,
    pub feed: EventAggregator,
    channel: PushChannel,
    autosave: AutosavePolicy,
    feed_task: JoinHandle<()>,
}

impl Session {
    /// Connect to the server and start all background machinery.
    ///
    /// The initial configuration fetch is best-effort: if the server is
    /// unreachable the session still starts, and the store stays empty
    /// until a later load succeeds.
    pub async fn start(settings: &Settings) -> Result<Self> {
        let api = ApiClient::new(&settings.api_base_url, settings.request_timeout())
            .context("Failed to construct API client")?;

        let store = ConfigStore::new();
        match api.fetch_config().await {
            Ok(doc) => store.load(doc),
            Err(e) => tracing::warn!("Initial config fetch failed, starting empty: {e}"),
        }

        let feed = EventAggregator::new();

        let channel = PushChannel::connect(settings.channel_options());
        let feed_task = feed.run_feed(channel.subscribe());

        let autosave = AutosavePolicy::spawn(
            &store,
            &feed,
            Arc::new(api.clone()),
            settings.autosave_delay(),
        );

        tracing::info!(
            api = %settings.api_base_url,
            gateway = %settings.gateway_url,
            "session started"
        );

        Ok(Self {
            api,
            store,
            feed,
            channel,
            autosave,
            feed_task,
        })
    }

    /// Outcomes of autosave writes, for surfacing in a status line.
    pub fn save_notices(&self) -> broadcast::Receiver<SaveNotice> {
        self.autosave.subscribe_notices()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Stop the autosave policy and close the push channel, awaiting the
    /// connection task.
    pub async fn shutdown(self) {
        self.autosave.shutdown();
        self.feed_task.abort();
        self.channel.close().await;
        tracing::info!("session shut down");
    }
}
