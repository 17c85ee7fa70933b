use crate::models::ConfigValue;
use crate::services::autosave::ConfigSink;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors from the REST collaborator
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status} for {path}")]
    Status { status: StatusCode, path: String },
}

/// Thin client over the console's fixed REST contracts.
///
/// The endpoint shapes are consumed, not designed, here: every body is an
/// opaque document (an object with named sections and string-list leaves),
/// so this client never interprets schema beyond [`ConfigValue`]'s
/// structural rules.
///
/// # Endpoints
///
/// - `GET/POST /config` — the global configuration document
/// - `GET/POST/DELETE /servers/{id}/config` — per-community override + reset
/// - `GET /servers/{id}/channels` — channel listing for override forms
/// - `GET/POST /guilds/{id}/relationships/{user}` — per-user relationship data
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url` (no trailing slash) with a request
    /// timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the global configuration document.
    pub async fn fetch_config(&self) -> Result<ConfigValue, ApiError> {
        self.get_json("/config").await
    }

    /// Persist the full global configuration document.
    pub async fn save_config(&self, doc: &ConfigValue) -> Result<(), ApiError> {
        self.post_json("/config", doc).await
    }

    /// Fetch a per-community override document.
    pub async fn fetch_guild_config(&self, guild_id: &str) -> Result<ConfigValue, ApiError> {
        self.get_json(&format!("/servers/{guild_id}/config")).await
    }

    /// Persist a per-community override document.
    pub async fn save_guild_config(
        &self,
        guild_id: &str,
        doc: &ConfigValue,
    ) -> Result<(), ApiError> {
        self.post_json(&format!("/servers/{guild_id}/config"), doc)
            .await
    }

    /// Reset a community back to the global configuration.
    pub async fn reset_guild_config(&self, guild_id: &str) -> Result<(), ApiError> {
        let path = format!("/servers/{guild_id}/config");
        let response = self
            .http
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        Self::check(&path, response).map(|_| ())
    }

    /// List the channels of a community (opaque payload for override forms).
    pub async fn fetch_guild_channels(&self, guild_id: &str) -> Result<serde_json::Value, ApiError> {
        self.get_json(&format!("/servers/{guild_id}/channels")).await
    }

    /// Fetch the relationship record for a user within a guild.
    pub async fn fetch_relationship(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<serde_json::Value, ApiError> {
        self.get_json(&format!("/guilds/{guild_id}/relationships/{user_id}"))
            .await
    }

    /// Persist the relationship record for a user within a guild.
    pub async fn save_relationship(
        &self,
        guild_id: &str,
        user_id: &str,
        record: &serde_json::Value,
    ) -> Result<(), ApiError> {
        self.post_json(&format!("/guilds/{guild_id}/relationships/{user_id}"), record)
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let response = Self::check(path, response)?;
        Ok(response.json().await?)
    }

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        Self::check(path, response).map(|_| ())
    }

    fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status {
                status: response.status(),
                path: path.to_string(),
            })
        }
    }
}

#[async_trait]
impl ConfigSink for ApiClient {
    async fn persist(&self, doc: &ConfigValue) -> anyhow::Result<()> {
        self.save_config(doc).await?;
        Ok(())
    }
}
