//! Home Assistant REST client.
//!
//! This module provides `HassClient`, which implements every collaborator
//! trait over the hub's REST API with a long-lived access token.

use std::time::Duration;

use async_trait::async_trait;
use ensure_core::attributes::keys;
use ensure_core::{AreaId, DeviceId, EntityId, EntityState, NotificationId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{EngineError, Result};
use crate::platform::{Command, CommandDispatch, Directory, Notification, NotificationSink, StateQuery};

/// Connection settings for the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HassConfig {
    /// Base URL of the hub, e.g. `http://homeassistant.local:8123`.
    #[serde(default = "HassConfig::default_base_url")]
    pub base_url: String,

    /// Long-lived access token.
    #[serde(default)]
    pub token: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "HassConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl HassConfig {
    fn default_base_url() -> String {
        "http://localhost:8123".to_string()
    }

    const fn default_request_timeout_ms() -> u64 {
        10_000
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `HASS_URL`
    /// - `HASS_TOKEN`
    /// - `HASS_REQUEST_TIMEOUT_MS`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("HASS_URL") {
            config.base_url = url;
        }
        if let Ok(token) = std::env::var("HASS_TOKEN") {
            config.token = token;
        }
        if let Some(ms) = std::env::var("HASS_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.request_timeout_ms = ms;
        }

        config
    }
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            token: String::new(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Client for the hub's REST API.
#[derive(Debug, Clone)]
pub struct HassClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HassClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HassConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self::with_client(client, &config.base_url, &config.token))
    }

    /// Create a client around an existing reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// The hub's base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call_service(&self, domain: &str, service: &str, body: &Value) -> Result<()> {
        let url = format!("{}/api/services/{domain}/{service}", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(domain, service, "Called hub service");
            Ok(())
        } else {
            Err(Self::error_from(response, &format!("{domain}.{service}")).await)
        }
    }

    async fn render_template(&self, template: &str) -> Result<String> {
        let url = format!("{}/api/template", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "template": template }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Err(Self::error_from(response, "template").await)
        }
    }

    async fn entity_list(&self, function: &str, arg: &str) -> Result<Vec<EntityId>> {
        // A JSON string literal is also a valid template string literal.
        let literal = serde_json::to_string(arg)
            .map_err(|e| EngineError::Platform(format!("cannot quote {arg}: {e}")))?;
        let rendered = self
            .render_template(&format!("{{{{ {function}({literal}) | tojson }}}}"))
            .await?;

        let raw: Vec<String> = serde_json::from_str(rendered.trim()).map_err(|e| {
            EngineError::Platform(format!("unexpected {function} result {rendered:?}: {e}"))
        })?;

        Ok(parse_ids(raw))
    }

    async fn error_from(response: reqwest::Response, what: &str) -> EngineError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        tracing::error!(
            request = %what,
            status = %status,
            body = %body,
            "Hub request failed"
        );

        EngineError::Platform(format!("{what} returned {status}: {body}"))
    }
}

fn parse_ids(raw: Vec<String>) -> Vec<EntityId> {
    raw.into_iter()
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(entity_id = %s, error = %e, "Skipping malformed entity id");
                None
            }
        })
        .collect()
}

#[async_trait]
impl CommandDispatch for HassClient {
    async fn send(&self, command: &Command) -> Result<()> {
        let mut body = Map::new();
        body.insert(keys::ENTITY_ID.to_string(), json!(command.entity_id));
        for (key, value) in command.attributes.iter() {
            body.insert(key.clone(), value.clone());
        }

        self.call_service(&command.domain, &command.action, &Value::Object(body))
            .await
    }
}

#[async_trait]
impl StateQuery for HassClient {
    async fn get_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>> {
        let url = format!("{}/api/states/{entity_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response, "states").await);
        }

        Ok(Some(response.json::<EntityState>().await?))
    }
}

#[async_trait]
impl Directory for HassClient {
    async fn entities_for_area(&self, area_id: &AreaId) -> Result<Vec<EntityId>> {
        self.entity_list("area_entities", area_id.as_str()).await
    }

    async fn entities_for_device(&self, device_id: &DeviceId) -> Result<Vec<EntityId>> {
        self.entity_list("device_entities", device_id.as_str()).await
    }

    async fn expand_group(&self, entity_id: &EntityId) -> Result<Vec<EntityId>> {
        let Some(state) = self.get_state(entity_id).await? else {
            return Ok(Vec::new());
        };
        Ok(parse_ids(state.attributes.strings(keys::ENTITY_ID)))
    }
}

#[async_trait]
impl NotificationSink for HassClient {
    async fn create(&self, notification: &Notification) -> Result<()> {
        let body = json!({
            "notification_id": notification.id,
            "title": notification.title,
            "message": notification.message,
        });
        self.call_service("persistent_notification", "create", &body)
            .await
    }

    async fn dismiss(&self, id: &NotificationId) -> Result<()> {
        self.call_service(
            "persistent_notification",
            "dismiss",
            &json!({ "notification_id": id }),
        )
        .await
    }
}
