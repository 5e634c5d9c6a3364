use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// How an adapter wants the staged asset handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The adapter uploads bytes itself and needs a local file.
    LocalFile,
    /// The adapter fetches the asset over HTTP; a (signed) URL suffices
    /// and no local copy is staged.
    SignedUrl,
}

/// The staged artifact handed to an adapter, shaped by its delivery mode.
#[derive(Debug, Clone)]
pub enum PublishArtifact {
    File(PathBuf),
    Url(String),
}

/// Deep-link and attribution metadata forwarded to the channel.
#[derive(Debug, Clone, Serialize)]
pub struct PublishMetadata {
    pub tenant_id: Uuid,
    pub video_id: Uuid,
    pub nfc_card_id: Option<Uuid>,
    pub title: Option<String>,
}

/// One external publishing destination. Implementations wrap a platform's
/// publish API; the pipeline only sees this contract.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn delivery(&self) -> DeliveryMode;

    /// Publish the asset and return the platform's reference for the new
    /// post (id or URL).
    async fn publish(
        &self,
        artifact: &PublishArtifact,
        meta: &PublishMetadata,
    ) -> Result<String, ChannelError>;
}

impl std::fmt::Debug for dyn ChannelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAdapter")
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no adapter registered for channel '{0}'")]
    UnknownChannel(String),

    /// The channel answered and refused the publish.
    #[error("channel rejected publish: {0}")]
    Rejected(String),

    #[error("channel transport failed: {0}")]
    Transport(String),
}

/// Lookup table from channel name to adapter. Channel names stay an open
/// set: registering a new destination is configuration, not a code change.
#[derive(Default)]
pub struct ChannelRegistry {
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, channel: &str) -> Result<Arc<dyn ChannelAdapter>, ChannelError> {
        self.adapters
            .get(channel)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownChannel(channel.to_string()))
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.adapters.contains_key(channel)
    }

    /// Build a registry of webhook adapters from `name=url` pairs.
    pub fn from_webhooks(pairs: &[(String, String)]) -> Self {
        let mut registry = Self::new();
        for (name, endpoint) in pairs {
            registry.register(Arc::new(WebhookAdapter::new(name.clone(), endpoint.clone())));
        }
        registry
    }
}

/// Adapter that hands the publish off to an external per-channel endpoint.
///
/// The platform-specific publish API lives behind that endpoint; this side
/// only posts a signed asset URL plus metadata and relays the returned
/// post reference.
pub struct WebhookAdapter {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    video_url: &'a str,
    #[serde(flatten)]
    meta: &'a PublishMetadata,
}

impl WebhookAdapter {
    pub fn new(name: String, endpoint: String) -> Self {
        Self {
            name,
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn delivery(&self) -> DeliveryMode {
        DeliveryMode::SignedUrl
    }

    async fn publish(
        &self,
        artifact: &PublishArtifact,
        meta: &PublishMetadata,
    ) -> Result<String, ChannelError> {
        let video_url = match artifact {
            PublishArtifact::Url(url) => url.as_str(),
            PublishArtifact::File(_) => {
                return Err(ChannelError::Rejected(
                    "webhook adapter requires a URL artifact".to_string(),
                ))
            }
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&WebhookPayload { video_url, meta })
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ChannelError::Rejected(format!("status {status}: {body}")));
        }

        // Endpoints return {"reference": "..."} or a bare reference string.
        let reference = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("reference").and_then(|r| r.as_str()).map(String::from))
            .unwrap_or(body);

        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter(&'static str);

    #[async_trait]
    impl ChannelAdapter for NullAdapter {
        fn name(&self) -> &str {
            self.0
        }

        fn delivery(&self) -> DeliveryMode {
            DeliveryMode::SignedUrl
        }

        async fn publish(
            &self,
            _artifact: &PublishArtifact,
            _meta: &PublishMetadata,
        ) -> Result<String, ChannelError> {
            Ok("ref".to_string())
        }
    }

    #[test]
    fn registry_resolves_registered_channels_only() {
        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(NullAdapter("douyin")));

        assert!(registry.contains("douyin"));
        assert!(registry.get("douyin").is_ok());

        let err = registry.get("kuaishou").unwrap_err();
        assert!(matches!(err, ChannelError::UnknownChannel(name) if name == "kuaishou"));
    }
}
