use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::transcript::Turn;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::debug;

/// Undifferentiated byte stream from the inference endpoint. The core has no
/// knowledge of the transport's framing; it only text-decodes what arrives.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Request issued to the inference capability. Immutable once built; the
/// transcript is a snapshot taken when the user turn was accepted.
#[derive(Debug, Clone, Serialize)]
pub struct StreamRequest {
    #[serde(rename = "model")]
    pub model_id: String,
    #[serde(rename = "messages")]
    pub transcript: Vec<Turn>,
}

/// External inference capability: accepts a model id plus transcript and
/// returns an openable byte stream or an immediate error.
///
/// Injected into the session rather than held as a process-wide singleton so
/// sessions stay independently testable.
#[async_trait]
pub trait InferenceCapability: Send + Sync {
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream>;
}

/// Builds a capability from the current settings, invoked once per submit so
/// credential changes take effect without rebuilding the session
pub type CapabilityFactory = Arc<dyn Fn(&Settings) -> Result<Arc<dyn InferenceCapability>> + Send + Sync>;

/// Default factory: HTTP capability against the configured endpoint
pub fn http_capability_factory() -> CapabilityFactory {
    Arc::new(|settings| {
        let capability = HttpInference::from_settings(settings)?;
        Ok(Arc::new(capability) as Arc<dyn InferenceCapability>)
    })
}

/// Streaming inference over HTTP
#[derive(Debug)]
pub struct HttpInference {
    client: reqwest::Client,
    endpoint_url: String,
    anon_key: String,
}

impl HttpInference {
    /// Fails with `NotConfigured` when the endpoint URL or anon key is
    /// missing; no request is issued in that case.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if !settings.is_complete() {
            return Err(ChatError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            endpoint_url: settings
                .endpoint_url
                .clone()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            anon_key: settings.anon_key.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl InferenceCapability for HttpInference {
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream> {
        let url = format!("{}/functions/v1/openrouter-stream", self.endpoint_url);
        debug!(model = %request.model_id, turns = request.transcript.len(), "opening inference stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::Transport(format!(
                "inference endpoint returned {}: {}",
                status, error_text
            )));
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| ChatError::Transport(e.to_string()));
        Ok(Box::pin(stream))
    }
}
