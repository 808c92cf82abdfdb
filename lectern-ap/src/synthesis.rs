//! Speech provider interface
//!
//! The engine depends on [`SpeechSynthesizer`] only. [`HttpSynthesizer`]
//! posts `{text, voice, speed}` as JSON and expects encoded audio bytes back.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Text to synthesize with its voice settings
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub speech_rate: f32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesisError {
    /// The caller's cancellation token fired
    #[error("synthesis cancelled")]
    Cancelled,

    /// The provider failed or returned unusable output
    #[error("synthesis failed: {0}")]
    Failed(String),
}

/// Produces encoded audio for one sentence
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `request`, giving up with `Cancelled` once `cancel` fires.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError>;

    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct SpeechBody<'a> {
    text: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Provider reached over HTTP
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Synthesis(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn request(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let body = SpeechBody {
            text: &request.text,
            voice: &request.voice,
            speed: request.speech_rate,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Failed(format!(
                "provider returned {}: {}",
                status,
                detail.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Failed(format!("reading response failed: {}", e)))?;

        if bytes.is_empty() {
            return Err(SynthesisError::Failed("provider returned no audio".to_string()));
        }

        debug!("Provider returned {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(SynthesisError::Cancelled),
            result = self.request(request) => result,
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Stand-in used when no endpoint is configured; every request fails
pub struct UnconfiguredSynthesizer;

#[async_trait]
impl SpeechSynthesizer for UnconfiguredSynthesizer {
    async fn synthesize(
        &self,
        _request: &SynthesisRequest,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        Err(SynthesisError::Failed(
            "no synthesis endpoint configured".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SynthesisRequest {
        SynthesisRequest {
            text: "Hello.".to_string(),
            voice: "alto".to_string(),
            speech_rate: 1.0,
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let synth = HttpSynthesizer::new("http://127.0.0.1:9/speech", Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            synth.synthesize(&request(), &cancel).await,
            Err(SynthesisError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails() {
        let synth = HttpSynthesizer::new("http://127.0.0.1:9/speech", Duration::from_secs(2)).unwrap();
        let result = synth.synthesize(&request(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(SynthesisError::Failed(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_always_fails() {
        let result = UnconfiguredSynthesizer
            .synthesize(&request(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SynthesisError::Failed(_))));
    }
}
