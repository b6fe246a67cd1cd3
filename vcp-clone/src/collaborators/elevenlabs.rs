//! ElevenLabs text-to-speech client
//!
//! `POST {base_url}/v1/text-to-speech/{voice_id}?output_format={format}`
//! with the `xi-api-key` header. Requests are rate limited with a token
//! bucket shared by every job in the process.

use super::{TtsProvider, TtsRequest};
use crate::config::ElevenLabsConfig;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Serialize;
use std::num::NonZeroU32;
use std::time::Duration;
use vcp_common::{Error, Result};

const NAME: &str = "elevenlabs";

#[derive(Debug, Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: WireVoiceSettings,
}

#[derive(Debug, Serialize)]
struct WireVoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
    speed: f64,
    use_speaker_boost: bool,
}

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl ElevenLabsClient {
    pub fn new(config: &ElevenLabsConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            Error::Config("elevenlabs.requests_per_second must be at least 1".to_string())
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn endpoint(&self, voice_id: &str, output_format: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url, voice_id, output_format
        )
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn synthesize(&self, request: &TtsRequest) -> std::result::Result<Vec<u8>, CollaboratorError> {
        self.rate_limiter.until_ready().await;

        let settings = &request.settings;
        let body = TtsBody {
            text: &request.text,
            model_id: &settings.model_id,
            voice_settings: WireVoiceSettings {
                stability: settings.stability,
                similarity_boost: settings.similarity_boost,
                style: settings.style,
                speed: settings.speed,
                use_speaker_boost: true,
            },
        };

        tracing::debug!(
            voice_id = %request.voice_id,
            chars = request.text.chars().count(),
            "Requesting ElevenLabs synthesis"
        );

        let response = self
            .client
            .post(self.endpoint(&request.voice_id, &settings.output_format))
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::request(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(CollaboratorError::request(
                NAME,
                format!("HTTP {}: {}", status, detail),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::request(NAME, e))?;
        if bytes.is_empty() {
            return Err(CollaboratorError::invalid_output(NAME, "empty audio body"));
        }

        Ok(bytes.to_vec())
    }
}
