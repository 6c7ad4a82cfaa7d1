//! services/api/src/adapters/elevenlabs.rs
//!
//! This module contains the adapter for the ElevenLabs text-to-speech API.
//! It implements the `TextToSpeechService` port from the `core` crate and
//! streams the audio body back chunk by chunk.

use crate::config::ElevenLabsConfig;
use async_trait::async_trait;
use futures::StreamExt;
use physio_coach_core::ports::{AudioStream, PortError, PortResult, TextToSpeechService};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Request body of the text-to-speech endpoint.
#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using ElevenLabs.
#[derive(Clone)]
pub struct ElevenLabsTtsAdapter {
    http: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsTtsAdapter {
    /// Creates a new `ElevenLabsTtsAdapter` whose HTTP client gives up after `timeout`.
    pub fn new(config: ElevenLabsConfig, timeout: Duration) -> PortResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url, self.config.voice_id
        )
    }
}

fn map_transport_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Timeout(format!("ElevenLabs request timed out: {}", err))
    } else {
        PortError::Remote(format!("ElevenLabs request failed: {}", err))
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for ElevenLabsTtsAdapter {
    async fn synthesize(&self, text: &str) -> PortResult<AudioStream> {
        debug!(
            text_len = text.len(),
            voice = %self.config.voice_id,
            format = %self.config.output_format,
            "ElevenLabs synthesis request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.config.model_id,
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PortError::Remote(format!(
                "ElevenLabs API error {}: {}",
                status, error_text
            )));
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_transport_error));
        Ok(Box::pin(chunks))
    }
}
