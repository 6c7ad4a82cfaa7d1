//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{ElevenLabsTtsAdapter, OpenAiPlanAdapter, OpenAiTtsAdapter},
    config::{Config, TtsProvider},
    error::ApiError,
    web::{app, AppState},
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use physio_coach_core::{CoachError, TextToSpeechService};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let openai_client =
        Client::with_config(OpenAIConfig::new().with_api_key(config.openai_api_key.clone()));

    let plan_adapter = Arc::new(OpenAiPlanAdapter::new(
        openai_client.clone(),
        config.plan_model.clone(),
    ));

    let tts_adapter: Arc<dyn TextToSpeechService> = match config.tts_provider {
        TtsProvider::ElevenLabs => {
            let elevenlabs = config.elevenlabs.clone().ok_or_else(|| {
                ApiError::Internal("ElevenLabs settings are missing".to_string())
            })?;
            info!(voice_id = %elevenlabs.voice_id, "Narrating with ElevenLabs.");
            Arc::new(
                ElevenLabsTtsAdapter::new(elevenlabs, config.synthesis_timeout)
                    .map_err(CoachError::from)?,
            )
        }
        TtsProvider::OpenAi => {
            let voice = OpenAiTtsAdapter::parse_voice(&config.tts_voice).ok_or_else(|| {
                ApiError::Internal(format!(
                    "Invalid TTS voice specified in config: '{}'",
                    config.tts_voice
                ))
            })?;
            info!(voice = %config.tts_voice, "Narrating with OpenAI TTS.");
            Arc::new(OpenAiTtsAdapter::new(
                openai_client.clone(),
                SpeechModel::Tts1Hd,
                voice,
            ))
        }
    };

    // --- 3. Build the Shared AppState and Router ---
    let app_state = Arc::new(AppState::from_config(&config, plan_adapter, tts_adapter));
    let app = app(app_state);

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
