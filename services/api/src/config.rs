//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which speech service narrates the plans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    ElevenLabs,
    OpenAi,
}

/// Settings for the ElevenLabs text-to-speech API.
#[derive(Clone, Debug)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub openai_api_key: String,
    pub plan_model: String,
    pub plan_max_attempts: u32,
    pub generation_timeout: Duration,
    pub tts_provider: TtsProvider,
    /// Present when `tts_provider` is ElevenLabs.
    pub elevenlabs: Option<ElevenLabsConfig>,
    pub tts_voice: String,
    pub synthesis_timeout: Duration,
    pub narration_concurrency: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Server Settings ---
        let bind_address = parse_value::<SocketAddr>("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:8000"))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Plan Generation ---
        let openai_api_key = required("OPENAI_API_KEY")?;
        let plan_model = var_or("PLAN_MODEL", "gpt-4o");
        let plan_max_attempts = parse_at_least_one::<u32>("PLAN_MAX_ATTEMPTS", &var_or("PLAN_MAX_ATTEMPTS", "2"))?;
        let generation_timeout = Duration::from_secs(parse_at_least_one::<u64>(
            "GENERATION_TIMEOUT_SECS",
            &var_or("GENERATION_TIMEOUT_SECS", "60"),
        )?);

        // --- Narration ---
        let tts_provider = match var_or("TTS_PROVIDER", "elevenlabs").to_lowercase().as_str() {
            "elevenlabs" => TtsProvider::ElevenLabs,
            "openai" => TtsProvider::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue(
                    "TTS_PROVIDER".to_string(),
                    format!("'{}' is not one of elevenlabs, openai", other),
                ))
            }
        };

        let elevenlabs = match tts_provider {
            TtsProvider::ElevenLabs => Some(ElevenLabsConfig {
                api_key: required("ELEVENLABS_API_KEY")?,
                base_url: var_or("ELEVENLABS_BASE_URL", "https://api.elevenlabs.io")
                    .trim_end_matches('/')
                    .to_string(),
                voice_id: var_or("ELEVENLABS_VOICE_ID", "cgSgspJ2msm6clMCkdW9"),
                model_id: var_or("ELEVENLABS_MODEL_ID", "eleven_flash_v2_5"),
                output_format: var_or("ELEVENLABS_OUTPUT_FORMAT", "mp3_44100_128"),
            }),
            TtsProvider::OpenAi => None,
        };

        let tts_voice = var_or("TTS_VOICE", "alloy");
        let synthesis_timeout = Duration::from_secs(parse_at_least_one::<u64>(
            "SYNTHESIS_TIMEOUT_SECS",
            &var_or("SYNTHESIS_TIMEOUT_SECS", "30"),
        )?);
        let narration_concurrency = parse_at_least_one::<usize>(
            "NARRATION_CONCURRENCY",
            &var_or("NARRATION_CONCURRENCY", "4"),
        )?;

        Ok(Self {
            bind_address,
            log_level,
            openai_api_key,
            plan_model,
            plan_max_attempts,
            generation_timeout,
            tts_provider,
            elevenlabs,
            tts_voice,
            synthesis_timeout,
            narration_concurrency,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_at_least_one<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + From<u8>,
    T::Err: std::fmt::Display,
{
    let value = parse_value::<T>(key, raw)?;
    if value < T::from(1u8) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(value)
}
