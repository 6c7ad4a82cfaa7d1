//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::relay::EventRelay;
use physio_coach_core::{
    narrator::DEFAULT_EXEMPT_FIELDS, Narrator, NarratorOptions, PlanGenerator,
    PlanGeneratorOptions, TextGenerationService, TextToSpeechService,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests and Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Requests never mutate it; each treatment request owns its own plan values.
#[derive(Clone)]
pub struct AppState {
    pub plan_generator: PlanGenerator,
    pub narrator: Narrator,
    pub relay: EventRelay,
}

impl AppState {
    pub fn new(
        text_generator: Arc<dyn TextGenerationService>,
        tts: Arc<dyn TextToSpeechService>,
        plan_options: PlanGeneratorOptions,
        narrator_options: NarratorOptions,
    ) -> Self {
        Self {
            plan_generator: PlanGenerator::new(text_generator, plan_options),
            narrator: Narrator::new(tts, narrator_options),
            relay: EventRelay::default(),
        }
    }

    /// Wires the given adapters with the timeouts and limits from `config`.
    pub fn from_config(
        config: &Config,
        text_generator: Arc<dyn TextGenerationService>,
        tts: Arc<dyn TextToSpeechService>,
    ) -> Self {
        let plan_options = PlanGeneratorOptions {
            timeout: config.generation_timeout,
            max_attempts: config.plan_max_attempts,
        };
        let narrator_options = NarratorOptions {
            timeout: config.synthesis_timeout,
            concurrency: config.narration_concurrency,
            exempt_fields: DEFAULT_EXEMPT_FIELDS.iter().map(|f| f.to_string()).collect(),
        };
        Self::new(text_generator, tts, plan_options, narrator_options)
    }
}
