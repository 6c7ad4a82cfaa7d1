//! crates/physio_coach_core/src/plan.rs
//!
//! The plan generator: builds the instruction prompt around a patient
//! questionnaire, sends it to the generation model and turns the reply into a
//! validated `ExercisePlan`.

use crate::domain::ExercisePlan;
use crate::error::{CoachError, CoachResult};
use crate::ports::{PortError, TextGenerationService};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Action labels the model may use for a step.
pub const ACTION_VOCABULARY: &[&str] = &[
    "Tilt neck to left",
    "Tilt neck to right",
    "Turn head to left",
    "Turn head to right",
    "Chin tuck",
    "Roll shoulders backward",
    "Roll shoulders forward",
    "Shrug shoulders",
    "Raise arms overhead",
    "Rest",
];

const PERSONA: &str = "You are an experienced, friendly physiotherapist guiding a patient through a short \
at-home exercise session. You speak directly to the patient in plain, encouraging language.";

const OUTPUT_EXAMPLE: &str = r#"```json
{
  "exercise": "Neck stretch",
  "intro": "Hi! Today we'll loosen up your neck with a gentle stretch. Sit up tall and relax your shoulders.",
  "steps": {
    "1": {
      "action": "Tilt neck to left",
      "description": "Slowly tilt your head towards your left shoulder and hold for five seconds."
    },
    "2": {
      "action": "Tilt neck to right",
      "description": "Now bring your head back to the centre and tilt it towards your right shoulder."
    }
  },
  "outro": "Great work! Repeat this stretch a few times a day and stop if anything feels painful."
}
```"#;

const OUTPUT_CONTRACT: &str = "Return ONLY the JSON payload inside a single ```json fenced block. \
Do not add any text, headings or markup before or after the block.";

/// Builds the full instruction prompt for one questionnaire.
pub fn build_prompt(questionnaire: &str) -> String {
    let vocabulary = ACTION_VOCABULARY
        .iter()
        .map(|action| format!("- {action}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{PERSONA}\n\n\
         PATIENT QUESTIONNAIRE:\n---\n{questionnaire}\n---\n\n\
         Design one exercise that suits this patient. Every step's \"action\" must be exactly \
         one of the following labels:\n{vocabulary}\n\n\
         Describe each step in the \"description\" field. Number the steps from 1.\n\n\
         Your reply must have exactly this shape:\n{OUTPUT_EXAMPLE}\n\n\
         {OUTPUT_CONTRACT}"
    )
}

fn build_reprompt(questionnaire: &str, failure: &CoachError) -> String {
    format!(
        "{}\n\nYour previous reply could not be used ({failure}). {OUTPUT_CONTRACT}",
        build_prompt(questionnaire)
    )
}

//=========================================================================================
// Fenced JSON Extraction
//=========================================================================================

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?i:json)?\s*([\s\S]*?)```").expect("fenced block pattern is valid")
});

/// Extracts the first fenced block from generated text and decodes it as JSON.
pub fn extract_plan_payload(text: &str) -> CoachResult<Value> {
    let captures = FENCED_BLOCK
        .captures(text)
        .ok_or(CoachError::NoStructuredContentFound)?;
    let body = captures.get(1).map_or("", |m| m.as_str()).trim();
    serde_json::from_str(body).map_err(|e| CoachError::MalformedPlanPayload(e.to_string()))
}

//=========================================================================================
// The Generator
//=========================================================================================

#[derive(Debug, Clone)]
pub struct PlanGeneratorOptions {
    /// Bound on each call to the generation model.
    pub timeout: Duration,
    /// Total attempts; attempts after the first are reprompts issued only when
    /// the reply was malformed or had the wrong shape.
    pub max_attempts: u32,
}

impl Default for PlanGeneratorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 2,
        }
    }
}

#[derive(Clone)]
pub struct PlanGenerator {
    service: Arc<dyn TextGenerationService>,
    options: PlanGeneratorOptions,
}

impl PlanGenerator {
    pub fn new(service: Arc<dyn TextGenerationService>, options: PlanGeneratorOptions) -> Self {
        Self { service, options }
    }

    /// Asks the generation model for a plan tailored to `questionnaire`.
    pub async fn generate_plan(&self, questionnaire: &str) -> CoachResult<ExercisePlan> {
        let attempts = self.options.max_attempts.max(1);
        let mut prompt = build_prompt(questionnaire);
        let mut attempt = 1;

        loop {
            let reply = self.complete(&prompt).await?;
            match parse_plan(&reply) {
                Ok(plan) => {
                    info!(attempt, steps = plan.steps.len(), "Generated exercise plan.");
                    return Ok(plan);
                }
                Err(err @ (CoachError::MalformedPlanPayload(_) | CoachError::InvalidPlanShape(_)))
                    if attempt < attempts =>
                {
                    warn!(attempt, error = %err, "Unusable plan from the model, reprompting.");
                    prompt = build_reprompt(questionnaire, &err);
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "Plan generation failed.");
                    return Err(err);
                }
            }
        }
    }

    async fn complete(&self, prompt: &str) -> CoachResult<String> {
        match tokio::time::timeout(self.options.timeout, self.service.complete(prompt)).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(PortError::Timeout(format!(
                "text generation exceeded {:?}",
                self.options.timeout
            ))
            .into()),
        }
    }
}

fn parse_plan(reply: &str) -> CoachResult<ExercisePlan> {
    extract_plan_payload(reply).and_then(ExercisePlan::from_json)
}
