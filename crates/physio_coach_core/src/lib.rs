pub mod domain;
pub mod error;
pub mod narrator;
pub mod plan;
pub mod ports;

pub use domain::{AnnotatedPlan, ExercisePlan, PlanNode, Step};
pub use error::{CoachError, CoachResult};
pub use narrator::{Narrator, NarratorOptions, DEFAULT_EXEMPT_FIELDS};
pub use plan::{extract_plan_payload, PlanGenerator, PlanGeneratorOptions};
pub use ports::{AudioStream, PortError, PortResult, TextGenerationService, TextToSpeechService};
