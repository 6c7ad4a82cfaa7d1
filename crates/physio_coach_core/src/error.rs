//! crates/physio_coach_core/src/error.rs
//!
//! The error taxonomy of the treatment pipeline. Every variant is terminal for
//! the request that produced it.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    /// The generated text contained no triple-backtick fenced block.
    #[error("No fenced JSON block found in the generated plan")]
    NoStructuredContentFound,

    /// The fenced block was found but did not decode as JSON.
    #[error("Generated plan is not valid JSON: {0}")]
    MalformedPlanPayload(String),

    /// The JSON decoded but does not have the exercise plan shape.
    #[error("Generated plan has an invalid shape: {0}")]
    InvalidPlanShape(String),

    /// Speech synthesis failed for one field of the plan.
    #[error("Narration failed for `{field_path}`: {cause}")]
    NarrationFailed {
        field_path: String,
        #[source]
        cause: PortError,
    },

    #[error("Remote service timed out: {0}")]
    RemoteServiceTimeout(String),

    #[error("Remote service error: {0}")]
    RemoteServiceError(String),
}

impl CoachError {
    /// True when the failure was a remote call running out of time, including
    /// a timed-out narration call.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CoachError::RemoteServiceTimeout(_)
                | CoachError::NarrationFailed {
                    cause: PortError::Timeout(_),
                    ..
                }
        )
    }
}

impl From<PortError> for CoachError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Timeout(detail) => CoachError::RemoteServiceTimeout(detail),
            other => CoachError::RemoteServiceError(other.to_string()),
        }
    }
}

pub type CoachResult<T> = Result<T, CoachError>;
