//! crates/physio_coach_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the two remote services the core
//! depends on. These traits form the boundary of the hexagonal architecture, so
//! the plan generator and narrator never see a vendor SDK or HTTP client.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, vendor API).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Remote call timed out: {0}")]
    Timeout(String),
    #[error("Remote service error: {0}")]
    Remote(String),
    #[error("Remote service returned no audio")]
    EmptyAudio,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Ordered audio chunks as returned by a speech service.
pub type AudioStream = Pin<Box<dyn Stream<Item = PortResult<Bytes>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Sends one prompt to the generation model and returns its raw text reply.
    async fn complete(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Starts synthesizing `text`. Chunks must be consumed in order.
    async fn synthesize(&self, text: &str) -> PortResult<AudioStream>;
}
