//! # Media Synthesis
//!
//! Contracts for the external speech and image providers, plus
//! [`MediaSynthesizer`], which paces and retries provider calls and writes the
//! returned bytes to media files that parts can reference.

mod adapter;

use async_trait::async_trait;

use crate::error::SynthesisError;
use crate::session::AspectRatio;

pub use adapter::{MediaSynthesizer, Pacer};

/// Text-to-speech provider
///
/// Identical inputs are expected to produce identical audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns encoded audio bytes (mp3 or wav)
    async fn synthesize(&self, text: &str, voice_id: &str, language: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Text-to-image provider
///
/// Providers throttle bursts and answer with [`SynthesisError::RateLimited`];
/// callers go through [`MediaSynthesizer`] which retries with backoff.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns up to `count` encoded images
    async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        model: &str,
        count: usize,
    ) -> Result<Vec<Vec<u8>>, SynthesisError>;
}
