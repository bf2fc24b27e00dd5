//! # Narration Compositor
//!
//! Turn a narration script into a rendered, subtitled video.
//!
//! A script is split into parts, each part gets speech audio and an image,
//! and finalizing renders one slow-zoom segment per part, joins them in order,
//! derives subtitles from the rendered durations and stores the result.
//! Parts live in an editing session in between, so any one of them can be
//! regenerated without touching the others.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use narration_compositor::{
//!     composition::{FinalizationPipeline, FinalizeRequest},
//!     config::Config,
//!     session::SessionStore,
//!     store::{InMemoryVideoRecords, LocalOutputStore},
//!     toolchain::FfmpegToolchain,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let sessions = Arc::new(SessionStore::from_config(&config.session));
//! let session_id = sessions.load_json("session.json").await?;
//!
//! let pipeline = FinalizationPipeline::new(
//!     config.clone(),
//!     sessions,
//!     Arc::new(FfmpegToolchain::from_config(&config)),
//!     Arc::new(LocalOutputStore::from_config(&config.output)?),
//!     Arc::new(InMemoryVideoRecords::new()),
//! );
//! let output = pipeline
//!     .finalize(FinalizeRequest::new(session_id, "My narration"))
//!     .await?;
//! println!("{} ({:.1}s)", output.public_url, output.duration);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`script`] - Script grammar and part extraction
//! - [`timeline`] - Clips, derived tracks and collision-free placement
//! - [`session`] - Editing sessions and independent per-part regeneration
//! - [`synthesis`] - Speech and image provider contracts with pacing and retries
//! - [`toolchain`] - Encode/probe operations and the ffmpeg implementation
//! - [`composition`] - The finalization pipeline, motion and subtitles
//! - [`store`] - Output and video-record stores
//! - [`config`] - Configuration management

pub mod composition;
pub mod config;
pub mod error;
pub mod script;
pub mod session;
pub mod store;
pub mod synthesis;
pub mod timeline;
pub mod toolchain;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionOutput, FinalizationPipeline, FinalizeRequest},
    config::Config,
    error::{CompositorError, Result},
    script::{parse, Part},
    session::{SessionEditor, SessionStore},
    timeline::Timeline,
};
