//! # Media Toolchain
//!
//! Declarative encode/probe operations the finalization pipeline needs, and
//! [`FfmpegToolchain`], which carries them out with the `ffmpeg` and
//! `ffprobe` binaries.

pub mod ffmpeg;
pub mod workspace;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::composition::{SubtitleMode, ZoomMotion};
use crate::error::ToolchainError;

pub use ffmpeg::FfmpegToolchain;
pub use workspace::RenderWorkspace;

/// One part's still image turned into a moving segment, muxed with its audio
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    pub part_index: usize,
    pub image: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Segment length in seconds; audio is padded or cut to match
    pub duration: f64,
    pub canvas: (u32, u32),
    pub fps: u32,
    pub motion: ZoomMotion,
}

/// Background music overlaid on a finished composition
#[derive(Debug, Clone, PartialEq)]
pub struct MusicMix {
    pub path: PathBuf,
    /// Offset into the music file where the slice starts
    pub start: f64,
    /// Offset where the slice ends; `None` plays to the end of the file
    pub end: Option<f64>,
    pub gain: f32,
}

#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Duration of a media file in seconds, as reported by the container
    async fn probe_duration(&self, path: &Path) -> Result<f64, ToolchainError>;

    async fn render_segment(&self, request: &SegmentRequest) -> Result<PathBuf, ToolchainError>;

    /// Join segments in the given order; `scratch` holds any list files
    async fn concat(&self, segments: &[PathBuf], output: &Path, scratch: &Path) -> Result<PathBuf, ToolchainError>;

    async fn attach_subtitles(
        &self,
        video: &Path,
        srt: &Path,
        mode: SubtitleMode,
        output: &Path,
    ) -> Result<PathBuf, ToolchainError>;

    /// Overlay music under the existing audio; output length follows `video`
    async fn mix_music(&self, video: &Path, music: &MusicMix, output: &Path) -> Result<PathBuf, ToolchainError>;
}
