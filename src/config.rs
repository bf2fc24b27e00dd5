use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    composition::{DurationPolicy, SubtitleMode},
    error::{ConfigError, Result},
    session::AspectRatio,
};

/// Main configuration for the Narration-Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segment rendering settings
    pub render: RenderConfig,

    /// External encode/probe toolchain settings
    pub toolchain: ToolchainConfig,

    /// Speech and image provider settings
    pub synthesis: SynthesisConfig,

    /// Editing session settings
    pub session: SessionConfig,

    /// Timeline model settings
    pub timeline: TimelineConfig,

    /// Background music settings
    pub music: MusicConfig,

    /// Where finished videos are written
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.toolchain.validate()?;
        self.synthesis.validate()?;
        self.session.validate()?;
        self.timeline.validate()?;
        self.music.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Segment rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output frame rate
    pub fps: u32,

    /// Zoom factor reached at the end (zoom in) or start (zoom out) of a segment
    pub max_zoom: f64,

    /// Video encoder passed to the toolchain
    pub video_codec: String,

    /// Audio encoder passed to the toolchain
    pub audio_codec: String,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,

    /// What to do when a part's audio duration cannot be probed
    pub duration_policy: DurationPolicy,

    /// Seconds used in place of an invalid probed duration
    pub fallback_duration: f64,

    /// Skip parts whose segment fails to render instead of aborting the run
    pub skip_failed_parts: bool,

    /// How subtitles are attached to the output
    pub subtitle_mode: SubtitleMode,

    /// Parent directory for render scratch space (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            max_zoom: 1.2,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            quality: 80,
            duration_policy: DurationPolicy::Substitute,
            fallback_duration: 5.0,
            skip_failed_parts: true,
            subtitle_mode: SubtitleMode::Embed,
            work_dir: None,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > 120 {
            return Err(invalid("render.fps", self.fps).into());
        }

        if !self.max_zoom.is_finite() || self.max_zoom < 1.0 || self.max_zoom > 4.0 {
            return Err(invalid("render.max_zoom", self.max_zoom).into());
        }

        if self.quality > 100 {
            return Err(invalid("render.quality", self.quality).into());
        }

        if !self.fallback_duration.is_finite() || self.fallback_duration <= 0.0 {
            return Err(invalid("render.fallback_duration", self.fallback_duration).into());
        }

        Ok(())
    }

    /// Map the 0-100 quality setting onto an x264 CRF value
    pub fn crf(&self) -> u8 {
        (51 - ((self.quality as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
    }
}

/// External toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Encoder binary
    pub ffmpeg: String,

    /// Probe binary
    pub ffprobe: String,

    /// Upper bound for a single encode invocation (seconds)
    pub timeout_secs: u64,

    /// Upper bound for a single probe invocation (seconds)
    pub probe_timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout_secs: 600,
            probe_timeout_secs: 30,
        }
    }
}

impl ToolchainConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg.trim().is_empty() {
            return Err(invalid("toolchain.ffmpeg", &self.ffmpeg).into());
        }

        if self.ffprobe.trim().is_empty() {
            return Err(invalid("toolchain.ffprobe", &self.ffprobe).into());
        }

        if self.timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(invalid(
                "toolchain.timeouts",
                format!("{}/{}", self.timeout_secs, self.probe_timeout_secs),
            )
            .into());
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Speech/image provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Speech language passed to the speech provider
    pub language: String,

    /// Voice used when a session does not pick one
    pub default_voice: String,

    /// Image model used when a session does not pick one
    pub default_image_model: String,

    /// Retries after the first failed provider call
    pub max_retries: u32,

    /// Base backoff between retries (milliseconds, multiplied by attempt number)
    pub retry_delay_ms: u64,

    /// Minimum spacing between consecutive provider calls (milliseconds)
    pub call_spacing_ms: u64,

    /// Directory where synthesized media files are written
    pub media_dir: PathBuf,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            default_voice: "narrator".to_string(),
            default_image_model: "default".to_string(),
            max_retries: 3,
            retry_delay_ms: 2_000,
            call_spacing_ms: 1_000,
            media_dir: PathBuf::from("media"),
        }
    }
}

impl SynthesisConfig {
    fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(invalid("synthesis.language", &self.language).into());
        }

        if self.max_retries > 10 {
            return Err(invalid("synthesis.max_retries", self.max_retries).into());
        }

        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn call_spacing(&self) -> Duration {
        Duration::from_millis(self.call_spacing_ms)
    }
}

/// Editing session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is expired (seconds)
    pub ttl_secs: u64,

    /// Drop the session from the store once its output is persisted
    pub discard_after_finalize: bool,

    /// Aspect ratio used when a session does not pick one
    pub default_aspect_ratio: AspectRatio,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            discard_after_finalize: true,
            default_aspect_ratio: AspectRatio::Portrait,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(invalid("session.ttl_secs", self.ttl_secs).into());
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Timeline model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Duration reported by an empty timeline (seconds)
    pub default_duration: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { default_duration: 30.0 }
    }
}

impl TimelineConfig {
    fn validate(&self) -> Result<()> {
        if !self.default_duration.is_finite() || self.default_duration < 0.0 {
            return Err(invalid("timeline.default_duration", self.default_duration).into());
        }
        Ok(())
    }
}

/// Background music configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Linear gain applied to the music bed before mixing
    pub gain: f32,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self { gain: 0.15 }
    }
}

impl MusicConfig {
    fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || !(0.0..=2.0).contains(&self.gain) {
            return Err(invalid("music.gain", self.gain).into());
        }
        Ok(())
    }
}

/// Output location configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory of the local output store
    pub root: PathBuf,

    /// Prefix used to build public URLs for stored artifacts
    pub public_base_url: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
            public_base_url: "/videos".to_string(),
        }
    }
}
