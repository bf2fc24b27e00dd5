use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the Narration-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Script parsing and input errors
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script is empty")]
    Empty,

    #[error("No recognizable sections found in script")]
    Unparseable,
}

/// Timeline editing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("Clip not found: {id}")]
    ClipNotFound { id: String },

    #[error("Clip id already present on timeline: {id}")]
    DuplicateClipId { id: String },

    #[error("Invalid clip duration: {duration}")]
    InvalidDuration { duration: f64 },

    #[error("Invalid clip start time: {start}")]
    InvalidStart { start: f64 },

    #[error("Cannot move a {from} clip to the {to} track")]
    IncompatibleRetarget { from: String, to: String },
}

/// Editing session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Part index {index} out of range (session has {count} parts)")]
    PartOutOfRange { index: usize, count: usize },

    #[error("Part {part_id} no longer exists in the session")]
    PartNotFound { part_id: String },

    #[error("Input looks like a topic menu, not a narration script")]
    NotNarration,

    #[error("Part {index} has no speech text to synthesize")]
    EmptyNarration { index: usize },

    #[error("Invalid part order: {reason}")]
    InvalidOrder { reason: String },

    #[error("A finalize run is already in progress for session {id}")]
    FinalizeInProgress { id: String },

    #[error("Failed to persist session state: {reason}")]
    PersistFailed { reason: String },
}

/// Speech and image provider errors
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Synthesis failed: {reason}")]
    Failed { reason: String },

    #[error("Provider returned no media")]
    EmptyResult,

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// External encode/probe process errors
#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("{program} not found or not executable")]
    NotAvailable { program: String },

    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("Could not read media duration from {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("Toolchain IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Finalization pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No parts have both audio and image media ({total} parts checked)")]
    NoEligibleParts { total: usize },

    #[error("Every eligible part failed to render ({attempted} attempted)")]
    NoRenderedSegments { attempted: usize },

    #[error("Part {part_index} failed to render: {source}")]
    Segment {
        part_index: usize,
        #[source]
        source: ToolchainError,
    },

    #[error("Concatenation failed: {0}")]
    Concatenate(#[source] ToolchainError),

    #[error("Subtitle attachment failed: {0}")]
    Subtitles(#[source] ToolchainError),

    #[error("Music mix failed: {0}")]
    MixMusic(#[source] ToolchainError),

    #[error("Invalid music window: {start}-{end}")]
    InvalidMusicWindow { start: f64, end: f64 },
}

/// Output and video-record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid storage key: {key}")]
    InvalidKey { key: String },

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Synthesis(SynthesisError::RateLimited) => true,
            Self::Synthesis(SynthesisError::Failed { .. }) => true,
            Self::Toolchain(ToolchainError::Timeout { .. }) => true,
            Self::Pipeline(PipelineError::Segment { .. }) => true,
            // Persisting failed; the session is still intact
            Self::Store(_) => true,
            Self::Session(SessionError::FinalizeInProgress { .. }) => true,
            _ => false,
        }
    }

    /// Whether the caller supplied bad input (never worth retrying)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Script(_)
                | Self::Session(SessionError::NotFound { .. })
                | Self::Session(SessionError::NotNarration)
                | Self::Session(SessionError::EmptyNarration { .. })
                | Self::Session(SessionError::PartOutOfRange { .. })
                | Self::Session(SessionError::InvalidOrder { .. })
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Script(ScriptError::Unparseable) => {
                "Could not find any sections in the script. Start each section with a header like 'PART 1'.".to_string()
            }
            Self::Session(SessionError::NotNarration) => {
                "That looks like a list of topic suggestions. Pick a topic and generate a script first.".to_string()
            }
            Self::Session(SessionError::NotFound { id }) => {
                format!("Session '{}' has expired or does not exist.", id)
            }
            Self::Pipeline(PipelineError::NoEligibleParts { .. }) => {
                "No part has both audio and an image yet. Generate media before rendering.".to_string()
            }
            Self::Toolchain(ToolchainError::NotAvailable { program }) => {
                format!("'{}' was not found. Please install FFmpeg.", program)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_not_recoverable() {
        let err: CompositorError = ScriptError::Unparseable.into();
        assert!(err.is_input_error());
        assert!(!err.is_recoverable());

        let err: CompositorError = SessionError::NotNarration.into();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_part_scoped_toolchain_error_is_recoverable() {
        let err: CompositorError = PipelineError::Segment {
            part_index: 2,
            source: ToolchainError::Timeout {
                program: "ffmpeg".to_string(),
                seconds: 5,
            },
        }
        .into();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("Part 2"));
    }

    #[test]
    fn test_fatal_pipeline_errors() {
        let err: CompositorError = PipelineError::NoEligibleParts { total: 3 }.into();
        assert!(!err.is_recoverable());
        assert!(err.user_message().contains("No part"));
    }
}
