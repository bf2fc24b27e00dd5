//! # Composition
//!
//! The finalization pipeline that turns an editing session into a stored
//! video, plus the pieces it is built from: zoom motion for still images and
//! subtitle cues derived from rendered durations.

pub mod engine;
pub mod motion;
pub mod subtitles;

use serde::{Deserialize, Serialize};

pub use engine::{
    CompositionOutput, FinalizationPipeline, FinalizeRequest, FinalizeStage, MusicSelection, SkippedPart,
};
pub use motion::{frame_count, ZoomDirection, ZoomMotion};
pub use subtitles::{build_cues, srt_timestamp, to_srt, Cue};

/// What happens to a part whose audio duration cannot be determined
///
/// The same policy governs the part's segment and its subtitle cue, so the
/// two always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationPolicy {
    /// Use the configured fallback duration
    Substitute,
    /// Leave the part out of the video
    Skip,
}

/// How subtitles travel with the finished video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    /// Soft subtitle track inside the container
    Embed,
    /// Drawn into the picture
    Burn,
    /// Separate .srt file only
    Sidecar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Render {
        duration_policy: DurationPolicy,
        subtitle_mode: SubtitleMode,
    }

    #[test]
    fn test_policy_names_in_toml() {
        let render: Render = toml::from_str("duration_policy = \"skip\"\nsubtitle_mode = \"sidecar\"").unwrap();
        assert_eq!(render.duration_policy, DurationPolicy::Skip);
        assert_eq!(render.subtitle_mode, SubtitleMode::Sidecar);
    }
}
