use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a clip carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClipKind {
    /// Full-frame visual of a part
    PrimaryVisual,

    /// Image layered above the primary visual
    OverlayImage,

    /// Narration audio of a part
    SpeechAudio,

    /// Music bed under the narration
    BackgroundMusic,

    /// Caption or title text
    TextOverlay,
}

/// Kinds a clip may be reclassified into, keyed by its current kind
const RETARGET_TABLE: &[(ClipKind, ClipKind)] = &[
    (ClipKind::PrimaryVisual, ClipKind::OverlayImage),
    (ClipKind::OverlayImage, ClipKind::PrimaryVisual),
    // A visual clip with its own sound can be demoted to audio-only
    (ClipKind::PrimaryVisual, ClipKind::BackgroundMusic),
    (ClipKind::SpeechAudio, ClipKind::BackgroundMusic),
    (ClipKind::BackgroundMusic, ClipKind::SpeechAudio),
];

impl ClipKind {
    pub const ALL: [ClipKind; 5] = [
        ClipKind::PrimaryVisual,
        ClipKind::OverlayImage,
        ClipKind::SpeechAudio,
        ClipKind::BackgroundMusic,
        ClipKind::TextOverlay,
    ];

    /// The lane this kind of clip lives on
    pub fn track_type(self) -> TrackType {
        match self {
            ClipKind::PrimaryVisual => TrackType::Video,
            ClipKind::OverlayImage => TrackType::Overlay,
            ClipKind::SpeechAudio => TrackType::Speech,
            ClipKind::BackgroundMusic => TrackType::Music,
            ClipKind::TextOverlay => TrackType::Text,
        }
    }

    /// Whether a clip of this kind may be reclassified as `target`
    pub fn can_retarget_to(self, target: ClipKind) -> bool {
        self == target || RETARGET_TABLE.contains(&(self, target))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClipKind::PrimaryVisual => "primary-visual",
            ClipKind::OverlayImage => "overlay-image",
            ClipKind::SpeechAudio => "speech-audio",
            ClipKind::BackgroundMusic => "background-music",
            ClipKind::TextOverlay => "text-overlay",
        }
    }
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lane of clips; ordering is the stacking order in the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackType {
    Video,
    Overlay,
    Text,
    Speech,
    Music,
}

impl TrackType {
    pub fn is_audio(self) -> bool {
        matches!(self, TrackType::Speech | TrackType::Music)
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackType::Video => "video",
            TrackType::Overlay => "overlay",
            TrackType::Text => "text",
            TrackType::Speech => "speech",
            TrackType::Music => "music",
        };
        f.write_str(name)
    }
}

/// A placed, timed unit on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub kind: ClipKind,

    /// Seconds from the start of the timeline
    pub start_time: f64,

    /// Seconds, always positive
    pub duration: f64,

    /// Media this clip plays
    pub source_ref: String,

    pub display_name: String,
}

impl Clip {
    /// Create an unplaced clip with a fresh id
    pub fn new<S: Into<String>, N: Into<String>>(kind: ClipKind, source_ref: S, display_name: N, duration: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            start_time: 0.0,
            duration,
            source_ref: source_ref.into(),
            display_name: display_name.into(),
        }
    }

    /// Use a caller-chosen id (editor-side clips keep their own ids)
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn track_type(&self) -> TrackType {
        self.kind.track_type()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Whether the playhead at `time` is inside this clip
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }
}

/// Read-only view of the clips on one lane, sorted by start time
#[derive(Debug, Clone)]
pub struct Track<'a> {
    pub track_type: TrackType,
    pub clips: Vec<&'a Clip>,
}

impl<'a> Track<'a> {
    /// End of the last clip on the lane
    pub fn end_time(&self) -> f64 {
        self.clips.iter().map(|c| c.end_time()).fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_its_own_track() {
        let mut tracks: Vec<_> = ClipKind::ALL.iter().map(|k| k.track_type()).collect();
        tracks.sort();
        tracks.dedup();
        assert_eq!(tracks.len(), ClipKind::ALL.len());
    }

    #[test]
    fn test_retarget_table() {
        assert!(ClipKind::PrimaryVisual.can_retarget_to(ClipKind::BackgroundMusic));
        assert!(ClipKind::PrimaryVisual.can_retarget_to(ClipKind::OverlayImage));
        assert!(!ClipKind::TextOverlay.can_retarget_to(ClipKind::SpeechAudio));
        assert!(!ClipKind::BackgroundMusic.can_retarget_to(ClipKind::PrimaryVisual));
        assert!(ClipKind::TextOverlay.can_retarget_to(ClipKind::TextOverlay));
    }

    #[test]
    fn test_clip_serializes_camel_case() {
        let clip = Clip::new(ClipKind::SpeechAudio, "a.mp3", "Part 1", 2.0).with_id("c1");
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["kind"], "speech-audio");
        assert_eq!(json["startTime"], 0.0);
        assert_eq!(json["displayName"], "Part 1");
    }
}
