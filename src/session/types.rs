use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::script::{MediaRef, Part};

/// Output canvas shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,

    #[serde(rename = "9:16")]
    Portrait,

    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    /// Canvas size in pixels (width, height)
    pub fn canvas(self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Square => (1080, 1080),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "16:9" | "landscape" => Some(AspectRatio::Landscape),
            "9:16" | "portrait" => Some(AspectRatio::Portrait),
            "1:1" | "square" => Some(AspectRatio::Square),
            _ => None,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session render choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub aspect_ratio: AspectRatio,
    pub voice_id: String,
    pub image_model: String,
}

/// Caller overrides applied on top of the configured defaults
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub aspect_ratio: Option<AspectRatio>,
    pub voice_id: Option<String>,
    pub image_model: Option<String>,
}

impl PrepareOptions {
    pub fn resolve(self, defaults: &RenderOptions) -> RenderOptions {
        RenderOptions {
            aspect_ratio: self.aspect_ratio.unwrap_or(defaults.aspect_ratio),
            voice_id: self.voice_id.unwrap_or_else(|| defaults.voice_id.clone()),
            image_model: self.image_model.unwrap_or_else(|| defaults.image_model.clone()),
        }
    }
}

/// One section of an already-structured script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDraft {
    pub speech_text: String,
    #[serde(default)]
    pub image_description: String,
    #[serde(default)]
    pub audio_ref: Option<MediaRef>,
    #[serde(default)]
    pub image_ref: Option<MediaRef>,
}

/// What a session is prepared from
#[derive(Debug, Clone)]
pub enum ScriptInput {
    /// Narration text that still needs parsing
    Raw(String),

    /// Sections already split by the caller, optionally with media
    Preformatted(Vec<PartDraft>),
}

/// Mutable working copy of a composition in progress
#[derive(Debug, Clone, PartialEq)]
pub struct EditingSession {
    pub session_id: String,
    pub parts: Vec<Part>,
    pub options: RenderOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EditingSession {
    pub fn new(session_id: String, parts: Vec<Part>, options: RenderOptions) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            parts,
            options,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn part(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    /// Persisted form of the session
    pub fn to_layout(&self) -> SessionLayout {
        SessionLayout {
            session_id: self.session_id.clone(),
            parts: self.parts.clone(),
            voice_id: self.options.voice_id.clone(),
            aspect_ratio: self.options.aspect_ratio,
            image_model: self.options.image_model.clone(),
        }
    }

    /// Rebuild a session from its persisted form
    ///
    /// Part indices are renumbered from the stored order.
    pub fn from_layout(layout: SessionLayout) -> Self {
        let mut parts = layout.parts;
        parts.sort_by_key(|p| p.index);
        for (i, part) in parts.iter_mut().enumerate() {
            part.index = i;
        }

        Self::new(
            layout.session_id,
            parts,
            RenderOptions {
                aspect_ratio: layout.aspect_ratio,
                voice_id: layout.voice_id,
                image_model: layout.image_model,
            },
        )
    }
}

/// Session state as stored on disk or handed to an editor client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLayout {
    pub session_id: String,
    pub parts: Vec<Part>,
    pub voice_id: String,
    pub aspect_ratio: AspectRatio,
    pub image_model: String,
}
