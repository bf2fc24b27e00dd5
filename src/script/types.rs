use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefixes of references that only exist inside a client editor
const PLACEHOLDER_PREFIXES: [&str; 3] = ["placeholder:", "blob:", "data:"];

/// One narration section extracted from a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Stable identifier, survives reordering
    pub id: Uuid,

    /// Position in the script (0-based)
    pub index: usize,

    /// Text that gets spoken
    pub speech_text: String,

    /// Description used to generate the part's image (empty when absent)
    #[serde(default)]
    pub image_description: String,

    /// Synthesized speech audio
    #[serde(default)]
    pub audio_ref: Option<MediaRef>,

    /// Synthesized or supplied image
    #[serde(default)]
    pub image_ref: Option<MediaRef>,
}

impl Part {
    /// Create a part without any media attached
    pub fn new<S: Into<String>, D: Into<String>>(index: usize, speech_text: S, image_description: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            speech_text: speech_text.into(),
            image_description: image_description.into(),
            audio_ref: None,
            image_ref: None,
        }
    }

    /// Whether both media references are set (not necessarily resolvable)
    pub fn has_media(&self) -> bool {
        self.audio_ref.is_some() && self.image_ref.is_some()
    }
}

/// Reference to a part's media
///
/// Serialized as a plain string so the persisted session layout stays flat:
/// file paths as-is, client-side placeholders with their original prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaRef {
    /// Media file on the local filesystem
    File(PathBuf),

    /// Client-only reference that never resolves to real media
    Placeholder(String),
}

impl MediaRef {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::File(path.into())
    }

    /// Local path, if this reference points at a file
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Placeholder(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    /// Whether the reference points at media that exists right now
    pub fn is_resolvable(&self) -> bool {
        self.path().map(|p| p.is_file()).unwrap_or(false)
    }
}

impl From<String> for MediaRef {
    fn from(value: String) -> Self {
        let lowered = value.to_ascii_lowercase();
        if PLACEHOLDER_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix)) {
            Self::Placeholder(value)
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

impl From<&str> for MediaRef {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<MediaRef> for String {
    fn from(value: MediaRef) -> Self {
        match value {
            MediaRef::File(path) => path.display().to_string(),
            MediaRef::Placeholder(raw) => raw,
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Placeholder(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_detection() {
        assert!(MediaRef::from("placeholder:part-1").is_placeholder());
        assert!(MediaRef::from("blob:http://localhost/abc").is_placeholder());
        assert!(MediaRef::from("DATA:image/png;base64,AAAA").is_placeholder());
        assert!(!MediaRef::from("/tmp/part_1.mp3").is_placeholder());
    }

    #[test]
    fn test_placeholder_never_resolves() {
        let reference = MediaRef::from("placeholder:/etc/hosts");
        assert!(!reference.is_resolvable());
        assert!(reference.path().is_none());
    }

    #[test]
    fn test_media_ref_serializes_as_string() {
        let json = serde_json::to_string(&MediaRef::file("/media/a.png")).unwrap();
        assert_eq!(json, "\"/media/a.png\"");

        let back: MediaRef = serde_json::from_str("\"blob:xyz\"").unwrap();
        assert_eq!(back, MediaRef::Placeholder("blob:xyz".to_string()));
    }
}
