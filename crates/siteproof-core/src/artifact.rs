use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub i64);

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArtifactId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Document,
    Image,
    Audio,
    Video,
    Note,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "tif", "tiff", "bmp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac", "ogg", "flac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi"];
const NOTE_EXTENSIONS: &[&str] = &["txt", "md"];

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Note => "note",
        }
    }

    /// Guess the media kind from a MIME type first, then the file extension.
    /// Anything unrecognised is treated as a document.
    #[must_use]
    pub fn infer(filename: &str, mime_type: Option<&str>) -> Self {
        let mime = mime_type.unwrap_or_default().trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            return Self::Image;
        }
        if mime.starts_with("audio/") {
            return Self::Audio;
        }
        if mime.starts_with("video/") {
            return Self::Video;
        }
        if mime == "text/plain" || mime == "text/markdown" {
            return Self::Note;
        }

        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Audio
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else if NOTE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Note
        } else {
            Self::Document
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" | "pdf" => Ok(Self::Document),
            "image" | "photo" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "note" | "text" => Ok(Self::Note),
            _ => Err(crate::Error::InvalidMediaKind(s.to_string())),
        }
    }
}

/// The site entity an artifact is evidence for. Exactly one per artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Building(i64),
    IndustrialPark(i64),
}

impl Owner {
    #[must_use]
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::Building(_) => "building",
            Self::IndustrialPark(_) => "industrial_park",
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Building(id) | Self::IndustrialPark(id) => *id,
        }
    }

    pub fn from_parts(owner_type: &str, id: i64) -> crate::Result<Self> {
        match owner_type {
            "building" => Ok(Self::Building(id)),
            "industrial_park" => Ok(Self::IndustrialPark(id)),
            other => Err(crate::Error::InvalidOwner(other.to_string())),
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.type_str(), self.id())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub owner: Owner,
    pub original_filename: String,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Opaque reference resolved by the blob store. `None` until the bytes are stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering an artifact; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub owner: Owner,
    pub original_filename: String,
    pub media_kind: MediaKind,
    pub mime_type: Option<String>,
}

impl NewArtifact {
    #[must_use]
    pub fn new(owner: Owner, original_filename: impl Into<String>, media_kind: MediaKind) -> Self {
        Self {
            owner,
            original_filename: original_filename.into(),
            media_kind,
            mime_type: None,
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}
