use serde::{Deserialize, Serialize};

/// What a message carries. Everything except `Text` points at an uploaded
/// blob via `media_url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    /// Parse a stored kind tag. Unknown tags fall back to `Text` so a
    /// corrupt row never poisons a whole listing.
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "file" => Self::File,
            _ => Self::Text,
        }
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
