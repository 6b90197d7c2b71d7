use serde::{Deserialize, Serialize};

/// Kind of an attached media item. The storage layer persists the
/// lowercase string form; anything unrecognized round-trips as `File`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::File => "file",
        }
    }

    /// Parse the persisted string form. Returns `None` for unknown
    /// values so callers decide the fallback explicitly.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "file" => Some(MediaKind::File),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_string_roundtrip() {
        for kind in [
            MediaKind::Image,
            MediaKind::Video,
            MediaKind::Audio,
            MediaKind::File,
        ] {
            assert_eq!(MediaKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_is_none() {
        assert_eq!(MediaKind::parse("sticker"), None);
    }
}
