use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Filename used when the platform does not report one
pub const DEFAULT_FILENAME: &str = "audio.mp3";
/// MIME type used when the platform reports none, or one that does not parse
pub const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

const MAX_ID_LEN: usize = 128;
const MAX_HANDLE_LEN: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidId {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier is too long")]
    TooLong,
    #[error("identifier contains invalid character {0:?}")]
    InvalidChar(char),
}

fn check_id(raw: &str) -> Result<(), InvalidId> {
    if raw.is_empty() {
        return Err(InvalidId::Empty);
    }
    if raw.len() > MAX_ID_LEN {
        return Err(InvalidId::TooLong);
    }
    match raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        Some(c) => Err(InvalidId::InvalidChar(c)),
        None => Ok(()),
    }
}

/// Media handles are opaque to us; only reject what cannot travel in a path segment
fn check_handle(raw: &str) -> Result<(), InvalidId> {
    if raw.is_empty() {
        return Err(InvalidId::Empty);
    }
    if raw.len() > MAX_HANDLE_LEN {
        return Err(InvalidId::TooLong);
    }
    match raw.chars().find(|c| c.is_whitespace() || c.is_control()) {
        Some(c) => Err(InvalidId::InvalidChar(c)),
        None => Ok(()),
    }
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $check:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $check(s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $check(&value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(
    /// Key of a content message inside its container (numeric message ids included)
    ContentId,
    check_id
);
id_type!(
    /// Channel/container the content messages are posted to
    ContainerId,
    check_id
);
id_type!(
    /// Platform reference to downloadable media
    MediaHandle,
    check_handle
);

impl MediaHandle {
    /// Handle for media owned by a locally hosted message
    pub(crate) fn derived_from(content: &ContentId) -> Self {
        Self(format!("media-{content}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Document,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub handle: MediaHandle,
    pub kind: MediaKind,
}

/// File attributes; every field is optional on the platform side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A platform message as returned by a lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub file: Option<FileInfo>,
}

impl Message {
    /// Media that can be streamed as audio.
    ///
    /// Audio attachments always qualify; documents qualify when their
    /// declared MIME type is `audio/*`.
    pub fn playable_media(&self) -> Option<&Media> {
        let media = self.media.as_ref()?;
        match media.kind {
            MediaKind::Audio => Some(media),
            MediaKind::Document => self
                .declared_mime()
                .filter(|m| m.type_() == mime::AUDIO)
                .map(|_| media),
            MediaKind::Other => None,
        }
    }

    pub fn filename(&self) -> String {
        self.file
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string()
    }

    pub fn mime_type(&self) -> mime::Mime {
        self.declared_mime().unwrap_or_else(default_mime)
    }

    pub fn size(&self) -> Option<u64> {
        self.file.as_ref().and_then(|f| f.size)
    }

    fn declared_mime(&self) -> Option<mime::Mime> {
        self.file
            .as_ref()
            .and_then(|f| f.mime_type.as_deref())
            .and_then(|raw| raw.parse().ok())
    }
}

fn default_mime() -> mime::Mime {
    DEFAULT_MIME_TYPE
        .parse()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MediaKind, file: Option<FileInfo>) -> Message {
        Message {
            media: Some(Media {
                handle: "m-1".parse().unwrap(),
                kind,
            }),
            file,
        }
    }

    #[test]
    fn test_id_validation() {
        assert!("12345".parse::<ContentId>().is_ok());
        assert!("-1001234567".parse::<ContainerId>().is_ok());
        assert_eq!("".parse::<ContentId>(), Err(InvalidId::Empty));
        assert_eq!(
            "../etc".parse::<ContentId>(),
            Err(InvalidId::InvalidChar('/'))
        );
        assert_eq!(
            "a".repeat(200).parse::<ContentId>(),
            Err(InvalidId::TooLong)
        );
    }

    #[test]
    fn test_fallbacks_when_file_missing() {
        let msg = message(MediaKind::Audio, None);
        assert_eq!(msg.filename(), "audio.mp3");
        assert_eq!(msg.mime_type().essence_str(), "audio/mpeg");
        assert_eq!(msg.size(), None);
    }

    #[test]
    fn test_reported_attributes_win() {
        let msg = message(
            MediaKind::Audio,
            Some(FileInfo {
                name: Some("track01.flac".to_string()),
                mime_type: Some("audio/flac".to_string()),
                size: Some(4096),
            }),
        );
        assert_eq!(msg.filename(), "track01.flac");
        assert_eq!(msg.mime_type().essence_str(), "audio/flac");
        assert_eq!(msg.size(), Some(4096));
    }

    #[test]
    fn test_unparsable_mime_falls_back() {
        let msg = message(
            MediaKind::Audio,
            Some(FileInfo {
                name: Some("  ".to_string()),
                mime_type: Some("not a mime".to_string()),
                size: None,
            }),
        );
        assert_eq!(msg.filename(), "audio.mp3");
        assert_eq!(msg.mime_type().essence_str(), "audio/mpeg");
    }

    #[test]
    fn test_playable_media() {
        assert!(message(MediaKind::Audio, None).playable_media().is_some());
        assert!(message(MediaKind::Other, None).playable_media().is_none());
        assert!(Message::default().playable_media().is_none());

        let doc_audio = message(
            MediaKind::Document,
            Some(FileInfo {
                mime_type: Some("audio/ogg".to_string()),
                ..Default::default()
            }),
        );
        assert!(doc_audio.playable_media().is_some());

        let doc_pdf = message(
            MediaKind::Document,
            Some(FileInfo {
                mime_type: Some("application/pdf".to_string()),
                ..Default::default()
            }),
        );
        assert!(doc_pdf.playable_media().is_none());
    }

    #[test]
    fn test_message_deserializes_sparse_json() {
        let msg: Message = serde_json::from_str(
            r#"{"media": {"handle": "abc", "kind": "sticker"}}"#,
        )
        .unwrap();
        assert_eq!(msg.media.as_ref().unwrap().kind, MediaKind::Other);
        assert!(msg.file.is_none());

        let bad: Result<Message, _> =
            serde_json::from_str(r#"{"media": {"handle": "a b", "kind": "audio"}}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_media_handle_accepts_opaque_tokens() {
        let handle: MediaHandle = "QUJD+/x=".parse().unwrap();
        assert_eq!(handle.as_str(), "QUJD+/x=");
        assert!("a/b".parse::<MediaHandle>().is_ok());
        assert!("x".repeat(300).parse::<MediaHandle>().is_ok());

        assert_eq!("".parse::<MediaHandle>(), Err(InvalidId::Empty));
        assert_eq!(
            "a b".parse::<MediaHandle>(),
            Err(InvalidId::InvalidChar(' '))
        );
        assert_eq!(
            "a\nb".parse::<MediaHandle>(),
            Err(InvalidId::InvalidChar('\n'))
        );
        assert_eq!(
            "x".repeat(600).parse::<MediaHandle>(),
            Err(InvalidId::TooLong)
        );

        let msg: Message = serde_json::from_str(
            r#"{"media": {"handle": "QUJD+/x=", "kind": "audio"}}"#,
        )
        .unwrap();
        assert!(msg.playable_media().is_some());
    }
}
