//! Header helpers for the streaming endpoint

use axum::http::HeaderValue;

use crate::platform::DEFAULT_MIME_TYPE;

/// Build `inline; filename="..."` for `filename`.
///
/// Header values must be visible ASCII, so the quoted form gets a lossy
/// ASCII rendition and non-ASCII names are additionally carried in an
/// RFC 5987 `filename*` parameter.
pub fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut value = format!("inline; filename=\"{fallback}\"");
    if !filename.is_ascii() {
        value.push_str("; filename*=UTF-8''");
        value.push_str(&urlencoding::encode(filename));
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

/// `Content-Type` value for `mime_type`, falling back to the default audio type
pub fn content_type(mime_type: &mime::Mime) -> HeaderValue {
    HeaderValue::from_str(mime_type.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_filename() {
        assert_eq!(
            content_disposition("song.mp3"),
            "inline; filename=\"song.mp3\""
        );
        assert_eq!(
            content_disposition("My Song (live).mp3"),
            "inline; filename=\"My Song (live).mp3\""
        );
    }

    #[test]
    fn test_quotes_are_neutralised() {
        assert_eq!(
            content_disposition("a\"b\\c.mp3"),
            "inline; filename=\"a_b_c.mp3\""
        );
    }

    #[test]
    fn test_non_ascii_filename() {
        let value = content_disposition("песня.mp3");
        let value = value.to_str().unwrap();
        assert!(value.starts_with("inline; filename=\"_____.mp3\""));
        assert!(value.ends_with("filename*=UTF-8''%D0%BF%D0%B5%D1%81%D0%BD%D1%8F.mp3"));
    }

    #[test]
    fn test_extended_filename_escapes_reserved_bytes() {
        let value = content_disposition("café & co.mp3");
        let value = value.to_str().unwrap();
        assert!(value.starts_with("inline; filename=\"caf_ & co.mp3\""));
        assert!(value.ends_with("filename*=UTF-8''caf%C3%A9%20%26%20co.mp3"));
    }

    #[test]
    fn test_content_type() {
        let mime: mime::Mime = "audio/ogg".parse().unwrap();
        assert_eq!(content_type(&mime), "audio/ogg");
    }
}
