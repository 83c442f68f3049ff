use crate::error::{MmsMediaError, Result};
use crate::extractor::store::Fingerprint;
use crate::parser::Attachment;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Local, TimeZone};

/// Media class qualifying for extraction. Any other content type (text,
/// smil, vcard, ...) is ignored entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Case-sensitive prefix match on the declared content type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.starts_with("image") {
            Some(MediaKind::Image)
        } else if content_type.starts_with("video") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Extension used when the subtype is the wildcard `*`.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "3gpp",
        }
    }
}

/// A fully decoded attachment, ready for dedup-check and write.
#[derive(Debug)]
pub struct DecodedMedia {
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub filename: String,
    /// The MIME subtype was a wildcard and the default extension was guessed.
    pub guessed_extension: bool,
}

/// Decode one qualifying attachment: base64 payload to bytes, fingerprint,
/// and a stable filename.
///
/// Returns `None` for attachments whose content type is not image or video.
/// A base64 failure fails only this attachment; siblings are unaffected.
pub fn decode_attachment(
    attachment: &Attachment,
    date_ms: Option<i64>,
    context: &str,
) -> Option<Result<DecodedMedia>> {
    let kind = MediaKind::from_content_type(&attachment.content_type)?;

    let bytes = match decode_base64(&attachment.data) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Some(Err(MmsMediaError::Base64Decode {
                context: context.to_string(),
            }))
        }
    };

    let fingerprint = Fingerprint::of(&bytes);

    let (filename, guessed_extension) = match attachment.declared_name {
        Some(ref name) => (name.clone(), false),
        None => generate_filename(kind, &attachment.content_type, date_ms, &fingerprint),
    };

    Some(Ok(DecodedMedia {
        bytes,
        fingerprint,
        filename,
        guessed_extension,
    }))
}

fn decode_base64(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    // Backup exports occasionally wrap payloads; strip whitespace first.
    let compact: Vec<u8> = data
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

/// Compose `<timestamp>-<short fingerprint>.<ext>`. The fingerprint prefix
/// keeps generated names unique even for messages within the same second.
fn generate_filename(
    kind: MediaKind,
    content_type: &str,
    date_ms: Option<i64>,
    fingerprint: &Fingerprint,
) -> (String, bool) {
    let (extension, guessed) = extension_for(kind, content_type);

    // A record without a date still needs a name; wall-clock time is only
    // used here, never for the written file's timestamp.
    let timestamp = date_ms
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Local::now);

    let name = format!(
        "{}-{}.{}",
        timestamp.format("%Y%m%d_%H%M%S_%3f"),
        fingerprint.short_hex(),
        extension
    );
    (name, guessed)
}

/// Closed subtype-to-extension mapping with an explicit wildcard arm.
fn extension_for(kind: MediaKind, content_type: &str) -> (String, bool) {
    let subtype = content_type.split('/').nth(1).unwrap_or("");

    match subtype {
        "jpeg" => ("jpg".to_string(), false),
        "" | "*" => (kind.default_extension().to_string(), true),
        other => (other.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(ct: &str, cl: Option<&str>, data: &str) -> Attachment {
        Attachment {
            content_type: ct.to_string(),
            declared_name: cl.map(String::from),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_media_kind_prefix_match() {
        assert_eq!(
            MediaKind::from_content_type("image/jpeg"),
            Some(MediaKind::Image)
        );
        assert_eq!(
            MediaKind::from_content_type("video/mp4"),
            Some(MediaKind::Video)
        );
        assert_eq!(MediaKind::from_content_type("application/smil"), None);
        // Case-sensitive: uppercase does not qualify
        assert_eq!(MediaKind::from_content_type("Image/jpeg"), None);
    }

    #[test]
    fn test_non_media_attachment_is_ignored() {
        let att = attachment("text/plain", Some("note.txt"), "aGVsbG8=");
        assert!(decode_attachment(&att, None, "part 0").is_none());
    }

    #[test]
    fn test_declared_name_used_verbatim() {
        let att = attachment("image/jpeg", Some("holiday.jpg"), "aGVsbG8=");
        let media = decode_attachment(&att, Some(1416680324000), "part 0")
            .unwrap()
            .unwrap();
        assert_eq!(media.filename, "holiday.jpg");
        assert_eq!(media.bytes, b"hello");
        assert!(!media.guessed_extension);
    }

    #[test]
    fn test_generated_name_is_deterministic() {
        let att = attachment("image/jpeg", None, "aGVsbG8=");
        let a = decode_attachment(&att, Some(1416680324000), "part 0")
            .unwrap()
            .unwrap();
        let b = decode_attachment(&att, Some(1416680324000), "part 0")
            .unwrap()
            .unwrap();
        assert_eq!(a.filename, b.filename);
        assert!(a.filename.ends_with(".jpg"));
        assert!(a.filename.contains(&a.fingerprint.short_hex()));
    }

    #[test]
    fn test_generated_names_differ_within_same_second() {
        let first = attachment("image/jpeg", None, "aGVsbG8=");
        let second = attachment("image/jpeg", None, "d29ybGQ=");
        let a = decode_attachment(&first, Some(1416680324000), "part 0")
            .unwrap()
            .unwrap();
        let b = decode_attachment(&second, Some(1416680324000), "part 1")
            .unwrap()
            .unwrap();
        assert_ne!(a.filename, b.filename);
    }

    #[test]
    fn test_wildcard_subtype_falls_back() {
        let att = attachment("image/*", None, "aGVsbG8=");
        let media = decode_attachment(&att, Some(1416680324000), "part 0")
            .unwrap()
            .unwrap();
        assert!(media.filename.ends_with(".jpg"));
        assert!(media.guessed_extension);

        let att = attachment("video/*", None, "aGVsbG8=");
        let media = decode_attachment(&att, Some(1416680324000), "part 0")
            .unwrap()
            .unwrap();
        assert!(media.filename.ends_with(".3gpp"));
        assert!(media.guessed_extension);
    }

    #[test]
    fn test_invalid_base64_fails_only_this_attachment() {
        let att = attachment("image/jpeg", Some("broken.jpg"), "!!!not-base64!!!");
        let result = decode_attachment(&att, None, "part 2").unwrap();
        assert!(matches!(result, Err(MmsMediaError::Base64Decode { .. })));
    }

    #[test]
    fn test_whitespace_wrapped_payload_decodes() {
        let att = attachment("image/jpeg", Some("a.jpg"), "aGVs\nbG8=\n");
        let media = decode_attachment(&att, None, "part 0").unwrap().unwrap();
        assert_eq!(media.bytes, b"hello");
    }

    #[test]
    fn test_missing_date_uses_wall_clock_for_name_only() {
        let att = attachment("image/jpeg", None, "aGVsbG8=");
        let media = decode_attachment(&att, None, "part 0").unwrap().unwrap();
        // Name still well-formed: timestamp, short hash, extension
        assert!(media.filename.ends_with(".jpg"));
        assert!(media.filename.contains('-'));
    }
}
