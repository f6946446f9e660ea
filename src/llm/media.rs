use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Coarse media kind reported by the upload relay. Anything that does not
/// declare an `image/` content type is relayed as video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

pub fn kind_for_mime(mime_type: &str) -> MediaKind {
    if mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        MediaKind::Image
    } else {
        MediaKind::Video
    }
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    let encoded = general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", mime_type, encoded)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Parses a `data:<mime>;base64,<payload>` URL. Non-base64 data URLs are
/// not produced anywhere in this service and are rejected.
pub fn parse_data_url(value: &str) -> Option<DataUrl> {
    let rest = value.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mut header_parts = header.split(';');
    let mime_type = header_parts.next().unwrap_or("").trim().to_string();
    if !header_parts.any(|part| part.trim() == "base64") {
        return None;
    }
    let bytes = general_purpose::STANDARD.decode(payload.trim()).ok()?;
    Some(DataUrl { mime_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn classifies_by_declared_prefix() {
        assert_eq!(kind_for_mime("image/png"), MediaKind::Image);
        assert_eq!(kind_for_mime("IMAGE/JPEG"), MediaKind::Image);
        assert_eq!(kind_for_mime("video/mp4"), MediaKind::Video);
        assert_eq!(kind_for_mime("application/pdf"), MediaKind::Video);
    }

    #[test]
    fn media_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
        assert_eq!(MediaKind::Image.as_str(), "image");
    }

    #[test]
    fn sniffs_png_bytes() {
        assert_eq!(detect_mime_type(PNG_SIGNATURE).as_deref(), Some("image/png"));
        assert_eq!(detect_mime_type(b"plain text"), None);
    }

    #[test]
    fn data_url_survives_parse() {
        let url = encode_data_url("image/png", PNG_SIGNATURE);
        assert!(url.starts_with("data:image/png;base64,"));
        let parsed = parse_data_url(&url).expect("valid data url");
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(parsed.bytes, PNG_SIGNATURE);
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert!(parse_data_url("data:text/plain,hello").is_none());
        assert!(parse_data_url("https://example.com/a.png").is_none());
        assert!(parse_data_url("data:image/png;base64,%%%").is_none());
    }
}
