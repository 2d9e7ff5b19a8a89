//! Decoding of images embedded in JSON payloads.
//!
//! Clients send either a bare base64 string or a data URI such as
//! `data:image/png;base64,iVBORw0...`. The declared MIME type is not trusted;
//! the content type is taken from the decoded bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
];

fn sniff(data: &[u8]) -> Option<&'static str> {
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, content_type)| *content_type)
}

/// Returns the message to report against the image field on failure.
pub fn decode(raw: &str) -> Result<DecodedImage, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Image field may not be empty.");
    }

    let payload = match raw.strip_prefix("data:") {
        Some(uri) => {
            let (header, payload) = uri.split_once(',').ok_or("Invalid image.")?;
            if !header.starts_with("image/") || !header.ends_with(";base64") {
                return Err("Invalid image.");
            }
            payload
        }
        None => raw,
    };

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|_| "Invalid image.")?;
    let content_type = sniff(&data).ok_or("Upload a valid image.")?;
    Ok(DecodedImage { content_type, data })
}

/// File extension matching a sniffed content type.
pub fn extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_data_uri() {
        let image = decode(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(image.content_type, "image/png");
        assert!(image.data.starts_with(b"\x89PNG"));
    }

    #[test]
    fn decodes_bare_base64() {
        assert_eq!(decode(PIXEL).unwrap().content_type, "image/png");
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(decode("  "), Err("Image field may not be empty."));
        assert_eq!(decode("data:image/png;base64,@@@"), Err("Invalid image."));
        assert_eq!(decode("data:text/plain;base64,aGVsbG8="), Err("Invalid image."));
        // valid base64, but not an image
        assert_eq!(decode("aGVsbG8gd29ybGQ="), Err("Upload a valid image."));
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension("image/jpeg"), "jpg");
        assert_eq!(extension("application/octet-stream"), "bin");
    }
}
