//! Image attachment helpers.

use std::path::Path;

use base64::Engine;

use super::message::ImageContent;
use crate::error::CoraError;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// MIME type for an image file, derived from its extension.
///
/// Unrecognized or missing extensions fall back to `image/jpeg`.
pub fn mime_type_for(path: impl AsRef<Path>) -> &'static str {
    let extension = path
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// Encode raw image bytes for inline transport.
pub fn encode_image(bytes: &[u8], mime_type: impl Into<String>) -> ImageContent {
    ImageContent {
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
        mime_type: mime_type.into(),
    }
}

/// Read an image file and encode it as inline base64 content.
pub async fn load_image(path: impl AsRef<Path>) -> Result<ImageContent, CoraError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    Ok(encode_image(&bytes, mime_type_for(path)))
}
