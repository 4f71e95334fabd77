//! Single-file multipart extraction and validation

use axum::{
    body::Bytes,
    extract::{
        Multipart,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use std::path::Path;
use tracing::debug;

use crate::config::{ServerConfig, normalize_extension};
use crate::errors::WebError;
use crate::uploads::{extension_for_mime, mime_for_extension};

/// Name of the multipart part carrying the image
pub const FILE_FIELD: &str = "file";

const OCTET_STREAM: &str = "application/octet-stream";

/// A validated upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    /// Extension that passed the allow-list check
    pub extension: Option<String>,
    pub mime_type: String,
}

fn too_large(config: &ServerConfig, size: Option<usize>) -> WebError {
    WebError::PayloadTooLarge {
        size,
        max_mb: config.max_upload_size,
    }
}

fn multipart_error(error: MultipartError, config: &ServerConfig) -> WebError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(config, None)
    } else {
        WebError::bad_request(format!("Malformed multipart body: {}", error.body_text()))
    }
}

/// Extension declared by the filename, or derived from the MIME type
fn declared_extension(file_name: Option<&str>, mime_type: Option<&str>) -> Option<String> {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .or_else(|| mime_type.and_then(extension_for_mime).map(str::to_string))
}

/// Resolve the MIME type: the declared one unless missing or generic, then
/// sniffed from the bytes, then derived from the filename.
fn resolve_mime_type(declared: Option<&str>, bytes: &[u8], file_name: Option<&str>) -> String {
    if let Some(declared) = declared
        && !declared.trim().is_empty()
        && !declared.eq_ignore_ascii_case(OCTET_STREAM)
    {
        return declared.to_string();
    }
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

/// Read exactly one `file` part from the request.
///
/// Validation order: request shape, extension allow-list, size, then
/// emptiness. Nothing is hashed or written here.
pub async fn read_single_file(
    multipart: Result<Multipart, MultipartRejection>,
    config: &ServerConfig,
) -> Result<UploadedFile, WebError> {
    let mut multipart =
        multipart.map_err(|_| WebError::bad_request("Expected multipart/form-data"))?;

    let mut upload: Option<UploadedFile> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, config))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }
        if upload.is_some() {
            return Err(WebError::bad_request("Expected exactly one file"));
        }

        let file_name = field.file_name().map(str::to_string);
        let declared_mime = field.content_type().map(str::to_string);

        let extension = declared_extension(file_name.as_deref(), declared_mime.as_deref());
        let checked = extension.as_deref().unwrap_or_default();
        if !config.is_extension_allowed(checked) {
            return Err(WebError::ExtensionNotAllowed {
                extension: checked.to_string(),
                allowed: config.allowed_extensions.join(", "),
            });
        }

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, config))?;
        if bytes.len() > config.max_upload_bytes() {
            return Err(too_large(config, Some(bytes.len())));
        }

        let mime_type = resolve_mime_type(declared_mime.as_deref(), &bytes, file_name.as_deref());
        upload = Some(UploadedFile {
            bytes,
            file_name,
            extension,
            mime_type,
        });
    }

    let upload = upload.ok_or_else(|| WebError::bad_request("No file uploaded"))?;
    if upload.bytes.is_empty() {
        return Err(WebError::bad_request("Uploaded file is empty"));
    }
    Ok(upload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_declared_extension_prefers_filename() {
        assert_eq!(
            declared_extension(Some("Photo.JPEG"), Some("image/png")).as_deref(),
            Some(".jpeg")
        );
        assert_eq!(
            declared_extension(Some("blob"), Some("image/png")).as_deref(),
            Some(".png")
        );
        assert_eq!(declared_extension(None, None), None);
    }

    #[test]
    fn test_mime_type_fallbacks() {
        assert_eq!(
            resolve_mime_type(Some("image/webp"), b"data", None),
            "image/webp"
        );
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), PNG_MAGIC, None),
            "image/png"
        );
        assert_eq!(
            resolve_mime_type(None, b"not an image", Some("a.jpg")),
            "image/jpeg"
        );
        assert_eq!(resolve_mime_type(None, b"???", None), OCTET_STREAM);
    }
}
