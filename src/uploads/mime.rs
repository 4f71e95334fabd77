//! Image MIME type and file extension mapping

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/pjpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/webp", ".webp"),
    ("image/gif", ".gif"),
    ("image/bmp", ".bmp"),
    ("image/tiff", ".tiff"),
    ("image/avif", ".avif"),
    ("image/heic", ".heic"),
    ("image/heif", ".heif"),
    ("image/svg+xml", ".svg"),
];

const EXTENSION_MIMES: &[(&str, &str)] = &[
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".webp", "image/webp"),
    (".gif", "image/gif"),
    (".bmp", "image/bmp"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".avif", "image/avif"),
    (".heic", "image/heic"),
    (".heif", "image/heif"),
    (".svg", "image/svg+xml"),
];

/// Dotted file extension for a MIME type, ignoring parameters and case
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, extension)| *extension)
}

/// MIME type for a file extension, with or without the leading dot
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = crate::config::normalize_extension(extension);
    EXTENSION_MIMES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), Some(".jpg"));
        assert_eq!(extension_for_mime("IMAGE/PNG"), Some(".png"));
        assert_eq!(extension_for_mime("image/webp; q=0.9"), Some(".webp"));
        assert_eq!(extension_for_mime("application/octet-stream"), None);
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension(".JPEG"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("png"), Some("image/png"));
        assert_eq!(mime_for_extension(".txt"), None);
    }
}
