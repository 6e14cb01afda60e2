//! Validation rules for user-authored posts and comments.

use crate::domain::error::DomainError;

/// Number of characters of post text used for titles and previews.
pub const PREVIEW_CHARS: usize = 30;

/// Trim trailing whitespace and reject blank post bodies.
pub fn normalize_post_text(raw: &str) -> Result<String, DomainError> {
    normalize_text("text", raw)
}

pub fn normalize_comment_text(raw: &str) -> Result<String, DomainError> {
    normalize_text("text", raw)
}

fn normalize_text(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let normalized = raw.replace("\r\n", "\n");
    if normalized.trim().is_empty() {
        return Err(DomainError::validation(field, "This field is required."));
    }
    Ok(normalized.trim_end().to_string())
}

/// Shortened single-line view of a post body.
pub fn preview(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = flattened.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Pixel dimensions of a decoded image attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
}

/// Confirm that the uploaded bytes decode as a supported raster image.
pub fn validate_image(bytes: &[u8]) -> Result<ImageDimensions, DomainError> {
    let invalid = || {
        DomainError::validation(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )
    };

    if bytes.is_empty() {
        return Err(DomainError::validation("image", "The submitted file is empty."));
    }

    let kind = imagesize::image_type(bytes).map_err(|_| invalid())?;
    if !is_supported_image(kind) {
        return Err(invalid());
    }

    let size = imagesize::blob_size(bytes).map_err(|_| invalid())?;
    if size.width == 0 || size.height == 0 {
        return Err(invalid());
    }

    Ok(ImageDimensions {
        width: size.width,
        height: size.height,
    })
}

fn is_supported_image(kind: imagesize::ImageType) -> bool {
    use imagesize::ImageType;

    matches!(
        kind,
        ImageType::Gif | ImageType::Jpeg | ImageType::Png | ImageType::Webp | ImageType::Bmp
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9,
        0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00,
        0x00, 0x02, 0x02, 0x0c, 0x0a, 0x00, 0x3b,
    ];

    #[test]
    fn blank_text_is_rejected() {
        assert!(normalize_post_text("   \r\n ").is_err());
        assert!(normalize_comment_text("").is_err());
    }

    #[test]
    fn text_keeps_inner_whitespace() {
        let text = normalize_post_text("first\r\n\r\nsecond  \n").expect("valid text");
        assert_eq!(text, "first\n\nsecond");
    }

    #[test]
    fn preview_truncates_long_text() {
        let text = "a".repeat(PREVIEW_CHARS + 5);
        let preview = preview(&text);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
        assert_eq!(super::preview("short\n text"), "short text");
    }

    #[test]
    fn small_gif_is_accepted() {
        let dims = validate_image(SMALL_GIF).expect("gif decodes");
        assert_eq!(dims, ImageDimensions { width: 2, height: 1 });
    }

    #[test]
    fn arbitrary_bytes_are_rejected() {
        let err = validate_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "image", .. }));
        assert!(validate_image(&[]).is_err());
    }
}
