//! Upload validation and file name sanitization

use chrono::{DateTime, Utc};
use gixat_core::models::MediaType;

use crate::error::{MediaError, MediaResult};

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv", ".m4v"];

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/svg+xml",
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/x-m4v",
];

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: usize = 50 * 1024 * 1024;

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
pub const AVATAR_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Lower-cased extension including the dot, if any
pub fn extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext)
}

fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext)
}

/// Image or video, judged by content type first and extension second
pub fn detect_media_type(content_type: Option<&str>, file_name: &str) -> MediaType {
    let video_type = content_type.is_some_and(|ct| ct.to_ascii_lowercase().starts_with("video"));
    let video_ext = extension(file_name).is_some_and(|ext| is_video_extension(&ext));
    if video_type || video_ext {
        MediaType::Video
    } else {
        MediaType::Image
    }
}

/// Check a file's name and declared content type before any bytes are
/// accepted. Returns the media type the file will be stored as.
///
/// # Errors
/// - `MediaError::InvalidFile` naming the first problem found
pub fn validate_metadata(file_name: &str, content_type: Option<&str>) -> MediaResult<MediaType> {
    if file_name.trim().is_empty() {
        return Err(MediaError::InvalidFile("File name is required".to_string()));
    }
    if file_name.contains(['/', '\\']) || file_name.contains("..") {
        return Err(MediaError::InvalidFile("Invalid file name".to_string()));
    }

    let ext = extension(file_name)
        .ok_or_else(|| MediaError::InvalidFile("File must have an extension".to_string()))?;
    let image = is_image_extension(&ext);
    if !image && !is_video_extension(&ext) {
        return Err(MediaError::InvalidFile(format!(
            "File type '{}' is not allowed. Allowed types: images (.jpg, .png, .gif, .webp) and videos (.mp4, .webm, .mov)",
            ext.to_ascii_uppercase()
        )));
    }

    if let Some(content_type) = content_type.filter(|ct| !ct.is_empty()) {
        let lowered = content_type.to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&lowered.as_str()) {
            return Err(MediaError::InvalidFile(format!(
                "Content type '{}' is not allowed",
                content_type
            )));
        }
        let family_matches = if image {
            lowered.starts_with("image/")
        } else {
            lowered.starts_with("video/")
        };
        if !family_matches {
            return Err(MediaError::InvalidFile(
                "File extension does not match content type".to_string(),
            ));
        }
    }

    Ok(if image {
        MediaType::Image
    } else {
        MediaType::Video
    })
}

/// Reject empty files and files over the limit for their media type
pub fn validate_size(media_type: MediaType, size: usize) -> MediaResult<()> {
    if size == 0 {
        return Err(MediaError::InvalidFile("File is empty".to_string()));
    }
    let limit = match media_type {
        MediaType::Image => MAX_IMAGE_BYTES,
        MediaType::Video => MAX_VIDEO_BYTES,
    };
    if size > limit {
        return Err(MediaError::InvalidFile(format!(
            "File size exceeds maximum allowed size of {}MB",
            limit / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Avatars accept a narrower set of formats and sizes
pub fn validate_avatar(content_type: &str, size: usize) -> MediaResult<()> {
    if size == 0 {
        return Err(MediaError::InvalidFile("File is empty".to_string()));
    }
    if size > MAX_AVATAR_BYTES {
        return Err(MediaError::InvalidFile(
            "File size exceeds maximum allowed size of 5MB".to_string(),
        ));
    }
    if !AVATAR_CONTENT_TYPES.contains(&content_type.to_ascii_lowercase().as_str()) {
        return Err(MediaError::InvalidFile(
            "Only JPEG, PNG and WebP images are allowed".to_string(),
        ));
    }
    Ok(())
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_` and append a
/// timestamp before the extension
pub fn sanitize_file_name(file_name: &str, now: DateTime<Utc>) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stamp = now.format("%Y%m%d%H%M%S");
    match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, stamp, ext),
        _ => format!("{}_{}", cleaned, stamp),
    }
}

/// Content type implied by an extension, used when a stored object carries
/// none
pub fn content_type_for(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some(".jpg") | Some(".jpeg") => "image/jpeg",
        Some(".png") => "image/png",
        Some(".gif") => "image/gif",
        Some(".webp") => "image/webp",
        Some(".bmp") => "image/bmp",
        Some(".svg") => "image/svg+xml",
        Some(".mp4") => "video/mp4",
        Some(".webm") => "video/webm",
        Some(".mov") => "video/quicktime",
        Some(".avi") => "video/x-msvideo",
        Some(".mkv") => "video/x-matroska",
        Some(".m4v") => "video/x-m4v",
        _ => "application/octet-stream",
    }
}
