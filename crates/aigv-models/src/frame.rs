//! Frame and flow-image naming.
//!
//! Frames are persisted as `frame_{index:05}.png`. A flow image is written
//! under the file name of the *first* frame of its pair, so `flow[i]` and
//! `frame[i]` share a name across the two stores.

use std::path::Path;

/// File name prefix shared by frame and flow stores.
pub const FRAME_FILE_PREFIX: &str = "frame_";

/// Extension used when writing frames and flow images.
pub const FRAME_FILE_EXTENSION: &str = "png";

/// Extensions picked up when reading an image set back from disk.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "JPEG"];

/// Build the store file name for a zero-based frame index.
pub fn frame_file_name(index: usize) -> String {
    format!("{FRAME_FILE_PREFIX}{index:05}.{FRAME_FILE_EXTENSION}")
}

/// Parse the frame index back out of a store file name.
///
/// Returns `None` for names that were not produced by [`frame_file_name`].
pub fn parse_frame_index(name: &str) -> Option<usize> {
    let stem = name.strip_prefix(FRAME_FILE_PREFIX)?;
    let (digits, _ext) = stem.split_once('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether a path has one of the extensions an image set accepts.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_file_name_is_zero_padded() {
        assert_eq!(frame_file_name(0), "frame_00000.png");
        assert_eq!(frame_file_name(42), "frame_00042.png");
        assert_eq!(frame_file_name(123456), "frame_123456.png");
    }

    #[test]
    fn test_parse_frame_index() {
        assert_eq!(parse_frame_index("frame_00042.png"), Some(42));
        assert_eq!(parse_frame_index(&frame_file_name(7)), Some(7));
        assert_eq!(parse_frame_index("frame_.png"), None);
        assert_eq!(parse_frame_index("thumb_00001.png"), None);
        assert_eq!(parse_frame_index("frame_12a.png"), None);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/frame_00001.png")));
        assert!(is_image_file(Path::new("b.jpg")));
        assert!(is_image_file(Path::new("c.JPEG")));
        assert!(!is_image_file(Path::new("d.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
