//! Loading branch input sets from directories.

use std::path::{Path, PathBuf};

use aigv_models::is_image_file;

use crate::error::DetectResult;

/// Image files directly inside `dir`, sorted by file name.
///
/// A missing directory is an I/O error; an empty one yields an empty list
/// and is left for fusion to reject.
pub fn load_image_set(dir: &Path) -> DetectResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_filters_and_sorts() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["frame_00002.png", "frame_00000.jpg", "notes.txt", "frame_00001.JPEG"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = load_image_set(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["frame_00000.jpg", "frame_00001.JPEG", "frame_00002.png"]);
    }

    #[test]
    fn test_missing_directory() {
        assert!(load_image_set(Path::new("/nonexistent/frames")).is_err());
    }
}
