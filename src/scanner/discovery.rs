use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

/// Image files under `directory` with one of `extensions`, sorted by path.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(directory).follow_links(false) {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"))
        })?;
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                    images.push(path.to_path_buf());
                }
            }
        }
    }

    // File ids follow this order
    images.sort();

    Ok(images)
}
