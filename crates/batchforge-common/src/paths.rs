//! Path utilities for matching source files and deriving output locations.

use std::path::{Path, PathBuf};

/// Strip a leading dot and lowercase a configured extension, so `".MXF"`,
/// `"MXF"` and `"mxf"` all compare equal.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Check whether `path` ends in `ext`, ignoring case.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use batchforge_common::paths::has_extension;
///
/// assert!(has_extension(Path::new("reel1.mxf"), "mxf"));
/// assert!(has_extension(Path::new("/ingest/REEL2.MXF"), ".mxf"));
/// assert!(!has_extension(Path::new("reel1.mxf.part"), "mxf"));
/// assert!(!has_extension(Path::new("mxf"), "mxf"));
/// ```
pub fn has_extension(path: &Path, ext: &str) -> bool {
    let wanted = normalize_extension(ext);
    if wanted.is_empty() {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase() == wanted)
        .unwrap_or(false)
}

/// Derive the destination of a converted file: `output_dir/<stem>.<target_ext>`,
/// where the stem is the file name minus its last extension.
///
/// # Examples
///
/// ```
/// use std::path::{Path, PathBuf};
/// use batchforge_common::paths::output_path_for;
///
/// assert_eq!(
///     output_path_for(Path::new("/media/out"), "reel.1.mxf", "mp4"),
///     PathBuf::from("/media/out/reel.1.mp4"),
/// );
/// ```
pub fn output_path_for(output_dir: &Path, file_name: &str, target_ext: &str) -> PathBuf {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    output_dir.join(format!("{}.{}", stem, normalize_extension(target_ext)))
}
