//! Source file discovery.

use std::path::Path;

use batchforge_common::paths::has_extension;
use batchforge_common::{Error, Result};

/// List the names of regular files in `input_dir` whose extension matches
/// `source_extension` (case-insensitive), sorted by name.
///
/// Symlinks are followed. Entries whose names are not valid UTF-8 are
/// skipped. Failing to list the directory yields
/// [`Error::DirectoryUnreadable`].
pub async fn resolve(input_dir: &Path, source_extension: &str) -> Result<Vec<String>> {
    let unreadable = |source| Error::DirectoryUnreadable {
        path: input_dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(input_dir).await.map_err(unreadable)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let path = entry.path();
        if !has_extension(&path, source_extension) {
            continue;
        }

        // metadata() follows symlinks; dangling links are skipped.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Skipping unreadable entry: {e}");
                continue;
            }
        }

        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(name) => {
                tracing::warn!("Skipping file with non UTF-8 name: {:?}", name);
            }
        }
    }

    files.sort();
    tracing::debug!(
        input = %input_dir.display(),
        count = files.len(),
        "Resolved source files"
    );
    Ok(files)
}
