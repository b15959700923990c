//! Discovery of transform inputs.

use std::path::Path;

use crate::error::{Error, Result};

/// List the regular files in `dir` whose name ends in `.{extension}`, sorted by name.
///
/// The suffix match is exact and case-sensitive. Names that are not valid UTF-8 are
/// skipped.
pub async fn list_images(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let source_error = |source| Error::SourceDir {
        path: dir.to_path_buf(),
        source,
    };
    let suffix = format!(".{extension}");

    let mut entries = tokio::fs::read_dir(dir).await.map_err(source_error)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(source_error)? {
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Could not stat directory entry"
                );
                continue;
            }
        };
        if !file_type.is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if name.ends_with(&suffix) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_sorted_matching_files_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["003.png", "001.png", "002.png", "notes.txt", "004.PNG", "005.png.bak"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("006.png")).unwrap();

        let names = list_images(dir.path(), "png").await.unwrap();

        assert_eq!(names, vec!["001.png", "002.png", "003.png"]);
    }

    #[tokio::test]
    async fn empty_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_images(dir.path(), "png").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        match list_images(&missing, "png").await {
            Err(Error::SourceDir { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected SourceDir error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn honors_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.jpg", "c.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let names = list_images(dir.path(), "jpg").await.unwrap();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }
}
