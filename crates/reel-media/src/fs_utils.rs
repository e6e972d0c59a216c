//! Filesystem helpers for media outputs.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::MediaResult;

/// Create the parent directory of `path` if it does not exist yet.
pub async fn ensure_parent_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Remove a file, treating a missing file as success.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Files in `dir` with the given extension, sorted by name.
pub async fn list_files_with_extension(dir: impl AsRef<Path>, extension: &str) -> MediaResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c/out.mp4");
        ensure_parent_dir(&target).await.unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_if_exists(dir.path().join("nope.mp4")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_0002.jpg", "frame_0001.jpg", "notes.txt"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        let files = list_files_with_extension(dir.path(), "jpg").await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["frame_0001.jpg", "frame_0002.jpg"]);
    }
}
