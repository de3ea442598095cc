//! Filesystem helpers for transform inputs and outputs.

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::error::MediaResult;

/// Lowercased extension of `path` including the leading dot.
pub fn source_extension(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

/// Fresh, collision-free file path in `dir` with the given extension.
///
/// `extension` includes the leading dot.
pub fn unique_output_path(dir: impl AsRef<Path>, extension: &str) -> PathBuf {
    dir.as_ref()
        .join(format!("{}{}", Uuid::new_v4().simple(), extension))
}

/// Create `dir` and its parents if missing.
pub async fn ensure_dir(dir: impl AsRef<Path>) -> MediaResult<()> {
    fs::create_dir_all(dir.as_ref()).await?;
    Ok(())
}

/// Delete a file if it exists.
///
/// Best effort: failures are logged, never returned. Returns whether a file
/// was removed.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_extension() {
        assert_eq!(source_extension("a/b/photo.PNG").as_deref(), Some(".png"));
        assert_eq!(source_extension("clip.mov").as_deref(), Some(".mov"));
        assert_eq!(source_extension("noext"), None);
        assert_eq!(source_extension(".hidden"), None);
    }

    #[test]
    fn test_unique_output_path() {
        let a = unique_output_path("/tmp/out", ".jpg");
        let b = unique_output_path("/tmp/out", ".jpg");

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/tmp/out")));
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), 32 + 4);
    }

    #[tokio::test]
    async fn test_ensure_dir_and_remove() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());

        let file = nested.join("x.txt");
        fs::write(&file, b"data").await.unwrap();

        assert!(remove_if_exists(&file).await);
        assert!(!file.exists());
        assert!(!remove_if_exists(&file).await);
    }
}
