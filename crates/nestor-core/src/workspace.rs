//! Filesystem helpers for working directories

use rand::Rng;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

/// Build a unique directory path `<parent>/<prefix>-<millis>-<random>`
///
/// The directory itself is not created.
pub fn unique_path(parent: &Path, prefix: &str) -> PathBuf {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000);
    parent.join(format!("{}-{}-{:06}", prefix, millis, suffix))
}

/// Create a fresh, empty directory under `parent`
pub fn create_temporary_directory(parent: &Path, prefix: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(parent)?;
    let path = unique_path(parent, prefix);
    std::fs::create_dir(&path)?;
    Ok(path)
}

/// Recursively copy `source` into `destination`
///
/// Symbolic links are recreated as links on unix and skipped elsewhere.
pub fn copy_dir(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let link = std::fs::read_link(entry.path())?;
                std::os::unix::fs::symlink(link, &target)?;
            }
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a directory tree, logging failures instead of returning them
pub fn non_blocking_clean(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), err = %err, "failed to clean directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_path() {
        let parent = Path::new("/tmp/nestor/work");
        let a = unique_path(parent, "api");
        let b = unique_path(parent, "api");
        assert!(a.starts_with(parent));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("api-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_copy_dir() {
        let source = TempDir::new().unwrap();
        std::fs::create_dir_all(source.path().join(".git/refs")).unwrap();
        std::fs::write(source.path().join(".git/HEAD"), "ref: refs/heads/master").unwrap();
        std::fs::write(source.path().join("README.md"), "hello").unwrap();

        let target = TempDir::new().unwrap();
        let destination = target.path().join("copy");
        copy_dir(source.path(), &destination).unwrap();

        assert_eq!(std::fs::read_to_string(destination.join("README.md")).unwrap(), "hello");
        assert!(destination.join(".git/refs").is_dir());
        assert!(destination.join(".git/HEAD").is_file());
    }

    #[test]
    fn test_create_and_clean() {
        let parent = TempDir::new().unwrap();
        let dir = create_temporary_directory(parent.path(), "deploy").unwrap();
        assert!(dir.is_dir());

        non_blocking_clean(&dir);
        assert!(!dir.exists());

        // cleaning twice is fine
        non_blocking_clean(&dir);
    }
}
