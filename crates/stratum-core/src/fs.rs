//! File access and lexical path helpers

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Source of configuration file contents
///
/// A missing file must be reported as [`io::ErrorKind::NotFound`]; the
/// loader relies on that to trigger fallback resolution.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Reads files from the local disk
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Resolve `path` against `base` the way `path.resolve(base, path)` does:
/// absolute paths win, `.` and `..` are folded lexically, nothing is read
/// from disk.
pub fn resolve_path(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    normalize_path(&base.join(path))
}

/// Fold `.` and `..` components without consulting the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Make `path` absolute against the working directory, then normalize it
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    Ok(normalize_path(&std::path::absolute(path)?))
}

/// Directory containing `file`
pub fn parent_dir(file: &Path) -> &Path {
    file.parent().unwrap_or_else(|| Path::new("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_path_folds_components() {
        assert_eq!(
            resolve_path(Path::new("/repo/config"), "../lib/./out"),
            PathBuf::from("/repo/lib/out")
        );
        assert_eq!(
            resolve_path(Path::new("/repo/config"), "/abs/path"),
            PathBuf::from("/abs/path")
        );
        assert_eq!(
            normalize_path(Path::new("/a/b/../../..")),
            PathBuf::from("/")
        );
    }

    #[test]
    fn test_absolute_path_is_absolute() {
        let resolved = absolute_path(Path::new("some/../project")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("project"));
    }

    #[tokio::test]
    async fn test_local_file_system_reports_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.json");
        fs::write(&present, "{}").unwrap();

        let fs = LocalFileSystem;
        assert_eq!(fs.read_to_string(&present).await.unwrap(), "{}");

        let err = fs
            .read_to_string(&temp_dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
