use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileSystemError {
    #[error("i/o error on '{path}': {reason}")]
    Io { path: String, reason: String },
}

#[async_trait]
pub trait FileSystem: Send + Sync + Debug {
    async fn exists(&self, path: &Path) -> bool;

    /// Escribe `contents`, creando los directorios padre si hace falta.
    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), FileSystemError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

fn io_error(path: &Path, e: std::io::Error) -> FileSystemError {
    FileSystemError::Io { path: path.display().to_string(),
                          reason: e.to_string() }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), FileSystemError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(path, contents).await.map_err(|e| io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_new_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("specs").join("rg-001.json");
        let fs = LocalFileSystem;
        assert!(!fs.exists(&target).await);
        fs.write_file(&target, "{}").await.unwrap();
        assert!(fs.exists(&target).await);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{}");
    }

    #[tokio::test]
    async fn writing_over_a_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFileSystem.write_file(dir.path(), "x").await.unwrap_err();
        assert!(matches!(err, FileSystemError::Io { .. }));
    }
}
