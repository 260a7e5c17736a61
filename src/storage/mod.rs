// Blob storage for certificate artifacts and caller-supplied files
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file id: {0}")]
    InvalidId(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte storage addressed by opaque file ids.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `folder`, returning the new file id.
    async fn put(&self, bytes: &[u8], content_type: &str, folder: &str) -> Result<String, StorageError>;

    async fn get(&self, file_id: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, file_id: &str) -> Result<(), StorageError>;
}

/// Local-disk blob store rooted at the configured storage folder.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        ensure_dir(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, file_id: &str) -> Result<PathBuf, StorageError> {
        if file_id.is_empty() || file_id.contains("..") || file_id.starts_with('/') {
            return Err(StorageError::InvalidId(file_id.to_string()));
        }
        Ok(self.root.join(file_id))
    }
}

#[async_trait]
impl BlobStore for FileStorage {
    async fn put(&self, bytes: &[u8], content_type: &str, folder: &str) -> Result<String, StorageError> {
        let folder = sanitize_folder(folder);
        let extension = mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        let file_id = format!("{}/{}.{}", folder, Uuid::new_v4(), extension);

        let path = self.resolve(&file_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(file_id)
    }

    async fn get(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(file_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(file_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn ensure_dir(folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(folder)
}

fn sanitize_folder(folder: &str) -> String {
    let cleaned: Vec<String> = folder
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .map(|part| {
            part.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect()
        })
        .collect();
    if cleaned.is_empty() {
        "misc".to_string()
    } else {
        cleaned.join("/")
    }
}
