use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{FarmError, FarmResult};

/// A photo attached to a record being saved.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Object storage for uploaded photos. Returns a URL the record can reference.
#[async_trait]
pub trait BinaryStorage: Send + Sync {
    async fn upload(&self, owner_id: &str, filename: &str, bytes: &[u8]) -> FarmResult<String>;
}

/// `photos/<owner>/<epoch millis>_<filename>`
pub fn photo_key(owner_id: &str, filename: &str, at: DateTime<Utc>) -> FarmResult<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| FarmError::Validation(format!("invalid photo file name '{filename}'")))?;
    if owner_id.is_empty() || owner_id.contains(['/', '\\']) || owner_id.starts_with('.') {
        return Err(FarmError::Validation(format!("invalid owner id '{owner_id}'")));
    }
    Ok(format!("photos/{owner_id}/{}_{name}", at.timestamp_millis()))
}

/// Writes photos below a local directory and hands out `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalPhotoStorage {
    root: PathBuf,
}

impl LocalPhotoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BinaryStorage for LocalPhotoStorage {
    async fn upload(&self, owner_id: &str, filename: &str, bytes: &[u8]) -> FarmResult<String> {
        let key = photo_key(owner_id, filename, Utc::now())?;
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "photo stored");

        let absolute = tokio::fs::canonicalize(&path).await?;
        Ok(format!("file://{}", absolute.display()))
    }
}
