//! Logo image storage
//!
//! Images are content addressed: the id is the hex encoded sha256 of the
//! image bytes, so the same logo shared by many versions is stored once.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::client::HttpClient;
use crate::error::{RepoError, Result};

/// Stores package logos
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Download the image at `url` and return its id
    async fn download_and_save_image(&self, url: &str) -> Result<String>;
}

/// Image store writing to a local directory
pub struct FsImageStore {
    client: HttpClient,
    dir: PathBuf,
}

impl FsImageStore {
    pub fn new(client: HttpClient, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store image bytes, returning the image id
    pub async fn save_image(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(RepoError::EmptyImage);
        }

        let id = image_id(data);
        let path = self.dir.join(&id);
        if tokio::fs::try_exists(&path).await? {
            tracing::trace!(id = %id, "image already stored");
            return Ok(id);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, data).await?;
        tracing::debug!(id = %id, path = %path.display(), "image stored");
        Ok(id)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn download_and_save_image(&self, url: &str) -> Result<String> {
        let data = self.client.get(url).bytes().await?;
        self.save_image(&data).await
    }
}

/// Content address of an image
pub fn image_id(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_TIMEOUT;

    #[test]
    fn test_image_id() {
        assert_eq!(
            image_id(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_save_image_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(HttpClient::new(DEFAULT_TIMEOUT).unwrap(), dir.path());

        let id = store.save_image(b"png").await.unwrap();
        let again = store.save_image(b"png").await.unwrap();
        assert_eq!(id, again);
        assert_eq!(std::fs::read(dir.path().join(&id)).unwrap(), b"png");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_save_empty_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(HttpClient::new(DEFAULT_TIMEOUT).unwrap(), dir.path());
        assert!(matches!(
            store.save_image(b"").await,
            Err(RepoError::EmptyImage)
        ));
    }
}
