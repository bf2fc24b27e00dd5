use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::OutputConfig;
use crate::error::StoreError;
use crate::store::{validate_key, OutputStore};

/// Output store on the local filesystem
///
/// Files land at `root/key` and are served from `public_base_url/key`.
#[derive(Debug, Clone)]
pub struct LocalOutputStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalOutputStore {
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Result<Self, StoreError> {
        if root.as_os_str().is_empty() {
            return Err(StoreError::Backend("output root is empty".to_string()));
        }
        Ok(Self {
            root,
            public_base_url: public_base_url.into(),
        })
    }

    pub fn from_config(config: &OutputConfig) -> Result<Self, StoreError> {
        Self::new(config.root.clone(), config.public_base_url.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl OutputStore for LocalOutputStore {
    async fn store(&self, local_path: &Path, key: &str, content_type: &str) -> Result<String, StoreError> {
        validate_key(key)?;
        let target = self.path_for(key);

        if tokio::fs::metadata(&target).await.is_ok() {
            debug!("{} already stored, reusing", key);
            return Ok(self.public_url(key));
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let root = self.root.clone();
        let source = local_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            // Unique temp name per call, renamed into place once complete
            let mut temp = tempfile::Builder::new().prefix(".incoming-").tempfile_in(&root)?;
            std::io::copy(&mut std::fs::File::open(&source)?, temp.as_file_mut())?;
            temp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))??;

        info!("💾 Stored {} ({})", key, content_type);
        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_copies_and_returns_url() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("render.mp4");
        std::fs::write(&source, b"video").unwrap();

        let store = LocalOutputStore::new(dir.path().join("out"), "/videos/").unwrap();
        let url = store.store(&source, "clip-1.mp4", "video/mp4").await.unwrap();

        assert_eq!(url, "/videos/clip-1.mp4");
        assert_eq!(std::fs::read(store.path_for("clip-1.mp4")).unwrap(), b"video");
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 1, "no temp files left behind");
    }

    #[tokio::test]
    async fn test_concurrent_keys_sharing_a_stem() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("render.mp4");
        let subtitles = dir.path().join("render.srt");
        std::fs::write(&video, vec![7u8; 256 * 1024]).unwrap();
        std::fs::write(&subtitles, b"1\n00:00:00,000 --> 00:00:01,000\nhi\n\n").unwrap();

        let store = LocalOutputStore::new(dir.path().join("out"), "/videos").unwrap();
        let (a, b) = tokio::join!(
            store.store(&video, "x.mp4", "video/mp4"),
            store.store(&subtitles, "x.srt", "application/x-subrip"),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(std::fs::read(store.path_for("x.mp4")).unwrap(), vec![7u8; 256 * 1024]);
        assert!(std::fs::read_to_string(store.path_for("x.srt")).unwrap().contains("hi"));
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_store_is_idempotent_on_key() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.mp4");
        let second = dir.path().join("b.mp4");
        std::fs::write(&first, b"first").unwrap();
        std::fs::write(&second, b"second").unwrap();

        let store = LocalOutputStore::new(dir.path().join("out"), "/videos").unwrap();
        let url_a = store.store(&first, "same.mp4", "video/mp4").await.unwrap();
        let url_b = store.store(&second, "same.mp4", "video/mp4").await.unwrap();

        assert_eq!(url_a, url_b);
        assert_eq!(std::fs::read(store.path_for("same.mp4")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_store_rejects_bad_key() {
        let dir = tempdir().unwrap();
        let store = LocalOutputStore::new(dir.path().to_path_buf(), "/videos").unwrap();
        let err = store.store(dir.path(), "../escape.mp4", "video/mp4").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[test]
    fn test_empty_root_rejected() {
        assert!(LocalOutputStore::new(PathBuf::new(), "/videos").is_err());
    }
}
