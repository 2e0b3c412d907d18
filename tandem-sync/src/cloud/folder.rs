//! Folder-backed remote store.
//!
//! Works with any synced folder the OS mounts (iCloud Drive, Dropbox,
//! a network share). Layout: `<root>/<sync_folder>/<entity>/<hex(key)>.json`.

use super::storage::{CloudStore, CloudStoreConfig};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tandem_types::RecordKey;
use tokio::fs;
use tracing::{debug, info, warn};

const DOCUMENT_EXTENSION: &str = "json";

/// Remote store over a local or synced folder.
#[derive(Debug, Clone)]
pub struct FolderCloudStore {
    root: PathBuf,
    config: CloudStoreConfig,
}

impl FolderCloudStore {
    /// Creates a store rooted at `root` with the default configuration.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, CloudStoreConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: CloudStoreConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// The folder documents are written to.
    pub fn sync_folder(&self) -> PathBuf {
        self.root.join(&self.config.sync_folder)
    }

    fn entity_folder(&self, entity: &str) -> SyncResult<PathBuf> {
        let invalid = entity.is_empty()
            || entity.starts_with('.')
            || entity.contains(['/', '\\'])
            || entity.contains(std::path::MAIN_SEPARATOR);
        if invalid {
            return Err(SyncError::Transport(format!(
                "entity name not usable as a folder: {entity:?}"
            )));
        }
        Ok(self.sync_folder().join(entity))
    }

    fn document_name(key: &RecordKey) -> String {
        format!("{}.{DOCUMENT_EXTENSION}", hex::encode(key.as_str()))
    }

    fn is_document(path: &Path) -> bool {
        let hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true);
        !hidden && path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION)
    }

    fn check_size(&self, len: u64) -> SyncResult<()> {
        if len > self.config.max_document_size {
            return Err(SyncError::Transport(format!(
                "document of {len} bytes exceeds limit of {}",
                self.config.max_document_size
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudStore for FolderCloudStore {
    fn provider_name(&self) -> &'static str {
        "Synced Folder"
    }

    async fn put(&self, entity: &str, key: &RecordKey, document: &[u8]) -> SyncResult<()> {
        self.check_size(document.len() as u64)?;
        let folder = self.entity_folder(entity)?;
        if !fs::try_exists(&folder).await? {
            fs::create_dir_all(&folder).await?;
            info!("Created sync folder: {:?}", folder);
        }

        let name = Self::document_name(key);
        let path = folder.join(&name);
        let staging = folder.join(format!(".{name}.tmp"));
        debug!("Writing {:?} ({} bytes)", path, document.len());

        // Write then rename so readers never see a partial document.
        fs::write(&staging, document).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn remove(&self, entity: &str, key: &RecordKey) -> SyncResult<()> {
        let path = self.entity_folder(entity)?.join(Self::document_name(key));
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, entity: &str) -> SyncResult<Vec<Vec<u8>>> {
        let folder = self.entity_folder(entity)?;
        let mut read_dir = match fs::read_dir(&folder).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() || !Self::is_document(&path) {
                continue;
            }
            if let Err(e) = self.check_size(metadata.len()) {
                warn!("Skipping {:?}: {}", path, e);
                continue;
            }
            documents.push(fs::read(&path).await?);
        }
        Ok(documents)
    }
}
