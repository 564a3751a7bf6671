//! Published storage on top of an object store.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::checksum::{self, ChecksumInfo};
use crate::client::{Metadata, ObjectClient};
use crate::config::PublishedStorageConfig;
use crate::copy::{CopyCoordinator, CopyMode, CopyPolicy};
use crate::error::{PublishError, Result};
use crate::filelist;
use crate::path;
use crate::path_cache::{CacheLookup, PathCache};
use crate::published::{Progress, PublishedStorage};
use crate::SYMLINK_METADATA_KEY;

/// File-system-like view of one publish root inside an object store.
///
/// The client handle is shared and the prefix is fixed at construction. The
/// path cache belongs to this instance alone and lives as long as it does,
/// so create one storage per publish session.
#[derive(Debug)]
pub struct ObjectPublishedStorage {
    client: Arc<dyn ObjectClient>,
    prefix: String,
    label: String,
    cache: PathCache,
    copier: CopyCoordinator,
}

impl ObjectPublishedStorage {
    pub fn new(client: Arc<dyn ObjectClient>, prefix: &str) -> Self {
        Self::with_policy(client, prefix, CopyPolicy::default())
    }

    pub fn with_policy(client: Arc<dyn ObjectClient>, prefix: &str, policy: CopyPolicy) -> Self {
        let prefix = path::resolve("", prefix);
        let label = format!("{}/{}", client.name(), prefix);
        let copier = CopyCoordinator::new(client.clone(), policy, label.clone());
        Self {
            client,
            prefix,
            label,
            cache: PathCache::new(),
            copier,
        }
    }

    /// Build a storage from configuration, connecting to the configured backend.
    pub async fn from_config(config: PublishedStorageConfig) -> Result<Self> {
        let client = config.backend.connect(config.page_size).await?;
        Ok(Self::with_policy(client, &config.prefix, config.copy))
    }

    /// Cancel in-flight copy polling once a value is sent on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<()>) -> Self {
        self.copier = self.copier.with_shutdown(shutdown);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Read back a published file, `None` if it does not exist.
    pub async fn read_file(&self, path: &str) -> Result<Option<Bytes>> {
        let key = self.key(path);
        self.client
            .get_object(&key)
            .await
            .map_err(|source| PublishError::Properties {
                path: key,
                storage: self.label.clone(),
                source,
            })
    }

    /// Absolute key for a path relative to the publish root.
    fn key(&self, path: &str) -> String {
        path::resolve(&self.prefix, path)
    }

    /// Stream `source` to `rel_path` without touching the cache.
    ///
    /// The file is checksummed first unless the caller already knows its
    /// SHA-256. Returns the checksum stored with the object.
    async fn upload(&self, rel_path: &str, source: &Path, known: Option<&str>) -> Result<String> {
        let checksum = match known {
            Some(checksum) => checksum.to_ascii_lowercase(),
            None => {
                ChecksumInfo::compute(source)
                    .await
                    .map_err(|e| PublishError::Io {
                        path: source.to_path_buf(),
                        source: e,
                    })?
                    .sha256
            }
        };
        let key = self.key(rel_path);

        self.client
            .upload_file(&key, source, &checksum, None)
            .await
            .map_err(|e| PublishError::Upload {
                source_path: source.to_path_buf(),
                destination: key.clone(),
                storage: self.label.clone(),
                source: e,
            })?;

        info!(key = %key, "uploaded file");
        Ok(checksum)
    }

    /// Checksum of an existing object whose cache entry carries none.
    ///
    /// Objects written by other tools have no stored SHA-256, so their body
    /// is digested. `None` when the object is gone.
    async fn stored_checksum(&self, key: &str) -> Result<Option<String>> {
        let props = self
            .client
            .get_properties(key)
            .await
            .map_err(|source| PublishError::Properties {
                path: key.to_string(),
                storage: self.label.clone(),
                source,
            })?;
        let Some(props) = props else {
            return Ok(None);
        };
        if let Some(checksum) = props.checksum {
            return Ok(Some(checksum));
        }

        debug!(key = %key, "no stored checksum, digesting object");
        let data = self
            .client
            .get_object(key)
            .await
            .map_err(|source| PublishError::Properties {
                path: key.to_string(),
                storage: self.label.clone(),
                source,
            })?;
        Ok(data.map(|data| checksum::digest(&data)))
    }
}

impl fmt::Display for ObjectPublishedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[async_trait]
impl PublishedStorage for ObjectPublishedStorage {
    async fn mkdir(&self, _path: &str) -> Result<()> {
        // directories are implicit key prefixes
        Ok(())
    }

    async fn put_file(&self, path: &str, source: &Path) -> Result<()> {
        let rel_path = path::resolve("", path);
        let checksum = self.upload(&rel_path, source, None).await?;
        self.cache.lock().await.record(&rel_path, checksum);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let rel_path = path::resolve("", path);
        let key = self.key(&rel_path);

        self.client
            .delete_object(&key, None)
            .await
            .map_err(|source| PublishError::Remove {
                path: key.clone(),
                storage: self.label.clone(),
                source,
            })?;

        self.cache.lock().await.forget(&rel_path);
        debug!(key = %key, "removed file");
        Ok(())
    }

    async fn remove_dirs(&self, path: &str, progress: Option<&dyn Progress>) -> Result<()> {
        let dir = path::resolve("", path);
        let entries = match filelist::enumerate(&*self.client, &self.prefix, &dir, &self.label).await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir, storage = %self.label, error = %e, "listing failed, nothing removed");
                return Ok(());
            }
        };

        if let Some(progress) = progress {
            progress.start(entries.len());
        }

        let mut removed = Vec::with_capacity(entries.len());
        let mut failures = Vec::new();
        for entry in entries {
            let rel_path = path::join(&dir, &entry.path);
            match self.client.delete_object(&self.key(&rel_path), None).await {
                Ok(()) => removed.push(rel_path.clone()),
                Err(e) => {
                    warn!(path = %rel_path, error = %e, "failed to delete");
                    failures.push((rel_path.clone(), e));
                }
            }
            if let Some(progress) = progress {
                progress.advance(&rel_path);
            }
        }

        if let Some(progress) = progress {
            progress.finish();
        }

        let mut cache = self.cache.lock().await;
        for rel_path in &removed {
            cache.forget(rel_path);
        }
        drop(cache);

        info!(path = %dir, removed = removed.len(), failed = failures.len(), "removed directory");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError::RemoveDirs {
                path: self.key(&dir),
                storage: self.label.clone(),
                failures,
            })
        }
    }

    async fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let from = path::resolve("", old_name);
        let to = path::resolve("", new_name);

        self.copier
            .copy_or_move(&self.key(&from), &self.key(&to), None, CopyMode::Move)
            .await?;

        self.cache.lock().await.rename(&from, &to);
        Ok(())
    }

    async fn symlink(&self, src: &str, dst: &str) -> Result<()> {
        let from = path::resolve("", src);
        let to = path::resolve("", dst);
        let mut metadata = Metadata::new();
        metadata.insert(SYMLINK_METADATA_KEY.to_string(), src.to_string());

        self.copier
            .copy_or_move(&self.key(&from), &self.key(&to), Some(&metadata), CopyMode::Copy)
            .await?;

        self.cache.lock().await.duplicate(&from, &to);
        Ok(())
    }

    async fn hard_link(&self, src: &str, dst: &str) -> Result<()> {
        // no hard links in object storage, degrade to a marked copy
        self.symlink(src, dst).await
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let key = self.key(path);
        match self.client.get_properties(&key).await {
            Ok(props) => Ok(props.is_some()),
            Err(source) => Err(PublishError::Properties {
                path: key,
                storage: self.label.clone(),
                source,
            }),
        }
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let key = self.key(path);
        let props = self
            .client
            .get_properties(&key)
            .await
            .map_err(|source| PublishError::Properties {
                path: key.clone(),
                storage: self.label.clone(),
                source,
            })?
            .ok_or_else(|| PublishError::NotFound {
                path: key.clone(),
                storage: self.label.clone(),
            })?;

        props
            .metadata_value(SYMLINK_METADATA_KEY)
            .map(str::to_string)
            .ok_or(PublishError::NotALink {
                path: key,
                storage: self.label.clone(),
            })
    }

    async fn link_from_pool(
        &self,
        published_directory: &str,
        file_name: &str,
        source_path: &Path,
        source_checksums: &ChecksumInfo,
        force: bool,
    ) -> Result<()> {
        // the published object is named after the pool file
        let base_name = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel_path = path::join(published_directory, &base_name);
        let pool_path = self.key(&rel_path);
        let dir = path::parent(&rel_path);

        let mut cache = self.cache.lock().await;
        if !cache.is_warm(&dir) {
            let listing = filelist::enumerate(&*self.client, &self.prefix, &dir, &self.label)
                .await
                .map_err(|e| PublishError::CacheWarm {
                    prefix: dir.clone(),
                    storage: self.label.clone(),
                    source: Box::new(e),
                })?;
            debug!(dir = %dir, count = listing.len(), "warmed path cache");
            cache.warm(&dir, listing);
        }

        if cache.lookup(&rel_path) == CacheLookup::Unverified {
            match self.stored_checksum(&pool_path).await? {
                Some(checksum) => cache.record(&rel_path, checksum),
                None => {
                    cache.forget(&rel_path);
                }
            }
        }

        let source_checksum = source_checksums.sha256.as_str();
        match cache.lookup(&rel_path) {
            CacheLookup::Present(existing) if existing.eq_ignore_ascii_case(source_checksum) => {
                debug!(key = %pool_path, file_name = %file_name, "identical file already published");
                return Ok(());
            }
            CacheLookup::Present(_) if !force => {
                return Err(PublishError::Conflict {
                    path: pool_path,
                    storage: self.label.clone(),
                });
            }
            CacheLookup::Present(_) => {
                warn!(key = %pool_path, file_name = %file_name, "overwriting different file");
            }
            CacheLookup::Absent | CacheLookup::Unknown | CacheLookup::Unverified => {}
        }

        self.upload(&rel_path, source_path, Some(source_checksum)).await?;
        cache.record(&rel_path, source_checksum);
        Ok(())
    }

    async fn filelist(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = filelist::enumerate(&*self.client, &self.prefix, prefix, &self.label).await?;
        Ok(entries.into_iter().map(|entry| entry.path).collect())
    }
}
