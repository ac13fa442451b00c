//! Filesystem cache for search results, item metadata, and media files.
//!
//! Three namespaces under one root: `searches/`, `metadata/`, `files/`.
//! Entries are addressed by the md5 of a normalized request signature and
//! judged valid by file mtime against the configured TTL. There is no
//! size-based eviction; `cleanup()` sweeps expired entries on demand.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::provider::{DownloadQuality, MediaItem, SearchFilters, SearchResult};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk JSON wrapper for a cached value.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    timestamp: DateTime<Utc>,
    /// The normalized request signature this entry answers.
    signature: String,
    payload: T,
}

/// Per-namespace entry counts and sizes.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CacheStats {
    pub search_entries: u64,
    pub metadata_entries: u64,
    pub file_entries: u64,
    pub total_bytes: u64,
}

/// Result of a cleanup sweep.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CleanupReport {
    pub removed_entries: u64,
    pub reclaimed_bytes: u64,
}

/// TTL-bounded filesystem cache.
pub struct MediaCache {
    searches_dir: PathBuf,
    metadata_dir: PathBuf,
    files_dir: PathBuf,
    ttl: Duration,
}

impl MediaCache {
    /// Open (creating if needed) the cache at the configured root.
    pub async fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let searches_dir = config.dir.join("searches");
        let metadata_dir = config.dir.join("metadata");
        let files_dir = config.dir.join("files");
        for dir in [&searches_dir, &metadata_dir, &files_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }

        Ok(Self {
            searches_dir,
            metadata_dir,
            files_dir,
            ttl: Duration::from_secs(config.ttl_hours * 3600),
        })
    }

    /// Whether the entry at `path` exists and is younger than the TTL.
    ///
    /// A zero TTL makes every entry expired, which turns the cache into a
    /// write-only log (useful for forcing fresh fetches without disabling
    /// write-through).
    async fn is_valid(&self, path: &Path) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match modified.elapsed() {
            Ok(age) => age < self.ttl,
            // mtime in the future counts as fresh.
            Err(_) => true,
        }
    }

    async fn read_envelope<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        if !self.is_valid(path).await {
            return None;
        }
        let bytes = tokio::fs::read(path).await.ok()?;
        match serde_json::from_slice::<Envelope<T>>(&bytes) {
            Ok(envelope) => Some(envelope.payload),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry, treating as miss");
                None
            }
        }
    }

    async fn write_envelope<T: Serialize>(
        &self,
        path: &Path,
        signature: &str,
        payload: &T,
    ) -> Result<(), CacheError> {
        let envelope = Envelope {
            timestamp: Utc::now(),
            signature: signature.to_string(),
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Normalized signature for a search request.
    ///
    /// Filters serialize in struct declaration order, so identical requests
    /// always hash to the same key.
    fn search_signature(
        provider: &str,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> String {
        let filters_json = serde_json::to_string(filters).unwrap_or_default();
        format!("{}_{}_{}_{}_{}", provider, query, page, per_page, filters_json)
    }

    fn item_signature(provider: &str, item_id: &str) -> String {
        format!("{}_{}", provider, item_id)
    }

    fn file_signature(provider: &str, item_id: &str, quality: DownloadQuality) -> String {
        format!("{}_{}_{}", provider, item_id, quality.as_str())
    }

    fn hashed(signature: &str) -> String {
        format!("{:x}", md5::compute(signature.as_bytes()))
    }

    pub async fn get_search_result(
        &self,
        provider: &str,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Option<SearchResult> {
        let signature = Self::search_signature(provider, query, page, per_page, filters);
        let path = self.searches_dir.join(format!("{}.json", Self::hashed(&signature)));
        let result = self.read_envelope(&path).await;
        if result.is_some() {
            debug!(provider = provider, query = query, "Search cache hit");
        }
        result
    }

    pub async fn store_search_result(
        &self,
        provider: &str,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
        result: &SearchResult,
    ) -> Result<(), CacheError> {
        let signature = Self::search_signature(provider, query, page, per_page, filters);
        let path = self.searches_dir.join(format!("{}.json", Self::hashed(&signature)));
        self.write_envelope(&path, &signature, result).await
    }

    pub async fn get_item(&self, provider: &str, item_id: &str) -> Option<MediaItem> {
        let signature = Self::item_signature(provider, item_id);
        let path = self.metadata_dir.join(format!("{}.json", Self::hashed(&signature)));
        self.read_envelope(&path).await
    }

    pub async fn store_item(&self, item: &MediaItem) -> Result<(), CacheError> {
        let signature = Self::item_signature(&item.provider, &item.id);
        let path = self.metadata_dir.join(format!("{}.json", Self::hashed(&signature)));
        self.write_envelope(&path, &signature, item).await
    }

    /// Canonical path for a downloaded media file in the cache.
    pub fn cached_file_path(
        &self,
        provider: &str,
        item_id: &str,
        quality: DownloadQuality,
        extension: &str,
    ) -> PathBuf {
        let signature = Self::file_signature(provider, item_id, quality);
        self.files_dir
            .join(format!("{}.{}", Self::hashed(&signature), extension))
    }

    /// A valid cached media file for this item/quality, any extension.
    ///
    /// The extension is unknown at lookup time (yt-dlp picks the container),
    /// so siblings sharing the hashed stem are scanned.
    pub async fn get_cached_file(
        &self,
        provider: &str,
        item_id: &str,
        quality: DownloadQuality,
    ) -> Option<PathBuf> {
        let signature = Self::file_signature(provider, item_id, quality);
        let stem = Self::hashed(&signature);

        let mut entries = tokio::fs::read_dir(&self.files_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&stem) {
                let path = entry.path();
                if self.is_valid(&path).await {
                    debug!(path = %path.display(), "File cache hit");
                    return Some(path);
                }
            }
        }
        None
    }

    /// Remove expired entries across all namespaces.
    pub async fn cleanup(&self) -> Result<CleanupReport, CacheError> {
        let mut report = CleanupReport::default();
        for dir in [&self.searches_dir, &self.metadata_dir, &self.files_dir] {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if !self.is_valid(&path).await {
                    let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                    if tokio::fs::remove_file(&path).await.is_ok() {
                        report.removed_entries += 1;
                        report.reclaimed_bytes += size;
                    }
                }
            }
        }
        debug!(
            removed = report.removed_entries,
            bytes = report.reclaimed_bytes,
            "Cache cleanup complete"
        );
        Ok(report)
    }

    /// Entry counts and total size across namespaces.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for (dir, counter) in [
            (&self.searches_dir, 0usize),
            (&self.metadata_dir, 1),
            (&self.files_dir, 2),
        ] {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.path().is_file() {
                    continue;
                }
                match counter {
                    0 => stats.search_entries += 1,
                    1 => stats.metadata_entries += 1,
                    _ => stats.file_entries += 1,
                }
                stats.total_bytes += entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(stats)
    }
}
