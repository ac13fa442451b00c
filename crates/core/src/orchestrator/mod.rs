//! High-level coordination between the active provider and the cache.
//!
//! All cache traffic is best-effort: a failed cache read or write is
//! logged and the operation proceeds against the provider. Only provider
//! failures surface to the caller.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheStats, CleanupReport, MediaCache};
use crate::config::{Config, ProviderBackend};
use crate::provider::{
    Capabilities, DownloadQuality, GoogleProvider, KeyUsageStats, MediaItem, MediaProvider,
    MediaType, PexelsProvider, ProviderError, SearchFilters, SearchResult,
};

static FILENAME_SANITIZER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern"));

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Coordinates searches and downloads through one provider, with
/// cache-first reads and write-through of results.
pub struct MediaOrchestrator {
    provider: Arc<dyn MediaProvider>,
    /// Kept alongside the trait object for key usage reporting.
    pexels: Option<Arc<PexelsProvider>>,
    cache: Option<MediaCache>,
    provider_name: String,
}

impl MediaOrchestrator {
    /// Build the orchestrator from configuration: factory-selected
    /// provider plus the cache (when enabled).
    pub async fn new(config: &Config) -> Result<Self, OrchestratorError> {
        let (provider, pexels): (Arc<dyn MediaProvider>, Option<Arc<PexelsProvider>>) =
            match config.provider.backend {
                ProviderBackend::Pexels => {
                    let pexels_config = config.provider.pexels.clone().ok_or_else(|| {
                        ProviderError::MalformedRequest(
                            "pexels backend selected but provider.pexels is missing".to_string(),
                        )
                    })?;
                    let pexels = Arc::new(PexelsProvider::new(pexels_config)?);
                    (pexels.clone(), Some(pexels))
                }
                ProviderBackend::Google => {
                    let google_config = config.provider.google.clone().unwrap_or_default();
                    (Arc::new(GoogleProvider::new(google_config)), None)
                }
            };

        let cache = if config.cache.enabled {
            Some(MediaCache::new(&config.cache).await?)
        } else {
            None
        };

        let provider_name = provider.name().to_string();
        info!(provider = %provider_name, cache = cache.is_some(), "Orchestrator ready");
        Ok(Self {
            provider,
            pexels,
            cache,
            provider_name,
        })
    }

    /// Build with an explicit provider and cache, bypassing the factory.
    pub fn with_provider(provider: Arc<dyn MediaProvider>, cache: Option<MediaCache>) -> Self {
        let provider_name = provider.name().to_string();
        Self {
            provider,
            pexels: None,
            cache,
            provider_name,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.provider.capabilities()
    }

    /// Search with cache-first reads and write-through of the page plus
    /// every item's metadata.
    pub async fn search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
        use_cache: bool,
    ) -> Result<SearchResult, ProviderError> {
        if use_cache {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache
                    .get_search_result(&self.provider_name, query, page, per_page, filters)
                    .await
                {
                    return Ok(hit);
                }
            }
        }

        let result = self.provider.search(query, page, per_page, filters).await?;

        if use_cache {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache
                    .store_search_result(&self.provider_name, query, page, per_page, filters, &result)
                    .await
                {
                    warn!(error = %e, "Failed to cache search result");
                }
                for item in &result.items {
                    if let Err(e) = cache.store_item(item).await {
                        warn!(item = %item.id, error = %e, "Failed to cache item metadata");
                    }
                }
            }
        }

        Ok(result)
    }

    /// Fetch one item, metadata cache first.
    pub async fn get(&self, item_id: &str, use_cache: bool) -> Result<MediaItem, ProviderError> {
        if use_cache {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get_item(&self.provider_name, item_id).await {
                    return Ok(hit);
                }
            }
        }

        let item = self.provider.get_item(item_id).await?;

        if use_cache {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.store_item(&item).await {
                    warn!(item = item_id, error = %e, "Failed to cache item metadata");
                }
            }
        }

        Ok(item)
    }

    /// Download an item.
    ///
    /// With no `custom_path` the file lands in the cache's files namespace.
    /// A still-valid cached copy always short-circuits the provider: it is
    /// returned directly, or copied to `custom_path` when one is given.
    pub async fn download(
        &self,
        item: &MediaItem,
        quality: DownloadQuality,
        custom_path: Option<&Path>,
        use_cache: bool,
    ) -> Result<PathBuf, ProviderError> {
        if use_cache {
            if let Some(cache) = &self.cache {
                if let Some(cached) = cache
                    .get_cached_file(&item.provider, &item.id, quality)
                    .await
                {
                    match custom_path {
                        None => return Ok(cached),
                        Some(path) if path == cached => return Ok(cached),
                        Some(path) => {
                            if let Some(parent) = path.parent() {
                                tokio::fs::create_dir_all(parent).await?;
                            }
                            tokio::fs::copy(&cached, path).await?;
                            debug!(
                                item = %item.id,
                                from = %cached.display(),
                                to = %path.display(),
                                "Served download from file cache"
                            );
                            return Ok(path.to_path_buf());
                        }
                    }
                }
            }
        }

        let output_path = match custom_path {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(cache) = &self.cache else {
                    return Err(ProviderError::MalformedRequest(
                        "no output path given and caching is disabled".to_string(),
                    ));
                };
                cache.cached_file_path(
                    &item.provider,
                    &item.id,
                    quality,
                    default_extension(item.media_type),
                )
            }
        };

        let written = self.provider.download_item(item, &output_path, quality).await?;
        debug!(item = %item.id, path = %written.display(), "Download complete");
        Ok(written)
    }

    /// Search and download up to `count` items.
    ///
    /// With an `output_dir` files are named from the item identity and
    /// title; otherwise they land in the cache's files namespace.
    /// Individual download failures are logged and skipped; the batch never
    /// aborts because one item failed.
    pub async fn search_and_download(
        &self,
        query: &str,
        count: u32,
        filters: &SearchFilters,
        quality: DownloadQuality,
        output_dir: Option<&Path>,
        use_cache: bool,
    ) -> Result<Vec<PathBuf>, ProviderError> {
        let result = self.search(query, 1, count, filters, use_cache).await?;

        if let Some(dir) = output_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut paths = Vec::new();
        for item in result.items.iter().take(count as usize) {
            let target = output_dir.map(|dir| dir.join(item_filename(item)));
            match self
                .download(item, quality, target.as_deref(), use_cache)
                .await
            {
                Ok(path) => paths.push(path),
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Skipping failed download");
                }
            }
        }
        Ok(paths)
    }

    /// Download a batch of items into `output_dir`, sequentially, with the
    /// same per-item failure isolation as `search_and_download`.
    pub async fn bulk_download(
        &self,
        items: &[MediaItem],
        output_dir: &Path,
        quality: DownloadQuality,
    ) -> Result<Vec<PathBuf>, ProviderError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut paths = Vec::new();
        for item in items {
            let output_path = output_dir.join(item_filename(item));
            match self
                .download(item, quality, Some(&output_path), true)
                .await
            {
                Ok(path) => paths.push(path),
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Skipping failed download");
                }
            }
        }
        Ok(paths)
    }

    /// Per-key usage counters, available for the Pexels backend only.
    pub async fn usage_stats(&self) -> Option<Vec<KeyUsageStats>> {
        match &self.pexels {
            Some(pexels) => Some(pexels.usage_stats().await),
            None => None,
        }
    }

    pub async fn cache_stats(&self) -> Result<Option<CacheStats>, CacheError> {
        match &self.cache {
            Some(cache) => Ok(Some(cache.stats().await?)),
            None => Ok(None),
        }
    }

    pub async fn cache_cleanup(&self) -> Result<Option<CleanupReport>, CacheError> {
        match &self.cache {
            Some(cache) => Ok(Some(cache.cleanup().await?)),
            None => Ok(None),
        }
    }

    /// Release provider resources. Safe to call more than once.
    pub async fn close(&self) -> Result<(), ProviderError> {
        self.provider.close().await
    }
}

/// Deterministic output filename from the item identity and title.
fn item_filename(item: &MediaItem) -> String {
    format!(
        "{}_{}_{}.{}",
        item.provider,
        item.id,
        sanitize_filename(&item.title),
        default_extension(item.media_type)
    )
}

fn default_extension(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Photo => "jpg",
        MediaType::Video => "mp4",
    }
}

/// Collapse anything outside `[A-Za-z0-9._-]` to single underscores.
fn sanitize_filename(title: &str) -> String {
    let sanitized = FILENAME_SANITIZER.replace_all(title.trim(), "_");
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.chars().take(80).collect()
    }
}
