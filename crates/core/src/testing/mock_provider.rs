//! Mock media provider for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::provider::{
    Capabilities, DownloadQuality, MediaItem, MediaProvider, MediaTypeFilter, ProviderError,
    SearchFilters, SearchResult,
};

/// A recorded search for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    pub query: String,
    pub page: u32,
    pub per_page: u32,
    pub filters: SearchFilters,
}

/// A recorded download for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedDownload {
    pub item_id: String,
    pub output_path: PathBuf,
    pub quality: DownloadQuality,
}

/// Mock implementation of the MediaProvider trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable items from `search` and `get_item`
/// - Track searches and downloads for assertions
/// - Inject a one-shot error or per-item download failures
///
/// Downloads write a real stub file so cache and filesystem paths can be
/// asserted against.
pub struct MockProvider {
    items: Arc<RwLock<Vec<MediaItem>>>,
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    downloads: Arc<RwLock<Vec<RecordedDownload>>>,
    next_error: Arc<RwLock<Option<ProviderError>>>,
    failing_downloads: Arc<RwLock<HashSet<String>>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider with no items.
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            downloads: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_downloads: Arc::new(RwLock::new(HashSet::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configure the items that searches and lookups will return.
    pub async fn set_items(&self, items: Vec<MediaItem>) {
        *self.items.write().await = items;
    }

    /// Make the next search or lookup fail with this error.
    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make downloads of this item ID fail.
    pub async fn fail_download(&self, item_id: &str) {
        self.failing_downloads.write().await.insert(item_id.to_string());
    }

    /// Searches made so far.
    pub async fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    pub async fn search_count(&self) -> usize {
        self.searches.read().await.len()
    }

    /// Downloads made so far.
    pub async fn recorded_downloads(&self) -> Vec<RecordedDownload> {
        self.downloads.read().await.clone()
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn take_error(&self) -> Option<ProviderError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl MediaProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        self.searches.write().await.push(RecordedSearch {
            query: query.to_string(),
            page,
            per_page,
            filters: filters.clone(),
        });

        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        let items: Vec<MediaItem> = self
            .items
            .read()
            .await
            .iter()
            .take(per_page as usize)
            .cloned()
            .collect();
        let total = items.len() as u64;
        Ok(SearchResult {
            items,
            total_results: total,
            page,
            per_page,
            total_pages: 1,
            has_next: false,
        })
    }

    async fn get_item(&self, item_id: &str) -> Result<MediaItem, ProviderError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }

        self.items
            .read()
            .await
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(item_id.to_string()))
    }

    async fn download_item(
        &self,
        item: &MediaItem,
        output_path: &Path,
        quality: DownloadQuality,
    ) -> Result<PathBuf, ProviderError> {
        self.downloads.write().await.push(RecordedDownload {
            item_id: item.id.clone(),
            output_path: output_path.to_path_buf(),
            quality,
        });

        if self.failing_downloads.read().await.contains(&item.id) {
            return Err(ProviderError::DownloadFailed {
                path: output_path.to_path_buf(),
                reason: "configured to fail".to_string(),
            });
        }

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, format!("mock media for {}", item.id)).await?;
        Ok(output_path.to_path_buf())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "mock",
            supported_formats: vec!["jpeg", "mp4"],
            supported_media_types: vec![
                MediaTypeFilter::Photo,
                MediaTypeFilter::Video,
                MediaTypeFilter::Both,
            ],
            max_per_page: 100,
            photo_filters: vec![],
            video_filters: vec![],
            video_qualities: vec!["best", "hd", "sd", "worst"],
            supports_get_item: true,
            requires_session: false,
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
