//! Acquisition lifecycle integration tests.
//!
//! These tests verify the complete flow through the orchestrator:
//! search -> cache write-through -> cached reads -> download -> cleanup.

use std::sync::Arc;

use tempfile::TempDir;

use clipstock_core::{
    cache::MediaCache,
    config::CacheConfig,
    testing::{fixtures, MockProvider},
    DownloadQuality, MediaOrchestrator, SearchFilters,
};

/// Test helper bundling a mock provider, a real cache, and the orchestrator.
struct TestHarness {
    provider: Arc<MockProvider>,
    orchestrator: MediaOrchestrator,
    _temp_dir: TempDir,
}

impl TestHarness {
    async fn new(ttl_hours: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cache_config = CacheConfig {
            dir: temp_dir.path().join("cache"),
            ttl_hours,
            enabled: true,
        };
        let cache = MediaCache::new(&cache_config)
            .await
            .expect("Failed to create cache");

        let provider = Arc::new(MockProvider::new());
        let orchestrator = MediaOrchestrator::with_provider(provider.clone(), Some(cache));

        Self {
            provider,
            orchestrator,
            _temp_dir: temp_dir,
        }
    }

    async fn without_cache() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let provider = Arc::new(MockProvider::new());
        let orchestrator = MediaOrchestrator::with_provider(provider.clone(), None);
        Self {
            provider,
            orchestrator,
            _temp_dir: temp_dir,
        }
    }
}

#[tokio::test]
async fn test_search_writes_through_page_and_items() {
    let harness = TestHarness::new(24).await;
    harness
        .provider
        .set_items(vec![
            fixtures::photo_item("mock", "1"),
            fixtures::photo_item("mock", "2"),
            fixtures::video_item("mock", "3"),
        ])
        .await;

    let filters = SearchFilters::photos();
    let result = harness
        .orchestrator
        .search("forest", 1, 10, &filters, true)
        .await
        .unwrap();
    assert_eq!(result.items.len(), 3);

    // One search entry plus one metadata entry per item.
    let stats = harness.orchestrator.cache_stats().await.unwrap().unwrap();
    assert_eq!(stats.search_entries, 1);
    assert_eq!(stats.metadata_entries, 3);

    // Every item is individually readable from the metadata namespace.
    let item = harness.orchestrator.get("2", true).await.unwrap();
    assert_eq!(item.id, "2");
    // The lookup above was served from cache, not the provider.
    assert_eq!(harness.provider.search_count().await, 1);
}

#[tokio::test]
async fn test_repeat_search_served_from_cache() {
    let harness = TestHarness::new(24).await;
    harness
        .provider
        .set_items(vec![fixtures::photo_item("mock", "1")])
        .await;

    let filters = SearchFilters::photos();
    let first = harness
        .orchestrator
        .search("forest", 1, 10, &filters, true)
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .search("forest", 1, 10, &filters, true)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.provider.search_count().await, 1);
}

#[tokio::test]
async fn test_use_cache_false_always_hits_provider() {
    let harness = TestHarness::new(24).await;
    harness
        .provider
        .set_items(vec![fixtures::photo_item("mock", "1")])
        .await;

    let filters = SearchFilters::photos();
    harness
        .orchestrator
        .search("forest", 1, 10, &filters, true)
        .await
        .unwrap();
    harness
        .orchestrator
        .search("forest", 1, 10, &filters, false)
        .await
        .unwrap();

    assert_eq!(harness.provider.search_count().await, 2);
}

#[tokio::test]
async fn test_zero_ttl_never_reuses_entries() {
    let harness = TestHarness::new(0).await;
    harness
        .provider
        .set_items(vec![fixtures::photo_item("mock", "1")])
        .await;

    let filters = SearchFilters::photos();
    harness
        .orchestrator
        .search("forest", 1, 10, &filters, true)
        .await
        .unwrap();
    harness
        .orchestrator
        .search("forest", 1, 10, &filters, true)
        .await
        .unwrap();

    // Entries are written but instantly expired.
    assert_eq!(harness.provider.search_count().await, 2);
}

#[tokio::test]
async fn test_download_lands_in_cache_and_short_circuits() {
    let harness = TestHarness::new(24).await;
    let item = fixtures::photo_item("mock", "42");
    harness.provider.set_items(vec![item.clone()]).await;

    let first = harness
        .orchestrator
        .download(&item, DownloadQuality::Best, None, true)
        .await
        .unwrap();
    assert!(first.exists());

    let second = harness
        .orchestrator
        .download(&item, DownloadQuality::Best, None, true)
        .await
        .unwrap();
    assert_eq!(first, second);

    // Second call was a file-cache hit.
    assert_eq!(harness.provider.recorded_downloads().await.len(), 1);
}

#[tokio::test]
async fn test_download_custom_path_served_from_file_cache() {
    let harness = TestHarness::new(24).await;
    let item = fixtures::photo_item("mock", "42");

    // Populate the file cache.
    let cached = harness
        .orchestrator
        .download(&item, DownloadQuality::Best, None, true)
        .await
        .unwrap();

    // A custom destination is filled by copying the valid cached file;
    // the provider is not invoked a second time.
    let target = harness._temp_dir.path().join("out").join("custom.jpg");
    let written = harness
        .orchestrator
        .download(&item, DownloadQuality::Best, Some(&target), true)
        .await
        .unwrap();

    assert_eq!(written, target);
    assert!(target.exists());
    assert_eq!(harness.provider.recorded_downloads().await.len(), 1);
    assert_eq!(
        tokio::fs::read(&cached).await.unwrap(),
        tokio::fs::read(&target).await.unwrap()
    );
}

#[tokio::test]
async fn test_download_custom_path_without_cache_entry_hits_provider() {
    let harness = TestHarness::new(24).await;
    let item = fixtures::photo_item("mock", "42");

    let target = harness._temp_dir.path().join("out").join("custom.jpg");
    let written = harness
        .orchestrator
        .download(&item, DownloadQuality::Best, Some(&target), true)
        .await
        .unwrap();
    assert_eq!(written, target);
    assert!(target.exists());
    assert_eq!(harness.provider.recorded_downloads().await.len(), 1);
}

#[tokio::test]
async fn test_download_use_cache_false_ignores_cached_file() {
    let harness = TestHarness::new(24).await;
    let item = fixtures::photo_item("mock", "42");

    harness
        .orchestrator
        .download(&item, DownloadQuality::Best, None, true)
        .await
        .unwrap();

    let target = harness._temp_dir.path().join("fresh.jpg");
    harness
        .orchestrator
        .download(&item, DownloadQuality::Best, Some(&target), false)
        .await
        .unwrap();

    assert_eq!(harness.provider.recorded_downloads().await.len(), 2);
}

#[tokio::test]
async fn test_download_without_cache_requires_path() {
    let harness = TestHarness::without_cache().await;
    let item = fixtures::photo_item("mock", "42");

    let result = harness
        .orchestrator
        .download(&item, DownloadQuality::Best, None, true)
        .await;
    assert!(result.is_err());

    let target = harness._temp_dir.path().join("explicit.jpg");
    assert!(harness
        .orchestrator
        .download(&item, DownloadQuality::Best, Some(&target), true)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_search_and_download_respects_count_and_isolates_failures() {
    let harness = TestHarness::new(24).await;
    harness
        .provider
        .set_items(vec![
            fixtures::photo_item("mock", "1"),
            fixtures::photo_item("mock", "2"),
            fixtures::photo_item("mock", "3"),
        ])
        .await;
    harness.provider.fail_download("2").await;

    let paths = harness
        .orchestrator
        .search_and_download(
            "forest",
            3,
            &SearchFilters::photos(),
            DownloadQuality::Best,
            None,
            true,
        )
        .await
        .unwrap();

    // Item 2 failed and was skipped; the batch still completed.
    assert_eq!(paths.len(), 2);
    assert_eq!(harness.provider.recorded_downloads().await.len(), 3);
}

#[tokio::test]
async fn test_search_and_download_into_directory() {
    let harness = TestHarness::new(24).await;
    harness
        .provider
        .set_items(vec![
            fixtures::photo_item("mock", "1"),
            fixtures::photo_item("mock", "2"),
        ])
        .await;

    let out_dir = harness._temp_dir.path().join("results");
    let paths = harness
        .orchestrator
        .search_and_download(
            "forest",
            2,
            &SearchFilters::photos(),
            DownloadQuality::Best,
            Some(&out_dir),
            true,
        )
        .await
        .unwrap();

    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.starts_with(&out_dir) && p.exists()));
}

#[tokio::test]
async fn test_bulk_download_sanitizes_names_and_skips_failures() {
    let harness = TestHarness::new(24).await;
    let mut good = fixtures::photo_item("mock", "1");
    good.title = "Misty forest / at dawn!".to_string();
    let bad = fixtures::photo_item("mock", "2");
    harness.provider.fail_download("2").await;

    let out_dir = harness._temp_dir.path().join("bulk");
    let paths = harness
        .orchestrator
        .bulk_download(&[good, bad], &out_dir, DownloadQuality::Best)
        .await
        .unwrap();

    assert_eq!(paths.len(), 1);
    let name = paths[0].file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(name, "mock_1_Misty_forest_at_dawn.jpg");
    assert!(paths[0].exists());
}

#[tokio::test]
async fn test_bulk_download_reuses_cached_files() {
    let harness = TestHarness::new(24).await;
    let item = fixtures::photo_item("mock", "1");

    // Populate the file cache, then batch into a directory.
    harness
        .orchestrator
        .download(&item, DownloadQuality::Best, None, true)
        .await
        .unwrap();

    let out_dir = harness._temp_dir.path().join("bulk");
    let paths = harness
        .orchestrator
        .bulk_download(&[item], &out_dir, DownloadQuality::Best)
        .await
        .unwrap();

    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with(&out_dir));
    assert!(paths[0].exists());
    // The batch was served from the file cache, not the provider.
    assert_eq!(harness.provider.recorded_downloads().await.len(), 1);
}

#[tokio::test]
async fn test_provider_error_surfaces_from_search() {
    let harness = TestHarness::new(24).await;
    harness
        .provider
        .set_next_error(clipstock_core::ProviderError::CredentialsExhausted)
        .await;

    let result = harness
        .orchestrator
        .search("forest", 1, 10, &SearchFilters::photos(), true)
        .await;
    assert!(matches!(
        result,
        Err(clipstock_core::ProviderError::CredentialsExhausted)
    ));
}

#[tokio::test]
async fn test_cleanup_reports_expired_entries() {
    let harness = TestHarness::new(0).await;
    harness
        .provider
        .set_items(vec![fixtures::photo_item("mock", "1")])
        .await;
    harness
        .orchestrator
        .search("forest", 1, 10, &SearchFilters::photos(), true)
        .await
        .unwrap();

    let report = harness.orchestrator.cache_cleanup().await.unwrap().unwrap();
    // Search entry plus item metadata, all expired under ttl 0.
    assert_eq!(report.removed_entries, 2);
}

#[tokio::test]
async fn test_close_is_idempotent_and_reaches_provider() {
    let harness = TestHarness::new(24).await;
    assert!(!harness.provider.is_closed());

    harness.orchestrator.close().await.unwrap();
    assert!(harness.provider.is_closed());
    harness.orchestrator.close().await.unwrap();
}

#[tokio::test]
async fn test_usage_stats_absent_for_non_pexels_provider() {
    let harness = TestHarness::new(24).await;
    assert!(harness.orchestrator.usage_stats().await.is_none());
}
