//! Testing utilities and mock implementations.
//!
//! Provides a mock `MediaProvider` so orchestrator and cache behavior can
//! be exercised without real network or browser infrastructure.

mod mock_provider;

pub use mock_provider::{MockProvider, RecordedDownload, RecordedSearch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::provider::{MediaItem, MediaType, SearchResult, VideoFile};

    /// A photo item with sensible defaults.
    pub fn photo_item(provider: &str, id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            provider: provider.to_string(),
            url: format!("https://example.com/photo/{}", id),
            download_url: format!("https://cdn.example.com/{}.jpg", id),
            title: format!("Photo {}", id),
            description: None,
            tags: vec!["test".to_string()],
            width: 4000,
            height: 3000,
            file_size: None,
            photographer: Some("Test Photographer".to_string()),
            photographer_url: None,
            media_type: MediaType::Photo,
            duration: None,
            video_files: Vec::new(),
            preview_images: Vec::new(),
            thumbnail_url: Some(format!("https://cdn.example.com/{}-tiny.jpg", id)),
        }
    }

    /// A video item with one HD and one SD variant.
    pub fn video_item(provider: &str, id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            provider: provider.to_string(),
            url: format!("https://example.com/video/{}", id),
            download_url: format!("https://cdn.example.com/{}-hd.mp4", id),
            title: format!("Video {}", id),
            description: Some("Duration: 12s".to_string()),
            tags: Vec::new(),
            width: 1920,
            height: 1080,
            file_size: None,
            photographer: Some("Test Videographer".to_string()),
            photographer_url: None,
            media_type: MediaType::Video,
            duration: Some(12),
            video_files: vec![
                VideoFile {
                    quality: Some("hd".to_string()),
                    file_type: Some("video/mp4".to_string()),
                    width: Some(1920),
                    height: Some(1080),
                    fps: Some(30.0),
                    link: format!("https://cdn.example.com/{}-hd.mp4", id),
                },
                VideoFile {
                    quality: Some("sd".to_string()),
                    file_type: Some("video/mp4".to_string()),
                    width: Some(640),
                    height: Some(360),
                    fps: Some(30.0),
                    link: format!("https://cdn.example.com/{}-sd.mp4", id),
                },
            ],
            preview_images: vec![format!("https://cdn.example.com/{}-p0.jpg", id)],
            thumbnail_url: Some(format!("https://cdn.example.com/{}-thumb.jpg", id)),
        }
    }

    /// A one-page search result over the given items.
    pub fn search_result(items: Vec<MediaItem>, page: u32, per_page: u32) -> SearchResult {
        let total = items.len() as u64;
        SearchResult {
            items,
            total_results: total,
            page,
            per_page,
            total_pages: 1,
            has_next: false,
        }
    }
}
