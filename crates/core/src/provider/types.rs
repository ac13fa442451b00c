//! Types for the media provider system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Kind of media asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Photo,
    Video,
}

/// One quality/format variant of a video asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoFile {
    /// Quality label as reported by the provider ("hd", "sd", "hls", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Container/MIME type (e.g. "video/mp4").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    /// Fetchable URL for this variant.
    pub link: String,
}

/// A media item from any provider.
///
/// `(provider, id)` is the stable identity used for cache addressing.
/// Collections default to empty so deserializing older cache entries
/// never produces missing-field errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    /// Provider-scoped identifier.
    pub id: String,
    /// Source provider tag ("pexels", "google").
    pub provider: String,
    /// Human-facing page URL.
    pub url: String,
    /// Fetchable asset URL. For the scraping provider this may be ephemeral.
    pub download_url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photographer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photographer_url: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
    /// Duration in seconds (videos only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Available quality variants (videos only).
    #[serde(default)]
    pub video_files: Vec<VideoFile>,
    /// Thumbnail URLs (videos only).
    #[serde(default)]
    pub preview_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A page of search results, in provider relevance order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub items: Vec<MediaItem>,
    /// Provider-reported total, or a best-effort count for scraping.
    pub total_results: u64,
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub has_next: bool,
}

impl SearchResult {
    /// An empty result page, used when scraping yields nothing extractable.
    pub fn empty(page: u32, per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            total_results: 0,
            page,
            per_page,
            total_pages: 0,
            has_next: false,
        }
    }
}

/// Which media types a search should return.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaTypeFilter {
    #[default]
    Photo,
    Video,
    Both,
}

/// Photo orientation filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Square => "square",
        }
    }
}

/// Video length bucket for the scraping provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DurationBucket {
    /// Under 4 minutes.
    Short,
    /// 4 to 20 minutes.
    Medium,
    /// Over 20 minutes.
    Long,
}

/// Search filters recognized across providers.
///
/// This is a closed structure: each provider consumes only the fields it
/// understands and ignores the rest, so unknown options are never forwarded
/// to an upstream API or encoded into a scrape URL.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SearchFilters {
    #[serde(default)]
    pub media_type: MediaTypeFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    /// Provider-specific size token ("large"/"medium"/"small" for Pexels,
    /// "s".."h" codes for Google Images).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    /// Minimum video duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<u32>,
    /// Maximum video duration in seconds; also the b-roll guard for scraped
    /// video results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
    /// License token for the scraping provider ("commercial"/"noncommercial").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_bucket: Option<DurationBucket>,
    /// Restrict scraped video results to HD.
    #[serde(default)]
    pub hd_only: bool,
    /// Restrict scraped video results to the past month.
    #[serde(default)]
    pub recent: bool,
}

impl SearchFilters {
    pub fn photos() -> Self {
        Self::default()
    }

    pub fn videos() -> Self {
        Self {
            media_type: MediaTypeFilter::Video,
            ..Self::default()
        }
    }
}

/// Requested download quality for video assets; doubles as the size
/// component of file cache keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadQuality {
    #[default]
    Best,
    Hd,
    Sd,
    Worst,
}

impl DownloadQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Hd => "hd",
            Self::Sd => "sd",
            Self::Worst => "worst",
        }
    }
}

/// Static description of what a provider can do.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub name: &'static str,
    pub supported_formats: Vec<&'static str>,
    pub supported_media_types: Vec<MediaTypeFilter>,
    pub max_per_page: u32,
    /// Filter fields the photo search recognizes.
    pub photo_filters: Vec<&'static str>,
    /// Filter fields the video search recognizes.
    pub video_filters: Vec<&'static str>,
    pub video_qualities: Vec<&'static str>,
    /// Whether `get_item` works (false for scraping backends).
    pub supports_get_item: bool,
    /// Whether the provider holds a session that must be closed.
    pub requires_session: bool,
}

/// Errors that can occur during provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, DNS, reset). Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Request or automation wait timed out. Retryable.
    #[error("Request timeout")]
    Timeout,

    /// Upstream returned an HTTP error status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Every credential has hit its per-window call limit. Terminal.
    #[error("All API credentials are exhausted for the current window")]
    CredentialsExhausted,

    /// Credential rejected by the upstream API. Terminal.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The item does not exist at the provider. Terminal.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Operation not supported by the active provider. Terminal, and
    /// distinct from "not found".
    #[error("Operation not supported by provider {provider}: {operation}")]
    NotSupported {
        provider: &'static str,
        operation: &'static str,
    },

    /// The request itself was malformed. Terminal.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Download produced no usable output; any partial file has been removed.
    #[error("Download failed for {path}: {reason}")]
    DownloadFailed { path: PathBuf, reason: String },

    /// Upstream response could not be parsed.
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    /// Browser automation session failure.
    #[error("Automation session error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether the retry policy should attempt this call again.
    ///
    /// Transport failures, timeouts, 5xx and 429 are transient; everything
    /// else aborts immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Map a reqwest error onto the taxonomy.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Network(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Trait for media acquisition backends.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Provider name for logging and cache addressing.
    fn name(&self) -> &str;

    /// Search for media items.
    async fn search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError>;

    /// Fetch a single item by provider-scoped ID.
    async fn get_item(&self, item_id: &str) -> Result<MediaItem, ProviderError>;

    /// Download an item to `output_path`, returning the final path.
    async fn download_item(
        &self,
        item: &MediaItem,
        output_path: &Path,
        quality: DownloadQuality,
    ) -> Result<PathBuf, ProviderError>;

    /// Static capability description.
    fn capabilities(&self) -> Capabilities;

    /// Release any session resource. Safe to call more than once.
    async fn close(&self) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_item_defaults_on_deserialize() {
        let json = r#"{
            "id": "123",
            "provider": "pexels",
            "url": "https://example.com/photo/123",
            "download_url": "https://example.com/photo/123.jpg",
            "title": "A photo"
        }"#;
        let item: MediaItem = serde_json::from_str(json).unwrap();

        assert!(item.tags.is_empty());
        assert!(item.video_files.is_empty());
        assert!(item.preview_images.is_empty());
        assert_eq!(item.media_type, MediaType::Photo);
        assert!(item.duration.is_none());
    }

    #[test]
    fn test_media_item_roundtrip() {
        let item = MediaItem {
            id: "v42".to_string(),
            provider: "pexels".to_string(),
            url: "https://example.com/video/42".to_string(),
            download_url: "https://cdn.example.com/42-hd.mp4".to_string(),
            title: "Video by Someone".to_string(),
            description: Some("Duration: 12s".to_string()),
            tags: vec!["mountain".to_string()],
            width: 1920,
            height: 1080,
            file_size: None,
            photographer: Some("Someone".to_string()),
            photographer_url: None,
            media_type: MediaType::Video,
            duration: Some(12),
            video_files: vec![VideoFile {
                quality: Some("hd".to_string()),
                file_type: Some("video/mp4".to_string()),
                width: Some(1920),
                height: Some(1080),
                fps: Some(30.0),
                link: "https://cdn.example.com/42-hd.mp4".to_string(),
            }],
            preview_images: vec!["https://cdn.example.com/42.jpg".to_string()],
            thumbnail_url: Some("https://cdn.example.com/42.jpg".to_string()),
        };

        let json = serde_json::to_string(&item).unwrap();
        let parsed: MediaItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_search_filters_serialization_is_deterministic() {
        let filters = SearchFilters {
            media_type: MediaTypeFilter::Both,
            orientation: Some(Orientation::Landscape),
            color: Some("blue".to_string()),
            ..SearchFilters::default()
        };

        // Struct fields serialize in declaration order, so the JSON form is
        // a stable cache signature component.
        let a = serde_json::to_string(&filters).unwrap();
        let b = serde_json::to_string(&filters).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"media_type\":\"both\""));
    }

    #[test]
    fn test_error_retryability() {
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(ProviderError::Http {
            status: 429,
            body: String::new()
        }
        .is_retryable());

        assert!(!ProviderError::Http {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::CredentialsExhausted.is_retryable());
        assert!(!ProviderError::AuthFailed("bad key".into()).is_retryable());
        assert!(!ProviderError::NotSupported {
            provider: "google",
            operation: "get_item"
        }
        .is_retryable());
    }

    #[test]
    fn test_download_quality_as_str() {
        assert_eq!(DownloadQuality::Best.as_str(), "best");
        assert_eq!(DownloadQuality::Worst.as_str(), "worst");
        assert_eq!(DownloadQuality::default(), DownloadQuality::Best);
    }
}
