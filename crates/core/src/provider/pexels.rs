//! Pexels API backend implementation.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::PexelsConfig;

use super::key_rotation::{KeyRotationManager, KeyUsageStats};
use super::retry::RetryPolicy;
use super::{
    Capabilities, DownloadQuality, MediaItem, MediaProvider, MediaType, MediaTypeFilter,
    ProviderError, SearchFilters, SearchResult, VideoFile,
};

const PHOTO_API_BASE: &str = "https://api.pexels.com/v1";
const VIDEO_API_BASE: &str = "https://api.pexels.com/videos";

/// Pexels API backend.
///
/// Photo and video searches hit separate endpoints; a "both" search splits
/// the page budget between them. Every request consumes one call on a
/// rotated API key.
pub struct PexelsProvider {
    client: Client,
    config: PexelsConfig,
    keys: Mutex<KeyRotationManager>,
    retry: RetryPolicy,
}

impl PexelsProvider {
    /// Create a new PexelsProvider with the given configuration.
    pub fn new(config: PexelsConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {}", e)))?;

        let keys = KeyRotationManager::new(
            config.api_keys.clone(),
            config.max_calls,
            Duration::from_secs(config.window_secs),
        )?;

        let retry = RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.backoff_multiplier,
        );

        Ok(Self {
            client,
            config,
            keys: Mutex::new(keys),
            retry,
        })
    }

    /// Per-key usage snapshot, keys redacted to suffixes.
    pub async fn usage_stats(&self) -> Vec<KeyUsageStats> {
        self.keys.lock().await.usage_stats()
    }

    /// One authenticated GET with key rotation, retry, and typed decoding.
    ///
    /// A fresh key is drawn per attempt so a rate-limited key does not get
    /// hammered across retries.
    async fn api_get<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        url: &str,
    ) -> Result<T, ProviderError> {
        if self.config.request_delay_ms > 0 {
            sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }

        self.retry
            .run(operation, || async {
                let key = self.keys.lock().await.get_next_key()?;
                debug!(operation = operation, url = url, "Pexels API request");

                let response = self
                    .client
                    .get(url)
                    .header("Authorization", &key)
                    .send()
                    .await
                    .map_err(ProviderError::from_reqwest)?;

                let status = response.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    return Err(ProviderError::AuthFailed(format!(
                        "key rejected with HTTP {}",
                        status.as_u16()
                    )));
                }
                if status.as_u16() == 404 {
                    return Err(ProviderError::NotFound(url.to_string()));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Http {
                        status: status.as_u16(),
                        body: body.chars().take(200).collect(),
                    });
                }

                response
                    .json::<T>()
                    .await
                    .map_err(|e| ProviderError::ParseError(e.to_string()))
            })
            .await
    }

    fn build_photo_search_url(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> String {
        let mut url = format!(
            "{}/search?query={}&page={}&per_page={}",
            PHOTO_API_BASE,
            urlencoding::encode(query),
            page.max(1),
            per_page.clamp(1, 80)
        );
        if let Some(orientation) = &filters.orientation {
            url.push_str(&format!("&orientation={}", orientation.as_str()));
        }
        if let Some(size) = &filters.size {
            url.push_str(&format!("&size={}", urlencoding::encode(size)));
        }
        if let Some(color) = &filters.color {
            url.push_str(&format!("&color={}", urlencoding::encode(color)));
        }
        if let Some(locale) = &filters.locale {
            url.push_str(&format!("&locale={}", urlencoding::encode(locale)));
        }
        url
    }

    fn build_video_search_url(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> String {
        let mut url = format!(
            "{}/search?query={}&page={}&per_page={}",
            VIDEO_API_BASE,
            urlencoding::encode(query),
            page.max(1),
            per_page.clamp(1, 80)
        );
        if let Some(orientation) = &filters.orientation {
            url.push_str(&format!("&orientation={}", orientation.as_str()));
        }
        if let Some(size) = &filters.size {
            url.push_str(&format!("&size={}", urlencoding::encode(size)));
        }
        if let Some(min_width) = filters.min_width {
            url.push_str(&format!("&min_width={}", min_width));
        }
        if let Some(min_height) = filters.min_height {
            url.push_str(&format!("&min_height={}", min_height));
        }
        if let Some(min_duration) = filters.min_duration {
            url.push_str(&format!("&min_duration={}", min_duration));
        }
        if let Some(max_duration) = filters.max_duration {
            url.push_str(&format!("&max_duration={}", max_duration));
        }
        url
    }

    async fn search_photos(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        let url = self.build_photo_search_url(query, page, per_page, filters);
        let response: PhotoSearchResponse = self.api_get("pexels_photo_search", &url).await?;

        let items = response
            .photos
            .into_iter()
            .map(photo_to_media_item)
            .collect();
        Ok(page_result(
            items,
            response.total_results,
            page,
            per_page,
            response.next_page.is_some(),
        ))
    }

    async fn search_videos(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        let url = self.build_video_search_url(query, page, per_page, filters);
        let response: VideoSearchResponse = self.api_get("pexels_video_search", &url).await?;

        let items = response
            .videos
            .into_iter()
            .map(video_to_media_item)
            .collect();
        Ok(page_result(
            items,
            response.total_results,
            page,
            per_page,
            response.next_page.is_some(),
        ))
    }

    async fn download_url_to_file(
        &self,
        url: &str,
        output_path: &Path,
    ) -> Result<PathBuf, ProviderError> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: format!("download of {} failed", url),
            });
        }

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    // Never leave a truncated asset behind.
                    drop(file);
                    let _ = tokio::fs::remove_file(output_path).await;
                    return Err(ProviderError::DownloadFailed {
                        path: output_path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            };
            written += chunk.len() as u64;
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                let _ = tokio::fs::remove_file(output_path).await;
                return Err(ProviderError::DownloadFailed {
                    path: output_path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
        file.flush().await?;

        debug!(path = %output_path.display(), bytes = written, "Download complete");
        Ok(output_path.to_path_buf())
    }
}

#[async_trait]
impl MediaProvider for PexelsProvider {
    fn name(&self) -> &str {
        "pexels"
    }

    async fn search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        match filters.media_type {
            MediaTypeFilter::Photo => self.search_photos(query, page, per_page, filters).await,
            MediaTypeFilter::Video => self.search_videos(query, page, per_page, filters).await,
            MediaTypeFilter::Both => {
                // Split the page budget; photos absorb the odd slot.
                let video_count = per_page / 2;
                let photo_count = per_page - video_count;

                let photos = self
                    .search_photos(query, page, photo_count.max(1), filters)
                    .await?;
                let videos = self
                    .search_videos(query, page, video_count.max(1), filters)
                    .await?;

                let mut items = photos.items;
                items.extend(videos.items);
                items.truncate(per_page as usize);
                Ok(SearchResult {
                    items,
                    total_results: photos.total_results + videos.total_results,
                    page,
                    per_page,
                    total_pages: 0,
                    has_next: photos.has_next || videos.has_next,
                })
            }
        }
    }

    async fn get_item(&self, item_id: &str) -> Result<MediaItem, ProviderError> {
        // IDs do not encode their media type; try the photo endpoint first
        // and fall through to videos on a miss.
        let photo_url = format!("{}/photos/{}", PHOTO_API_BASE, urlencoding::encode(item_id));
        match self.api_get::<PexelsPhoto>("pexels_get_photo", &photo_url).await {
            Ok(photo) => Ok(photo_to_media_item(photo)),
            Err(ProviderError::NotFound(_)) => {
                let video_url =
                    format!("{}/videos/{}", VIDEO_API_BASE, urlencoding::encode(item_id));
                match self.api_get::<PexelsVideo>("pexels_get_video", &video_url).await {
                    Ok(video) => Ok(video_to_media_item(video)),
                    Err(ProviderError::NotFound(_)) => {
                        Err(ProviderError::NotFound(item_id.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn download_item(
        &self,
        item: &MediaItem,
        output_path: &Path,
        quality: DownloadQuality,
    ) -> Result<PathBuf, ProviderError> {
        let url = match item.media_type {
            MediaType::Photo => item.download_url.clone(),
            MediaType::Video => select_video_file(&item.video_files, quality)
                .map(|f| f.link.clone())
                .unwrap_or_else(|| item.download_url.clone()),
        };

        if url.is_empty() {
            return Err(ProviderError::DownloadFailed {
                path: output_path.to_path_buf(),
                reason: format!("item {} has no downloadable URL", item.id),
            });
        }

        self.download_url_to_file(&url, output_path).await
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "pexels",
            supported_formats: vec!["jpeg", "mp4"],
            supported_media_types: vec![
                MediaTypeFilter::Photo,
                MediaTypeFilter::Video,
                MediaTypeFilter::Both,
            ],
            max_per_page: 80,
            photo_filters: vec!["orientation", "size", "color", "locale"],
            video_filters: vec![
                "orientation",
                "size",
                "min_width",
                "min_height",
                "min_duration",
                "max_duration",
            ],
            video_qualities: vec!["best", "hd", "sd", "worst"],
            supports_get_item: true,
            requires_session: false,
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        // Stateless HTTP client; nothing to release.
        Ok(())
    }
}

/// Pick a video variant for the requested quality.
///
/// `best`/`hd` prefer hd > sd > hls; `worst`/`sd` prefer sd > hd > hls.
/// Within a quality label, the larger frame wins for best/hd and the
/// smaller one for sd/worst.
fn select_video_file(files: &[VideoFile], quality: DownloadQuality) -> Option<&VideoFile> {
    if files.is_empty() {
        return None;
    }

    let preference: [&str; 3] = match quality {
        DownloadQuality::Best | DownloadQuality::Hd => ["hd", "sd", "hls"],
        DownloadQuality::Sd | DownloadQuality::Worst => ["sd", "hd", "hls"],
    };
    let prefer_large = matches!(quality, DownloadQuality::Best | DownloadQuality::Hd);

    for label in preference {
        let mut candidates: Vec<&VideoFile> = files
            .iter()
            .filter(|f| f.quality.as_deref() == Some(label))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        candidates.sort_by_key(|f| f.width.unwrap_or(0) as u64 * f.height.unwrap_or(0) as u64);
        return if prefer_large {
            candidates.last().copied()
        } else {
            candidates.first().copied()
        };
    }

    warn!("No preferred quality label matched, falling back to first variant");
    files.first()
}

fn page_result(
    items: Vec<MediaItem>,
    total_results: u64,
    page: u32,
    per_page: u32,
    has_next: bool,
) -> SearchResult {
    let total_pages = if per_page > 0 {
        total_results.div_ceil(per_page as u64) as u32
    } else {
        0
    };
    SearchResult {
        items,
        total_results,
        page,
        per_page,
        total_pages,
        has_next,
    }
}

// Wire types for the Pexels API.

#[derive(Debug, Deserialize)]
struct PhotoSearchResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoSearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    id: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    url: String,
    #[serde(default)]
    photographer: Option<String>,
    #[serde(default)]
    photographer_url: Option<String>,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    src: PhotoSources,
}

#[derive(Debug, Default, Deserialize)]
struct PhotoSources {
    #[serde(default)]
    original: Option<String>,
    #[serde(default)]
    large2x: Option<String>,
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    medium: Option<String>,
    #[serde(default)]
    tiny: Option<String>,
}

impl PhotoSources {
    /// Largest available rendition.
    fn best(&self) -> String {
        self.original
            .clone()
            .or_else(|| self.large2x.clone())
            .or_else(|| self.large.clone())
            .or_else(|| self.medium.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    url: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default)]
    user: Option<PexelsUser>,
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
    #[serde(default)]
    video_pictures: Vec<PexelsVideoPicture>,
}

#[derive(Debug, Deserialize)]
struct PexelsUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    fps: Option<f32>,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoPicture {
    #[serde(default)]
    picture: String,
}

fn photo_to_media_item(photo: PexelsPhoto) -> MediaItem {
    let download_url = photo.src.best();
    MediaItem {
        id: photo.id.to_string(),
        provider: "pexels".to_string(),
        url: photo.url,
        download_url,
        title: photo
            .alt
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| format!("Photo {}", photo.id)),
        description: photo.alt,
        tags: Vec::new(),
        width: photo.width,
        height: photo.height,
        file_size: None,
        photographer: photo.photographer,
        photographer_url: photo.photographer_url,
        media_type: MediaType::Photo,
        duration: None,
        video_files: Vec::new(),
        preview_images: Vec::new(),
        thumbnail_url: photo.src.tiny,
    }
}

fn video_to_media_item(video: PexelsVideo) -> MediaItem {
    let video_files: Vec<VideoFile> = video
        .video_files
        .into_iter()
        .map(|f| VideoFile {
            quality: f.quality,
            file_type: f.file_type,
            width: f.width,
            height: f.height,
            fps: f.fps,
            link: f.link,
        })
        .collect();

    let download_url = select_video_file(&video_files, DownloadQuality::Best)
        .map(|f| f.link.clone())
        .unwrap_or_default();

    let photographer = video.user.as_ref().and_then(|u| u.name.clone());
    MediaItem {
        id: video.id.to_string(),
        provider: "pexels".to_string(),
        url: video.url,
        download_url,
        title: photographer
            .as_ref()
            .map(|n| format!("Video by {}", n))
            .unwrap_or_else(|| format!("Video {}", video.id)),
        description: video.duration.map(|d| format!("Duration: {}s", d)),
        tags: Vec::new(),
        width: video.width,
        height: video.height,
        file_size: None,
        photographer,
        photographer_url: video.user.and_then(|u| u.url),
        media_type: MediaType::Video,
        duration: video.duration,
        video_files,
        preview_images: video
            .video_pictures
            .into_iter()
            .map(|p| p.picture)
            .collect(),
        thumbnail_url: video.image,
    }
}
