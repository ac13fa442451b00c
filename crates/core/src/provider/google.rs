//! Google Images/Videos scraping backend.
//!
//! Drives a real browser through WebDriver (fantoccini). Scraping is
//! inherently best-effort: when page markup drifts and nothing can be
//! extracted, searches return empty results rather than errors.

use async_trait::async_trait;
use fantoccini::{Client as BrowserClient, ClientBuilder, Locator};
use futures::StreamExt;
use image::DynamicImage;
use reqwest::Client;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::GoogleConfig;

use super::ytdlp::YtDlp;
use super::{
    Capabilities, DownloadQuality, DurationBucket, MediaItem, MediaProvider, MediaType,
    MediaTypeFilter, ProviderError, SearchFilters, SearchResult,
};

const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const THUMBNAIL_SELECTOR: &str = "div#search img[src], div#islrg img[src]";
const CANDIDATE_IMAGE_SCRIPT: &str = r#"
    return Array.from(document.querySelectorAll('img'))
        .filter(i => i.naturalWidth > 300)
        .map(i => i.src);
"#;
const VIDEO_ANCHOR_SCRIPT: &str = r#"
    return Array.from(document.querySelectorAll('a[href]'))
        .map(a => a.href)
        .filter(h => h.includes('youtube.com/watch') || h.includes('vimeo.com/'));
"#;

/// Google scraping backend.
///
/// Holds at most one WebDriver session, opened lazily on the first search
/// and reused until `close()`.
pub struct GoogleProvider {
    config: GoogleConfig,
    http: Client,
    session: Mutex<Option<BrowserClient>>,
    ytdlp: YtDlp,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Self {
        let ytdlp = YtDlp::new(config.yt_dlp_path.clone());
        Self {
            http: Client::new(),
            session: Mutex::new(None),
            ytdlp,
            config,
        }
    }

    /// Get the live browser session, connecting on first use.
    async fn browser(&self) -> Result<BrowserClient, ProviderError> {
        let mut session = self.session.lock().await;
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        info!(url = %self.config.webdriver_url, "Opening WebDriver session");

        let mut caps = serde_json::map::Map::new();
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--window-size=1920,1080".to_string(),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({ "args": args }),
        );

        let client = ClientBuilder::rustls()
            .map_err(|e| ProviderError::Session(e.to_string()))?
            .capabilities(caps)
            .connect(&self.config.webdriver_url)
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;

        *session = Some(client.clone());
        Ok(client)
    }

    /// Dismiss the consent interstitial if Google shows one.
    async fn dismiss_consent(&self, browser: &mut BrowserClient) {
        for selector in ["button#L2AGLb", "div[role='dialog'] button"] {
            if let Ok(button) = browser.find(Locator::Css(selector)).await {
                if button.click().await.is_ok() {
                    debug!(selector = selector, "Dismissed consent dialog");
                    sleep(Duration::from_millis(300)).await;
                }
                return;
            }
        }
    }

    /// Poll until at least one result thumbnail is present or the wait
    /// budget runs out.
    async fn wait_for_results(&self, browser: &mut BrowserClient) -> bool {
        let deadline = Instant::now() + Duration::from_secs(self.config.wait_timeout_secs);
        loop {
            match browser.find_all(Locator::Css(THUMBNAIL_SELECTOR)).await {
                Ok(elements) if !elements.is_empty() => return true,
                _ => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(RESULT_POLL_INTERVAL).await;
        }
    }

    async fn search_images(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        let mut browser = self.browser().await?;
        let url = build_image_search_url(query, filters);
        debug!(url = %url, "Navigating to image search");

        browser
            .goto(&url)
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;
        self.dismiss_consent(&mut browser).await;

        if !self.wait_for_results(&mut browser).await {
            warn!(query = query, "No image results appeared within the wait budget");
            return Ok(SearchResult::empty(page, per_page));
        }

        let wanted = per_page as usize;
        let mut urls: Vec<String> = Vec::new();
        let mut visited = 0usize;
        let mut miss_streak = 0u32;

        while urls.len() < wanted && miss_streak < self.config.max_miss_streak {
            let thumbnails = browser
                .find_all(Locator::Css(THUMBNAIL_SELECTOR))
                .await
                .map_err(|e| ProviderError::Session(e.to_string()))?;

            if visited >= thumbnails.len() {
                // Ran out of loaded thumbnails; scroll and try the
                // load-more button before giving up.
                let _ = browser
                    .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
                    .await;
                sleep(Duration::from_millis(800)).await;
                if let Ok(more) = browser.find(Locator::Css("input[type='button']")).await {
                    let _ = more.click().await;
                    sleep(Duration::from_millis(800)).await;
                }

                let reloaded = browser
                    .find_all(Locator::Css(THUMBNAIL_SELECTOR))
                    .await
                    .map_err(|e| ProviderError::Session(e.to_string()))?;
                if visited >= reloaded.len() {
                    debug!(visited = visited, "No further thumbnails loaded");
                    break;
                }
                continue;
            }

            let thumbnail = &thumbnails[visited];
            visited += 1;

            if thumbnail.click().await.is_err() {
                miss_streak += 1;
                continue;
            }
            sleep(Duration::from_millis(400)).await;

            let candidates = match browser.execute(CANDIDATE_IMAGE_SCRIPT, vec![]).await {
                Ok(value) => json_string_array(&value),
                Err(_) => Vec::new(),
            };

            match pick_image_candidate(&candidates, &self.config.watermark_domains) {
                Some(src) if !urls.contains(&src) => {
                    urls.push(src);
                    miss_streak = 0;
                }
                _ => miss_streak += 1,
            }
        }

        if miss_streak >= self.config.max_miss_streak {
            warn!(
                query = query,
                extracted = urls.len(),
                "Stopping image extraction after repeated misses"
            );
        }

        let items: Vec<MediaItem> = urls
            .into_iter()
            .map(|src| image_media_item(query, &src))
            .collect();
        let total = items.len() as u64;
        let has_next = page_has_next(items.len(), per_page);
        Ok(SearchResult {
            items,
            total_results: total,
            page,
            per_page,
            total_pages: if total > 0 { 1 } else { 0 },
            has_next,
        })
    }

    async fn search_videos(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        let mut browser = self.browser().await?;
        let url = build_video_search_url(query, filters);
        debug!(url = %url, "Navigating to video search");

        browser
            .goto(&url)
            .await
            .map_err(|e| ProviderError::Session(e.to_string()))?;
        self.dismiss_consent(&mut browser).await;

        if !self.wait_for_results(&mut browser).await {
            warn!(query = query, "No video results appeared within the wait budget");
            return Ok(SearchResult::empty(page, per_page));
        }

        let anchors = match browser.execute(VIDEO_ANCHOR_SCRIPT, vec![]).await {
            Ok(value) => json_string_array(&value),
            Err(_) => Vec::new(),
        };

        let mut items = Vec::new();
        let mut seen = Vec::new();
        for href in anchors {
            if items.len() >= per_page as usize {
                break;
            }
            let canonical = href.split('&').next().unwrap_or(&href).to_string();
            if seen.contains(&canonical) {
                continue;
            }
            seen.push(canonical.clone());

            // Probe is best-effort; an unprobeable link is still usable.
            let probe = self.ytdlp.probe(&canonical).await.ok();
            let duration = probe
                .as_ref()
                .and_then(|p| p.duration)
                .map(|d| d.round() as u32);

            if let Some(d) = duration {
                let limit = filters
                    .max_duration
                    .unwrap_or(self.config.max_video_duration_secs);
                if d > limit {
                    debug!(url = %canonical, duration = d, "Skipping over-length video");
                    continue;
                }
            }

            items.push(video_media_item(query, &canonical, probe.as_ref(), duration));
        }

        let total = items.len() as u64;
        let has_next = page_has_next(items.len(), per_page);
        Ok(SearchResult {
            items,
            total_results: total,
            page,
            per_page,
            total_pages: if total > 0 { 1 } else { 0 },
            has_next,
        })
    }

    /// Fetch a scraped image and normalize it to JPEG on disk.
    async fn download_image(
        &self,
        url: &str,
        output_path: &Path,
    ) -> Result<PathBuf, ProviderError> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: format!("image fetch of {} failed", url),
            });
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::DownloadFailed {
                path: output_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(ProviderError::DownloadFailed {
                path: output_path.to_path_buf(),
                reason: "empty response body".to_string(),
            });
        }

        let jpeg = normalize_to_jpeg(&bytes).map_err(|reason| ProviderError::DownloadFailed {
            path: output_path.to_path_buf(),
            reason,
        })?;

        let mut file = tokio::fs::File::create(output_path).await?;
        if let Err(e) = file.write_all(&jpeg).await {
            drop(file);
            let _ = tokio::fs::remove_file(output_path).await;
            return Err(ProviderError::DownloadFailed {
                path: output_path.to_path_buf(),
                reason: e.to_string(),
            });
        }
        file.flush().await?;

        debug!(path = %output_path.display(), bytes = jpeg.len(), "Image normalized to JPEG");
        Ok(output_path.to_path_buf())
    }
}

#[async_trait]
impl MediaProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> Result<SearchResult, ProviderError> {
        match filters.media_type {
            MediaTypeFilter::Photo => self.search_images(query, page, per_page, filters).await,
            MediaTypeFilter::Video => self.search_videos(query, page, per_page, filters).await,
            MediaTypeFilter::Both => {
                // Split the page budget; images absorb the odd slot.
                let video_count = per_page / 2;
                let image_count = per_page - video_count;

                let images = self
                    .search_images(query, page, image_count.max(1), filters)
                    .await?;
                let videos = self
                    .search_videos(query, page, video_count.max(1), filters)
                    .await?;

                let has_next = images.has_next || videos.has_next;
                let mut items = images.items;
                items.extend(videos.items);
                items.truncate(per_page as usize);
                let total = items.len() as u64;
                Ok(SearchResult {
                    items,
                    total_results: total,
                    page,
                    per_page,
                    total_pages: if total > 0 { 1 } else { 0 },
                    has_next,
                })
            }
        }
    }

    async fn get_item(&self, _item_id: &str) -> Result<MediaItem, ProviderError> {
        // Scraped items have no stable upstream identity to look up.
        Err(ProviderError::NotSupported {
            provider: "google",
            operation: "get_item",
        })
    }

    async fn download_item(
        &self,
        item: &MediaItem,
        output_path: &Path,
        quality: DownloadQuality,
    ) -> Result<PathBuf, ProviderError> {
        match item.media_type {
            MediaType::Photo => self.download_image(&item.download_url, output_path).await,
            MediaType::Video => {
                let max = Duration::from_secs(
                    (self.config.max_video_duration_secs as u64).max(60) * 2,
                );
                self.ytdlp
                    .download(&item.download_url, output_path, quality, max)
                    .await
            }
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "google",
            supported_formats: vec!["jpeg", "mp4"],
            supported_media_types: vec![
                MediaTypeFilter::Photo,
                MediaTypeFilter::Video,
                MediaTypeFilter::Both,
            ],
            max_per_page: 50,
            photo_filters: vec!["size", "color", "license"],
            video_filters: vec!["duration_bucket", "hd_only", "recent", "max_duration"],
            video_qualities: vec!["best", "hd", "sd", "worst"],
            supports_get_item: false,
            requires_session: true,
        }
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let mut session = self.session.lock().await;
        if let Some(client) = session.take() {
            info!("Closing WebDriver session");
            client
                .close()
                .await
                .map_err(|e| ProviderError::Session(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for GoogleProvider {
    fn drop(&mut self) {
        // Async close cannot run here; flag the leak instead.
        if let Ok(session) = self.session.try_lock() {
            if session.is_some() {
                warn!("GoogleProvider dropped with an open WebDriver session; call close()");
            }
        }
    }
}

/// Build the `tbm=isch` search URL with `tbs=` refinement tokens.
fn build_image_search_url(query: &str, filters: &SearchFilters) -> String {
    let mut tokens: Vec<String> = Vec::new();
    if let Some(size) = &filters.size {
        tokens.push(format!("isz:{}", size));
    }
    if let Some(color) = &filters.color {
        tokens.push(format!("ic:{}", color));
    }
    if let Some(license) = &filters.license {
        tokens.push(match license.as_str() {
            "commercial" => "sur:cl".to_string(),
            _ => "sur:ol".to_string(),
        });
    }

    let mut url = format!(
        "https://www.google.com/search?q={}&tbm=isch",
        urlencoding::encode(query)
    );
    if !tokens.is_empty() {
        url.push_str(&format!("&tbs={}", tokens.join(",")));
    }
    url
}

/// Build the `tbm=vid` search URL.
fn build_video_search_url(query: &str, filters: &SearchFilters) -> String {
    let mut tokens: Vec<String> = Vec::new();
    if let Some(bucket) = &filters.duration_bucket {
        tokens.push(match bucket {
            DurationBucket::Short => "dur:s".to_string(),
            DurationBucket::Medium => "dur:m".to_string(),
            DurationBucket::Long => "dur:l".to_string(),
        });
    }
    if filters.hd_only {
        tokens.push("hd:1".to_string());
    }
    if filters.recent {
        tokens.push("qdr:m".to_string());
    }

    let mut url = format!(
        "https://www.google.com/search?q={}&tbm=vid",
        urlencoding::encode(query)
    );
    if !tokens.is_empty() {
        url.push_str(&format!("&tbs={}", tokens.join(",")));
    }
    url
}

/// First candidate URL that is a plain fetchable image from a
/// non-watermarked host.
fn pick_image_candidate(candidates: &[String], watermark_domains: &[String]) -> Option<String> {
    candidates
        .iter()
        .find(|src| {
            src.starts_with("http")
                && !src.contains("encrypted")
                && !src.contains("gstatic.com")
                && !watermark_domains.iter().any(|d| src.contains(d.as_str()))
        })
        .cloned()
}

/// Extracting a full page suggests more results could be scraped.
fn page_has_next(extracted: usize, per_page: u32) -> bool {
    per_page > 0 && extracted >= per_page as usize
}

fn json_string_array(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn scraped_id(url: &str) -> String {
    format!("g{:x}", md5::compute(url.as_bytes()))
}

fn image_media_item(query: &str, src: &str) -> MediaItem {
    MediaItem {
        id: scraped_id(src),
        provider: "google".to_string(),
        url: src.to_string(),
        download_url: src.to_string(),
        title: query.to_string(),
        description: None,
        tags: Vec::new(),
        width: 0,
        height: 0,
        file_size: None,
        photographer: None,
        photographer_url: None,
        media_type: MediaType::Photo,
        duration: None,
        video_files: Vec::new(),
        preview_images: Vec::new(),
        thumbnail_url: None,
    }
}

fn video_media_item(
    query: &str,
    page_url: &str,
    probe: Option<&super::ytdlp::VideoProbe>,
    duration: Option<u32>,
) -> MediaItem {
    MediaItem {
        id: scraped_id(page_url),
        provider: "google".to_string(),
        url: page_url.to_string(),
        download_url: page_url.to_string(),
        title: probe
            .and_then(|p| p.title.clone())
            .unwrap_or_else(|| query.to_string()),
        description: None,
        tags: Vec::new(),
        width: probe.and_then(|p| p.width).unwrap_or(0),
        height: probe.and_then(|p| p.height).unwrap_or(0),
        file_size: None,
        photographer: probe.and_then(|p| p.uploader.clone()),
        photographer_url: None,
        media_type: MediaType::Video,
        duration,
        video_files: Vec::new(),
        preview_images: Vec::new(),
        thumbnail_url: probe.and_then(|p| p.thumbnail.clone()),
    }
}

/// Re-encode arbitrary image bytes as baseline JPEG.
///
/// Transparency is flattened onto white since JPEG has no alpha channel.
fn normalize_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;

    let rgb = match decoded {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => {
            let rgba = other.to_rgba8();
            let mut rgb = image::RgbImage::new(rgba.width(), rgba.height());
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let [r, g, b, a] = pixel.0;
                let alpha = a as u32;
                let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
                rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
            }
            rgb
        }
    };

    let mut out = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90);
    rgb.write_with_encoder(encoder).map_err(|e| e.to_string())?;
    Ok(out.into_inner())
}
