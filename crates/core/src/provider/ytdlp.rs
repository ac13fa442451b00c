//! yt-dlp subprocess wrapper for scraped video probing and download.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::{DownloadQuality, ProviderError};

/// Metadata extracted by `yt-dlp --dump-json` without downloading.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoProbe {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Duration in seconds; fractional for some extractors.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
}

/// Thin wrapper around a yt-dlp binary.
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe a video URL for metadata without downloading it.
    pub async fn probe(&self, url: &str) -> Result<VideoProbe, ProviderError> {
        let output = Command::new(&self.binary)
            .arg("--dump-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg(url)
            .output()
            .await
            .map_err(|e| {
                ProviderError::Session(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::ParseError(format!(
                "probe failed for {}: {}",
                url,
                stderr.chars().take(200).collect::<String>()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ProviderError::ParseError(format!("invalid probe output: {}", e)))
    }

    /// Download a video to `output_path`, bounded by `max_duration`.
    ///
    /// yt-dlp may append its own extension when the requested one does not
    /// match the delivered container, so the actually-written path is
    /// resolved and returned.
    pub async fn download(
        &self,
        url: &str,
        output_path: &Path,
        quality: DownloadQuality,
        max_duration: Duration,
    ) -> Result<PathBuf, ProviderError> {
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(url = url, output = %output_path.display(), "Starting yt-dlp download");

        let run = Command::new(&self.binary)
            .arg("-f")
            .arg(format_selector(quality))
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("-o")
            .arg(output_path)
            .arg(url)
            .output();

        let output = timeout(max_duration, run)
            .await
            .map_err(|_| ProviderError::Timeout)?
            .map_err(|e| {
                ProviderError::Session(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = url, "yt-dlp download failed");
            self.cleanup_partial(output_path).await;
            return Err(ProviderError::DownloadFailed {
                path: output_path.to_path_buf(),
                reason: stderr.chars().take(200).collect(),
            });
        }

        self.resolve_output(output_path).await
    }

    /// Locate the file yt-dlp actually wrote.
    async fn resolve_output(&self, output_path: &Path) -> Result<PathBuf, ProviderError> {
        if tokio::fs::try_exists(output_path).await? {
            return Ok(output_path.to_path_buf());
        }

        // yt-dlp replaces the extension when remuxing; scan siblings that
        // share the stem.
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(parent) = output_path.parent() {
            let mut entries = tokio::fs::read_dir(parent).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if !stem.is_empty() && name.starts_with(&stem) && !name.ends_with(".part") {
                    return Ok(entry.path());
                }
            }
        }

        Err(ProviderError::DownloadFailed {
            path: output_path.to_path_buf(),
            reason: "yt-dlp reported success but produced no file".to_string(),
        })
    }

    async fn cleanup_partial(&self, output_path: &Path) {
        for candidate in [
            output_path.to_path_buf(),
            output_path.with_extension("part"),
        ] {
            if tokio::fs::remove_file(&candidate).await.is_ok() {
                debug!(path = %candidate.display(), "Removed partial download");
            }
        }
    }
}

/// yt-dlp format selector for a requested quality.
fn format_selector(quality: DownloadQuality) -> &'static str {
    match quality {
        DownloadQuality::Best | DownloadQuality::Hd => "best[height<=1080]",
        DownloadQuality::Sd => "best[height<=720]",
        DownloadQuality::Worst => "worst",
    }
}
