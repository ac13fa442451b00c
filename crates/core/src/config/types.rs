use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Media provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Active provider backend
    pub backend: ProviderBackend,
    /// Pexels-specific configuration (required when backend = "pexels")
    #[serde(default)]
    pub pexels: Option<PexelsConfig>,
    /// Google-scraper configuration (required when backend = "google")
    #[serde(default)]
    pub google: Option<GoogleConfig>,
}

/// Available provider backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderBackend {
    Pexels,
    Google,
}

/// Pexels API provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PexelsConfig {
    /// API keys rotated across requests
    pub api_keys: Vec<String>,
    /// Max calls per key per window (default: 200)
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    /// Rolling window duration in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Retry attempts per call (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Polite delay before each API request, in milliseconds (default: 0)
    #[serde(default)]
    pub request_delay_ms: u64,
}

fn default_max_calls() -> u32 {
    200
}

fn default_window_secs() -> u64 {
    3600
}

fn default_timeout() -> u32 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Google scraping provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleConfig {
    /// WebDriver endpoint (default: "http://localhost:9515")
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    /// Run the browser headless (default: true)
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Max seconds to wait for result markers (default: 12)
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
    /// Consecutive extraction misses before the scrape loop gives up
    /// (default: 10)
    #[serde(default = "default_max_miss_streak")]
    pub max_miss_streak: u32,
    /// Image hosts rejected as watermarked stock mirrors
    #[serde(default = "default_watermark_domains")]
    pub watermark_domains: Vec<String>,
    /// Path to the yt-dlp binary (default: "yt-dlp")
    #[serde(default = "default_yt_dlp_path")]
    pub yt_dlp_path: PathBuf,
    /// Hard ceiling on scraped video duration in seconds (default: 300)
    #[serde(default = "default_max_video_duration")]
    pub max_video_duration_secs: u32,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
            wait_timeout_secs: default_wait_timeout(),
            max_miss_streak: default_max_miss_streak(),
            watermark_domains: default_watermark_domains(),
            yt_dlp_path: default_yt_dlp_path(),
            max_video_duration_secs: default_max_video_duration(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    12
}

fn default_max_miss_streak() -> u32 {
    10
}

fn default_watermark_domains() -> Vec<String> {
    [
        "media.gettyimages.com",
        "shutterstock.com",
        "istockphoto.com",
        "dreamstime.com",
        "depositphotos.com",
        "alamy.com",
        "123rf.com",
        "bigstockphoto.com",
        "fotolia.com",
        "canstockphoto.com",
        "vectorstock.com",
        "freepik.com",
        "adobe.com",
        "envato.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_yt_dlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_max_video_duration() -> u32 {
    300
}

/// Local media cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Cache root directory (default: "media_cache")
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Entry time-to-live in hours (default: 24; 0 disables reuse entirely)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Whether caching is enabled at all (default: true)
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
            enabled: default_cache_enabled(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("media_cache")
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_cache_enabled() -> bool {
    true
}

/// Sanitized config for display/logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub provider: SanitizedProviderConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pexels: Option<SanitizedPexelsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleConfig>,
}

/// Sanitized Pexels config (API keys hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPexelsConfig {
    pub api_key_count: usize,
    pub max_calls: u32,
    pub window_secs: u64,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            provider: SanitizedProviderConfig {
                backend: match config.provider.backend {
                    ProviderBackend::Pexels => "pexels".to_string(),
                    ProviderBackend::Google => "google".to_string(),
                },
                pexels: config
                    .provider
                    .pexels
                    .as_ref()
                    .map(|p| SanitizedPexelsConfig {
                        api_key_count: p.api_keys.len(),
                        max_calls: p.max_calls,
                        window_secs: p.window_secs,
                        timeout_secs: p.timeout_secs,
                    }),
                google: config.provider.google.clone(),
            },
            cache: config.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_pexels_config_with_defaults() {
        let toml = r#"
[provider]
backend = "pexels"

[provider.pexels]
api_keys = ["key-one", "key-two"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.provider.backend, ProviderBackend::Pexels);

        let pexels = config.provider.pexels.as_ref().unwrap();
        assert_eq!(pexels.api_keys.len(), 2);
        assert_eq!(pexels.max_calls, 200);
        assert_eq!(pexels.window_secs, 3600);
        assert_eq!(pexels.timeout_secs, 30);
        assert_eq!(pexels.max_attempts, 3);
    }

    #[test]
    fn test_deserialize_google_config_with_defaults() {
        let toml = r#"
[provider]
backend = "google"

[provider.google]
headless = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let google = config.provider.google.as_ref().unwrap();
        assert!(!google.headless);
        assert_eq!(google.webdriver_url, "http://localhost:9515");
        assert_eq!(google.max_miss_streak, 10);
        assert!(google
            .watermark_domains
            .iter()
            .any(|d| d == "shutterstock.com"));
    }

    #[test]
    fn test_deserialize_with_default_cache() {
        let toml = r#"
[provider]
backend = "google"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.ttl_hours, 24);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.dir.to_str().unwrap(), "media_cache");
    }

    #[test]
    fn test_deserialize_missing_provider_fails() {
        let toml = r#"
[cache]
ttl_hours = 1
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_keys() {
        let toml = r#"
[provider]
backend = "pexels"

[provider.pexels]
api_keys = ["very-secret-key"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        assert_eq!(sanitized.provider.backend, "pexels");
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("very-secret-key"));
        assert_eq!(sanitized.provider.pexels.unwrap().api_key_count, 1);
    }
}
