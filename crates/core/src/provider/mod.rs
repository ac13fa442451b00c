//! Media acquisition abstraction.
//!
//! This module provides a `MediaProvider` trait for fetching stock media
//! from various backends (the Pexels API, Google image/video scraping),
//! plus the credential rotation and retry machinery they share.

mod google;
mod key_rotation;
mod pexels;
mod retry;
mod types;
mod ytdlp;

pub use google::GoogleProvider;
pub use key_rotation::{KeyRotationManager, KeyUsageStats};
pub use pexels::PexelsProvider;
pub use retry::RetryPolicy;
pub use types::*;
pub use ytdlp::{VideoProbe, YtDlp};

use crate::config::{Config, ProviderBackend};

/// Build the provider selected in the configuration.
pub fn create_provider(config: &Config) -> Result<Box<dyn MediaProvider>, ProviderError> {
    match config.provider.backend {
        ProviderBackend::Pexels => {
            let pexels_config = config.provider.pexels.clone().ok_or_else(|| {
                ProviderError::MalformedRequest(
                    "pexels backend selected but provider.pexels is missing".to_string(),
                )
            })?;
            Ok(Box::new(PexelsProvider::new(pexels_config)?))
        }
        ProviderBackend::Google => {
            let google_config = config.provider.google.clone().unwrap_or_default();
            Ok(Box::new(GoogleProvider::new(google_config)))
        }
    }
}
