pub mod cache;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod testing;

pub use cache::{CacheError, CacheStats, CleanupReport, MediaCache};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ProviderBackend,
    SanitizedConfig,
};
pub use orchestrator::{MediaOrchestrator, OrchestratorError};
pub use provider::{
    create_provider, Capabilities, DownloadQuality, MediaItem, MediaProvider, MediaType,
    MediaTypeFilter, ProviderError, SearchFilters, SearchResult,
};
