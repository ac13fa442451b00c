use super::{types::Config, ConfigError};
use crate::config::ProviderBackend;

/// Validate configuration
/// Currently validates:
/// - The selected backend has its section present
/// - Pexels has at least one non-empty API key
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    match config.provider.backend {
        ProviderBackend::Pexels => {
            let pexels = config.provider.pexels.as_ref().ok_or_else(|| {
                ConfigError::ValidationError(
                    "provider.pexels section is required when backend = \"pexels\"".to_string(),
                )
            })?;
            if !pexels.api_keys.iter().any(|k| !k.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "provider.pexels.api_keys must contain at least one key".to_string(),
                ));
            }
        }
        ProviderBackend::Google => {
            // All google fields have defaults; a missing section falls back
            // to GoogleConfig::default() at provider construction.
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, PexelsConfig, ProviderConfig};

    fn pexels_config(api_keys: Vec<String>) -> Config {
        Config {
            provider: ProviderConfig {
                backend: ProviderBackend::Pexels,
                pexels: Some(PexelsConfig {
                    api_keys,
                    max_calls: 200,
                    window_secs: 3600,
                    timeout_secs: 30,
                    max_attempts: 3,
                    base_delay_ms: 1000,
                    backoff_multiplier: 2.0,
                    request_delay_ms: 0,
                }),
                google: None,
            },
            cache: CacheConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        let config = pexels_config(vec!["key".to_string()]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_pexels_without_section_fails() {
        let mut config = pexels_config(vec!["key".to_string()]);
        config.provider.pexels = None;
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_pexels_empty_keys_fails() {
        let config = pexels_config(vec!["  ".to_string()]);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_google_without_section_ok() {
        let config = Config {
            provider: ProviderConfig {
                backend: ProviderBackend::Google,
                pexels: None,
                google: None,
            },
            cache: CacheConfig::default(),
        };
        assert!(validate_config(&config).is_ok());
    }
}
