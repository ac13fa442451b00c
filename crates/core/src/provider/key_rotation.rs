//! API credential rotation with per-key rolling-window call limits.
//!
//! Each key carries a call counter inside a rolling window. The window is
//! reset lazily: on the next access after it elapses, never on a timer.
//! The manager is not internally synchronized; callers sharing one instance
//! wrap it in a mutex (the Pexels provider does).

use std::collections::{HashMap, VecDeque};
use tokio::time::{Duration, Instant};

use super::ProviderError;

/// Per-key usage record.
#[derive(Debug, Clone)]
struct KeyUsage {
    count: u32,
    window_start: Instant,
}

/// Usage snapshot for one key, safe to expose: the key itself is reduced
/// to a short non-reversible suffix.
#[derive(Debug, Clone)]
pub struct KeyUsageStats {
    /// Last 4 characters of the key, never the full secret.
    pub key_suffix: String,
    pub used_calls: u32,
    pub remaining_calls: u32,
    /// Seconds until this key's window resets (0 if already elapsed).
    pub window_remaining_secs: u64,
}

/// Rotates through a fixed set of API keys, bounding each key to
/// `max_calls` per `window`.
#[derive(Debug)]
pub struct KeyRotationManager {
    keys: VecDeque<String>,
    usage: HashMap<String, KeyUsage>,
    max_calls: u32,
    window: Duration,
}

impl KeyRotationManager {
    /// Create a manager for the given keys.
    ///
    /// Fails with `MalformedRequest` if no keys are provided.
    pub fn new(
        keys: Vec<String>,
        max_calls: u32,
        window: Duration,
    ) -> Result<Self, ProviderError> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(ProviderError::MalformedRequest(
                "at least one API key is required".to_string(),
            ));
        }

        let now = Instant::now();
        let usage = keys
            .iter()
            .map(|k| {
                (
                    k.clone(),
                    KeyUsage {
                        count: 0,
                        window_start: now,
                    },
                )
            })
            .collect();

        Ok(Self {
            keys: keys.into(),
            usage,
            max_calls,
            window,
        })
    }

    /// Number of configured keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Return the next key with remaining quota, counting the call against it.
    ///
    /// Scans at most one full rotation. A key whose window has elapsed is
    /// reset before the availability check, so it is fully usable in the
    /// same pass. If every key is at its limit, fails with
    /// `CredentialsExhausted` without retrying internally.
    pub fn get_next_key(&mut self) -> Result<String, ProviderError> {
        for _ in 0..self.keys.len() {
            // Front of the deque is the current rotation pointer.
            let key = self.keys[0].clone();
            let now = Instant::now();
            let rec = self.usage.get_mut(&key).expect("usage tracked per key");

            if now.duration_since(rec.window_start) >= self.window {
                rec.count = 0;
                rec.window_start = now;
            }

            if rec.count < self.max_calls {
                rec.count += 1;
                self.keys.rotate_left(1);
                return Ok(key);
            }

            self.keys.rotate_left(1);
        }

        Err(ProviderError::CredentialsExhausted)
    }

    /// Usage statistics per key, identified only by a short suffix.
    pub fn usage_stats(&self) -> Vec<KeyUsageStats> {
        let now = Instant::now();
        self.keys
            .iter()
            .map(|key| {
                let rec = &self.usage[key];
                let elapsed = now.duration_since(rec.window_start);
                let expired = elapsed >= self.window;

                let used = if expired { 0 } else { rec.count };
                KeyUsageStats {
                    key_suffix: key_suffix(key),
                    used_calls: used,
                    remaining_calls: self.max_calls.saturating_sub(used),
                    window_remaining_secs: if expired {
                        0
                    } else {
                        self.window.saturating_sub(elapsed).as_secs()
                    },
                }
            })
            .collect()
    }

    /// Force-reset one key's counter, or all counters when `key` is `None`.
    ///
    /// Administrative recovery only; not part of the request path.
    pub fn reset_usage(&mut self, key: Option<&str>) {
        let now = Instant::now();
        match key {
            Some(k) => {
                if let Some(rec) = self.usage.get_mut(k) {
                    rec.count = 0;
                    rec.window_start = now;
                }
            }
            None => {
                for rec in self.usage.values_mut() {
                    rec.count = 0;
                    rec.window_start = now;
                }
            }
        }
    }
}

fn key_suffix(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let start = chars.len().saturating_sub(4);
    format!("...{}", chars[start..].iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn manager(keys: &[&str], max_calls: u32, window: Duration) -> KeyRotationManager {
        KeyRotationManager::new(
            keys.iter().map(|k| k.to_string()).collect(),
            max_calls,
            window,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_keys_rejected() {
        let result = KeyRotationManager::new(vec![], 10, Duration::from_secs(3600));
        assert!(matches!(result, Err(ProviderError::MalformedRequest(_))));

        // Whitespace-only keys are filtered out too.
        let result =
            KeyRotationManager::new(vec!["  ".to_string()], 10, Duration::from_secs(3600));
        assert!(result.is_err());
    }

    #[test]
    fn test_rotation_order() {
        let mut mgr = manager(&["key-a", "key-b"], 10, Duration::from_secs(3600));

        assert_eq!(mgr.get_next_key().unwrap(), "key-a");
        assert_eq!(mgr.get_next_key().unwrap(), "key-b");
        assert_eq!(mgr.get_next_key().unwrap(), "key-a");
    }

    #[test]
    fn test_exhaustion_sequence() {
        // Scenario: [A, B], max_calls = 1 -> A, B, exhausted.
        let mut mgr = manager(&["key-a", "key-b"], 1, Duration::from_secs(3600));

        assert_eq!(mgr.get_next_key().unwrap(), "key-a");
        assert_eq!(mgr.get_next_key().unwrap(), "key-b");
        assert!(matches!(
            mgr.get_next_key(),
            Err(ProviderError::CredentialsExhausted)
        ));
        // Still exhausted on the next call.
        assert!(mgr.get_next_key().is_err());
    }

    #[test]
    fn test_no_key_exceeds_max_calls_within_window() {
        let mut mgr = manager(&["a", "b", "c"], 5, Duration::from_secs(3600));

        let mut counts: HashMap<String, u32> = HashMap::new();
        while let Ok(key) = mgr.get_next_key() {
            *counts.entry(key).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for (_, count) in counts {
            assert_eq!(count, 5);
        }
    }

    #[tokio::test]
    async fn test_window_elapse_resets_count() {
        let mut mgr = manager(&["only"], 1, Duration::from_millis(50));

        assert!(mgr.get_next_key().is_ok());
        assert!(mgr.get_next_key().is_err());

        sleep(Duration::from_millis(60)).await;

        // Window elapsed: the key is fully available again in the same scan.
        assert_eq!(mgr.get_next_key().unwrap(), "only");
    }

    #[test]
    fn test_usage_stats_redacts_keys() {
        let mut mgr = manager(&["super-secret-key-abcd"], 10, Duration::from_secs(3600));
        mgr.get_next_key().unwrap();

        let stats = mgr.usage_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].key_suffix, "...abcd");
        assert!(!stats[0].key_suffix.contains("secret"));
        assert_eq!(stats[0].used_calls, 1);
        assert_eq!(stats[0].remaining_calls, 9);
        assert!(stats[0].window_remaining_secs <= 3600);
    }

    #[tokio::test]
    async fn test_usage_stats_after_window_elapse() {
        let mut mgr = manager(&["key-wxyz"], 2, Duration::from_millis(40));
        mgr.get_next_key().unwrap();
        mgr.get_next_key().unwrap();

        sleep(Duration::from_millis(50)).await;

        let stats = mgr.usage_stats();
        assert_eq!(stats[0].used_calls, 0);
        assert_eq!(stats[0].remaining_calls, 2);
        assert_eq!(stats[0].window_remaining_secs, 0);
    }

    #[test]
    fn test_reset_usage_single_and_all() {
        let mut mgr = manager(&["a", "b"], 1, Duration::from_secs(3600));
        mgr.get_next_key().unwrap();
        mgr.get_next_key().unwrap();
        assert!(mgr.get_next_key().is_err());

        mgr.reset_usage(Some("a"));
        assert_eq!(mgr.get_next_key().unwrap(), "a");
        assert!(mgr.get_next_key().is_err());

        mgr.reset_usage(None);
        assert!(mgr.get_next_key().is_ok());
        assert!(mgr.get_next_key().is_ok());
    }
}
