// Copyright 2025 rpcpool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use rpcpool_common::{PoolError, RandomSource, Result, ThreadRandom};
use rpcpool_metrics::EventHook;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_rps() -> f64 {
    10.0
}

fn default_attempts() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Limits applied to every endpoint of a pool.
///
/// Each endpoint gets its own concurrency gate and rate limiter built from
/// these values; nothing is shared between endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointLimits {
    /// Maximum simultaneous in-flight calls per endpoint
    ///
    /// Required, must be greater than zero.
    pub in_flight: usize,
    /// Hard per-call timeout in milliseconds
    ///
    /// Default: 10000ms
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sustained requests per second; zero or below disables rate limiting
    ///
    /// Default: 10
    #[serde(default = "default_rps")]
    pub rps: f64,
    /// Token bucket capacity
    ///
    /// Default: `ceil(rps)`, at least 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rps_burst: Option<u32>,
}

impl EndpointLimits {
    /// Limits with the given concurrency and every other field defaulted.
    pub fn new(in_flight: usize) -> Self {
        Self {
            in_flight,
            timeout_ms: default_timeout_ms(),
            rps: default_rps(),
            rps_burst: None,
        }
    }

    /// Effective bucket capacity.
    pub fn burst(&self) -> u32 {
        match self.rps_burst {
            Some(burst) => burst.max(1),
            None if self.rps.is_finite() && self.rps > 0.0 => (self.rps.ceil() as u32).max(1),
            None => 1,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry and failover settings.
///
/// A failover-eligible failure is retried on a *different* endpoint after a
/// random delay in `[0, min(initial_backoff_ms * 2^(tried - 1), max_backoff_ms))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of distinct endpoints tried per call
    ///
    /// Capped at the endpoint count. Default: 3
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    /// Backoff ceiling after the first failure
    ///
    /// Default: 1000ms
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the backoff ceiling
    ///
    /// Default: 5000ms
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Serializable construction input of a [`Pool`](crate::Pool).
///
/// # Example
///
/// ```
/// use rpcpool_client::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{
///     "chainId": 1,
///     "urls": ["http://127.0.0.1:8545", "http://127.0.0.1:8546"],
///     "perEndpoint": { "inFlight": 4, "rps": 25 }
/// }"#).unwrap();
///
/// assert_eq!(config.per_endpoint.burst(), 25);
/// assert_eq!(config.retry.attempts, 3);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Opaque chain identifier used in provider ids and events
    pub chain_id: u64,
    /// Endpoint addresses, in round-robin order
    #[serde(default)]
    pub urls: Vec<String>,
    pub per_endpoint: EndpointLimits,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl PoolConfig {
    pub fn new(chain_id: u64, urls: Vec<String>, per_endpoint: EndpointLimits) -> Self {
        Self {
            chain_id,
            urls,
            per_endpoint,
            retry: RetryConfig::default(),
        }
    }

    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a pool relies on.
    ///
    /// An empty URL list is valid: such a pool rejects every call with
    /// [`PoolError::NoEndpointAvailable`].
    pub fn validate(&self) -> Result<()> {
        if self.per_endpoint.in_flight == 0 {
            return Err(PoolError::InvalidConfig(
                "perEndpoint.inFlight must be greater than zero".to_string(),
            ));
        }
        if self.per_endpoint.timeout_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "perEndpoint.timeoutMs must be greater than zero".to_string(),
            ));
        }
        if !self.per_endpoint.rps.is_finite() {
            return Err(PoolError::InvalidConfig(
                "perEndpoint.rps must be a finite number".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(PoolError::InvalidConfig(
                "retry.attempts must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for url in &self.urls {
            if !seen.insert(url.as_str()) {
                return Err(PoolError::InvalidConfig(format!("Duplicate endpoint URL: {}", url)));
            }
        }

        Ok(())
    }
}

/// Non-serializable construction inputs of a [`Pool`](crate::Pool).
#[derive(Clone)]
pub struct PoolOptions {
    /// Observer invoked synchronously for every lifecycle event
    pub on_event: Option<EventHook>,
    /// Source of backoff and cooldown jitter
    pub random: Arc<dyn RandomSource>,
}

impl PoolOptions {
    pub fn with_event_hook(mut self, hook: EventHook) -> Self {
        self.on_event = Some(hook);
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            on_event: None,
            random: Arc::new(ThreadRandom),
        }
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("on_event", &self.on_event.as_ref().map(|_| "<fn>"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: &[&str]) -> PoolConfig {
        PoolConfig::new(
            1,
            urls.iter().map(|u| u.to_string()).collect(),
            EndpointLimits::new(4),
        )
    }

    #[test]
    fn test_defaults_from_json() {
        let config: PoolConfig = serde_json::from_str(
            r#"{"chainId": 137, "urls": ["http://a"], "perEndpoint": {"inFlight": 2}}"#,
        )
        .unwrap();

        assert_eq!(config.chain_id, 137);
        assert_eq!(config.per_endpoint.timeout_ms, 10_000);
        assert_eq!(config.per_endpoint.rps, 10.0);
        assert_eq!(config.per_endpoint.burst(), 10);
        assert_eq!(config.retry, RetryConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_burst_defaults_to_ceil_rps() {
        let mut limits = EndpointLimits::new(1);
        limits.rps = 2.5;
        assert_eq!(limits.burst(), 3);

        limits.rps = 0.0;
        assert_eq!(limits.burst(), 1);

        limits.rps = 0.2;
        assert_eq!(limits.burst(), 1);

        limits.rps_burst = Some(7);
        assert_eq!(limits.burst(), 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = config(&["http://a"]);
        c.per_endpoint.in_flight = 0;
        assert!(matches!(c.validate(), Err(PoolError::InvalidConfig(_))));

        let mut c = config(&["http://a"]);
        c.retry.attempts = 0;
        assert!(matches!(c.validate(), Err(PoolError::InvalidConfig(_))));

        let mut c = config(&["http://a"]);
        c.per_endpoint.rps = f64::NAN;
        assert!(matches!(c.validate(), Err(PoolError::InvalidConfig(_))));

        let mut c = config(&["http://a"]);
        c.per_endpoint.timeout_ms = 0;
        assert!(matches!(c.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_urls() {
        let c = config(&["http://a", "http://b", "http://a"]);
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("http://a"));
    }

    #[test]
    fn test_empty_urls_are_valid() {
        assert!(config(&[]).validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("rpcpool-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"chainId": 5, "urls": ["http://x"], "perEndpoint": {"inFlight": 1, "rps": 0}, "retry": {"attempts": 1}}"#,
        )
        .unwrap();

        let loaded = PoolConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.chain_id, 5);
        assert_eq!(loaded.retry.attempts, 1);
        assert_eq!(loaded.retry.max_backoff_ms, 5_000);
    }

    #[test]
    fn test_from_missing_file() {
        let err = PoolConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }
}
