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

//! Failover pool
//!
//! [`Pool`] routes each call to an endpoint and retries rate-limited or
//! timed-out calls on other endpoints with a jittered exponential backoff.

use crate::classify::is_failover_eligible;
use crate::config::{PoolConfig, PoolOptions, RetryConfig};
use crate::endpoint::{Endpoint, EndpointContext};
use crate::http::HttpClient;
use crate::router::{EndpointRouter, Router};
use crate::transport::BaseClient;
use rpcpool_common::{PoolError, RandomSource, Result};
use rpcpool_metrics::HealthRegistry;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Failover pool over a fixed set of endpoints.
///
/// `Pool` is the single entry point for calls. Each call is routed to an
/// endpoint; failover-eligible failures (rate limits, timeouts) are retried on
/// a *different* endpoint after a jittered exponential backoff, and anything
/// else is returned to the caller as-is.
///
/// # Retry Logic
///
/// - At most `min(retry.attempts, endpoint_count)` distinct endpoints are
///   tried per call
/// - A pick of an endpoint already tried in this call is skipped and does not
///   use up an attempt
/// - After the n-th failure the pool waits a random delay in
///   `[0, min(initial_backoff_ms * 2^(n-1), max_backoff_ms))`
/// - When the budget is exhausted the *last* endpoint error is returned
/// - If the router only yields already-tried endpoints for a full rotation,
///   the last endpoint error is returned as well
///
/// # Example
///
/// ```no_run
/// use rpcpool_client::{EndpointLimits, Pool, PoolConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PoolConfig::new(
///     1,
///     vec!["http://127.0.0.1:8545".into(), "http://127.0.0.1:8546".into()],
///     EndpointLimits::new(4),
/// );
/// let pool = Pool::new(config)?;
///
/// let block = pool.call("eth_blockNumber", vec![]).await?;
/// println!("{} ({} calls so far)", block, pool.stats().snapshot().total);
/// # Ok(())
/// # }
/// ```
pub struct Pool {
    router: Arc<dyn Router>,
    registry: Arc<HealthRegistry>,
    retry: RetryConfig,
    random: Arc<dyn RandomSource>,
}

impl Pool {
    /// Creates a pool talking JSON-RPC over HTTP to every configured URL.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_options(config, PoolOptions::default())
    }

    /// Like [`Pool::new`] with an event observer and/or a custom random source.
    pub fn with_options(config: PoolConfig, options: PoolOptions) -> Result<Self> {
        let clients = config
            .urls
            .iter()
            .map(|url| HttpClient::new(url.clone()).map(|c| Arc::new(c) as Arc<dyn BaseClient>))
            .collect::<Result<Vec<_>>>()?;
        Self::with_clients(config, clients, options)
    }

    /// Creates a pool over caller-supplied base clients, one per URL, in the
    /// same order as `config.urls`.
    pub fn with_clients(
        config: PoolConfig,
        clients: Vec<Arc<dyn BaseClient>>,
        options: PoolOptions,
    ) -> Result<Self> {
        config.validate()?;
        if clients.len() != config.urls.len() {
            return Err(PoolError::InvalidConfig(format!(
                "Expected {} base clients, got {}",
                config.urls.len(),
                clients.len()
            )));
        }

        let registry = Arc::new(HealthRegistry::new());
        let ctx = EndpointContext::new(config.chain_id, registry.clone(), &options);

        let endpoints = config
            .urls
            .iter()
            .zip(clients)
            .enumerate()
            .map(|(i, (url, client))| {
                Endpoint::new(i, url.clone(), client, &config.per_endpoint, &ctx).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let router = Arc::new(EndpointRouter::new(endpoints, registry.clone()));
        Ok(Self::from_router(router, registry, config.retry, options.random))
    }

    /// Assembles a pool from an existing router and registry.
    pub fn from_router(
        router: Arc<dyn Router>,
        registry: Arc<HealthRegistry>,
        retry: RetryConfig,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            router,
            registry,
            retry,
            random,
        }
    }

    /// Calls `method` with failover.
    ///
    /// # Returns
    /// - `Ok(value)` - Result from the first endpoint that answered
    /// - `Err(PoolError::NoEndpointAvailable)` - The pool has no endpoints
    /// - `Err(...)` - A terminal error, or the last failover-eligible error
    ///   once the retry budget is spent
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let endpoint_count = self.router.size();
        if endpoint_count == 0 {
            return Err(PoolError::NoEndpointAvailable);
        }

        let max_unique_tries = self.retry.attempts.min(endpoint_count);
        let mut tried: HashSet<String> = HashSet::with_capacity(max_unique_tries);
        let mut last_error = None;
        let mut duplicate_picks = 0;

        while tried.len() < max_unique_tries {
            let Some(endpoint) = self.router.pick() else {
                break;
            };

            if tried.contains(endpoint.provider_id()) {
                duplicate_picks += 1;
                debug!(provider = endpoint.provider_id(), method, "Skipping already tried endpoint");
                if duplicate_picks >= endpoint_count {
                    break;
                }
                continue;
            }
            duplicate_picks = 0;
            tried.insert(endpoint.provider_id().to_string());

            debug!(
                provider = endpoint.provider_id(),
                method,
                attempt = tried.len(),
                max_attempts = max_unique_tries,
                "Calling endpoint"
            );

            let err = match endpoint.client().call(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_failover_eligible(&err) || tried.len() >= max_unique_tries {
                return Err(err);
            }

            let delay = self.backoff_delay(tried.len());
            warn!(
                provider = endpoint.provider_id(),
                method,
                attempt = tried.len(),
                backoff_ms = delay.as_millis() as u64,
                "Endpoint failed: {}, failing over",
                err
            );
            last_error = Some(err);
            tokio::time::sleep(delay).await;
        }

        Err(last_error.unwrap_or(PoolError::NoEndpointAvailable))
    }

    /// Jittered delay after the `failures`-th failed attempt (1-based).
    fn backoff_delay(&self, failures: usize) -> Duration {
        let exponent = failures.saturating_sub(1).min(32) as u32;
        let ceiling = self
            .retry
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.retry.max_backoff_ms);
        Duration::from_millis(self.random.jitter_ms(ceiling))
    }

    /// Shared health registry; call [`HealthRegistry::snapshot`] for stats.
    pub fn stats(&self) -> Arc<HealthRegistry> {
        self.registry.clone()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.router.provider_ids()
    }

    pub fn endpoint_count(&self) -> usize {
        self.router.size()
    }
}
