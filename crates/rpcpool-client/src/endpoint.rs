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

//! Endpoints and their instrumented clients
//!
//! An [`Endpoint`] is one upstream address plus its private limiters. Every
//! call goes through [`InstrumentedClient::call`], which:
//!
//! 1. Takes a token from the endpoint's [`RateLimiter`]
//! 2. Acquires a [`ConcurrencyGate`] slot
//! 3. Records the call start in the [`HealthRegistry`] and emits `request`
//! 4. Runs the base client in a background task raced against the timeout
//! 5. On success emits `response`
//! 6. On failure classifies the error, updates counters and cooldowns and
//!    emits `error`, then returns the error unchanged
//!
//! The gate slot and the in-flight counters are released by a drop guard, so
//! they are returned on every exit path, including cancellation of the
//! caller's future.
//!
//! # Cooldowns
//!
//! - Rate limited: the provider's `Retry-After` (at most 1h), else 15s
//! - Timeouts: once the endpoint has at least 50 calls and a timeout ratio of
//!   at least 0.2, 15s (60s at a ratio of 0.5 or more) plus up to 1s of jitter

use crate::classify::{classify, Classification};
use crate::config::{EndpointLimits, PoolOptions};
use crate::transport::BaseClient;
use rpcpool_common::{
    ConcurrencyGate, GatePermit, PoolError, RandomSource, RateLimiter, Result,
};
use rpcpool_metrics::{unix_millis, EventEmitter, HealthRegistry, RpcEvent};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Cooldown after a rate-limit response without `Retry-After`.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(15);

/// Upper bound on a provider-supplied retry-after.
pub const MAX_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Calls an endpoint needs before timeouts can trigger a cooldown.
pub const TIMEOUT_COOLDOWN_MIN_CALLS: u64 = 50;

/// Timeout ratio that triggers a cooldown.
pub const TIMEOUT_RATIO_THRESHOLD: f64 = 0.2;

/// Timeout ratio that triggers the long cooldown.
pub const TIMEOUT_RATIO_SEVERE: f64 = 0.5;

const TIMEOUT_COOLDOWN: Duration = Duration::from_secs(15);
const SEVERE_TIMEOUT_COOLDOWN: Duration = Duration::from_secs(60);
const COOLDOWN_JITTER_MS: u64 = 1_000;

/// Builds the provider id of the endpoint at `index` (0-based).
///
/// Ids are unique within a pool as long as its URLs are.
pub fn provider_id(index: usize, chain_id: u64, url: &str) -> String {
    format!("rpc#{}-{}-{}", index + 1, chain_id, url)
}

/// Pool-wide collaborators handed to every endpoint.
#[derive(Clone)]
pub struct EndpointContext {
    /// Chain id stamped into provider ids and events
    pub chain_id: u64,
    /// Registry shared by every endpoint of the pool
    pub registry: Arc<HealthRegistry>,
    /// Delivers lifecycle events to the pool's observer, if any
    pub events: EventEmitter,
    /// Jitter source for timeout cooldowns
    pub random: Arc<dyn RandomSource>,
}

impl EndpointContext {
    pub fn new(chain_id: u64, registry: Arc<HealthRegistry>, options: &PoolOptions) -> Self {
        Self {
            chain_id,
            registry,
            events: EventEmitter::new(options.on_event.clone()),
            random: options.random.clone(),
        }
    }
}

/// Returns the gate slot and the in-flight counters when dropped.
struct CallGuard<'a> {
    registry: &'a HealthRegistry,
    provider_id: &'a str,
    _permit: GatePermit,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.registry.record_call_end(self.provider_id);
    }
}

/// Base client wrapped with limiting, timeout, classification and
/// instrumentation.
pub struct InstrumentedClient {
    provider_id: String,
    client: Arc<dyn BaseClient>,
    limiter: RateLimiter,
    gate: ConcurrencyGate,
    timeout: Duration,
    ctx: EndpointContext,
}

impl InstrumentedClient {
    pub fn new(
        provider_id: String,
        client: Arc<dyn BaseClient>,
        limits: &EndpointLimits,
        ctx: EndpointContext,
    ) -> Result<Self> {
        Ok(Self {
            provider_id,
            client,
            limiter: RateLimiter::new(limits.rps, limits.burst()),
            gate: ConcurrencyGate::new(limits.in_flight)?,
            timeout: limits.timeout(),
            ctx,
        })
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Performs one call against this endpoint.
    ///
    /// # Returns
    /// - `Ok(value)` - Result from the base client
    /// - `Err(PoolError::Timeout)` - No answer within the per-call timeout
    /// - `Err(...)` - The base client's error, unchanged
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.limiter.take(1).await;
        let permit = self.gate.acquire().await?;

        let registry = self.ctx.registry.as_ref();
        let started_at = unix_millis();
        let started = Instant::now();
        registry.record_call_start(&self.provider_id, method);
        let _guard = CallGuard {
            registry,
            provider_id: &self.provider_id,
            _permit: permit,
        };

        self.ctx.events.emit(RpcEvent::Request {
            chain_id: self.ctx.chain_id,
            provider_id: self.provider_id.clone(),
            method: method.to_string(),
            started_at,
        });

        let outcome = self.send_with_timeout(method, params).await;
        let ended_at = unix_millis();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                self.ctx.events.emit(RpcEvent::Response {
                    chain_id: self.ctx.chain_id,
                    provider_id: self.provider_id.clone(),
                    method: method.to_string(),
                    started_at,
                    ended_at,
                    elapsed_ms,
                });
                Ok(value)
            }
            Err(err) => {
                let class = self.record_failure(&err);
                self.ctx.events.emit(RpcEvent::Error {
                    chain_id: self.ctx.chain_id,
                    provider_id: self.provider_id.clone(),
                    method: method.to_string(),
                    started_at,
                    ended_at,
                    elapsed_ms,
                    is_rate_limit: class.rate_limited,
                    is_timeout: class.timeout,
                    http_status: err.http_status(),
                    error_code: err.code(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Races the base call against the timeout.
    ///
    /// The base call runs in its own task; on timeout the task is detached
    /// and keeps running, its result discarded.
    async fn send_with_timeout(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let client = Arc::clone(&self.client);
        let method = method.to_string();
        let task = tokio::spawn(async move { client.send(&method, params).await });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PoolError::Transport(format!("Base client task failed: {}", e))),
            Err(_) => Err(PoolError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    fn record_failure(&self, err: &PoolError) -> Classification {
        let class = classify(err);
        let registry = &self.ctx.registry;
        let id = self.provider_id.as_str();

        if class.rate_limited {
            registry.bump_rate_limited(id);
            let cooldown = err
                .retry_after()
                .map_or(DEFAULT_RATE_LIMIT_COOLDOWN, |d| d.min(MAX_RATE_LIMIT_COOLDOWN));
            registry.set_cooldown(id, cooldown);
            info!(provider = id, cooldown_ms = cooldown.as_millis() as u64, "Endpoint rate limited, cooling down");
        }

        if class.timeout {
            registry.bump_timeout(id);
            if let Some(cooldown) = self.timeout_cooldown() {
                registry.set_cooldown(id, cooldown);
                info!(
                    provider = id,
                    cooldown_ms = cooldown.as_millis() as u64,
                    timeout_ratio = registry.timeout_ratio(id),
                    "Endpoint timing out, cooling down"
                );
            }
        }

        class
    }

    fn timeout_cooldown(&self) -> Option<Duration> {
        let registry = &self.ctx.registry;
        if registry.provider_total(&self.provider_id) < TIMEOUT_COOLDOWN_MIN_CALLS {
            return None;
        }

        let ratio = registry.timeout_ratio(&self.provider_id);
        if ratio < TIMEOUT_RATIO_THRESHOLD {
            return None;
        }

        let base = if ratio >= TIMEOUT_RATIO_SEVERE {
            SEVERE_TIMEOUT_COOLDOWN
        } else {
            TIMEOUT_COOLDOWN
        };
        Some(base + Duration::from_millis(self.ctx.random.jitter_ms(COOLDOWN_JITTER_MS)))
    }
}

/// One upstream address of a pool.
pub struct Endpoint {
    provider_id: String,
    url: String,
    client: InstrumentedClient,
}

impl Endpoint {
    /// Creates the endpoint at `index` and registers it with the context's
    /// registry.
    pub fn new(
        index: usize,
        url: impl Into<String>,
        base: Arc<dyn BaseClient>,
        limits: &EndpointLimits,
        ctx: &EndpointContext,
    ) -> Result<Self> {
        let url = url.into();
        let provider_id = provider_id(index, ctx.chain_id, &url);
        ctx.registry.register_provider(&provider_id);
        let client = InstrumentedClient::new(provider_id.clone(), base, limits, ctx.clone())?;

        Ok(Self {
            provider_id,
            url,
            client,
        })
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client(&self) -> &InstrumentedClient {
        &self.client
    }
}
