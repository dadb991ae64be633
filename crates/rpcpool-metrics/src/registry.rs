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

use crate::snapshot::StatsSnapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Longest cooldown a provider can be put into.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Decrements an atomic counter without going below zero.
fn saturating_decrement(counter: &AtomicU64) {
    // fetch_update only fails when the closure returns None, i.e. at zero
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

/// Internal storage for per-provider counters.
///
/// All fields are atomics; the entry itself is shared through an `Arc` so the
/// provider map lock is only held long enough to look the entry up.
#[derive(Debug, Default)]
struct ProviderStats {
    /// Calls started against this provider
    total: AtomicU64,
    /// Calls started but not yet finished
    in_flight: AtomicU64,
    /// Calls that failed with a timeout
    timeouts: AtomicU64,
    /// Calls that were rate limited
    rate_limited: AtomicU64,
}

/// Shared health and statistics registry for one pool.
///
/// `HealthRegistry` is the single source of truth for endpoint health: the
/// endpoint clients record call counters and cooldowns into it, the router
/// reads cooldowns from it, and callers read [`StatsSnapshot`]s out of it.
/// It is constructed explicitly and handed to every component that needs it.
///
/// # Concurrency Model
///
/// - **Global counters**: lock-free `AtomicU64`
/// - **Per-method / per-provider counters**: lock-free `AtomicU64` once the
///   entry exists; the maps are behind `RwLock`s and only write-locked to
///   insert a new entry
/// - **Cooldowns**: `RwLock<HashMap>`; a write simply replaces the deadline
///
/// Counters use `Ordering::Relaxed`. Each counter is independent, and a
/// snapshot is a best-effort point-in-time copy.
///
/// In-flight counters saturate at zero: an unmatched decrement is ignored.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    total: AtomicU64,
    in_flight: AtomicU64,
    rate_limited_total: AtomicU64,
    timeout_total: AtomicU64,
    methods: RwLock<HashMap<String, Arc<AtomicU64>>>,
    providers: RwLock<HashMap<String, Arc<ProviderStats>>>,
    cooldowns: RwLock<HashMap<String, Instant>>,
}

impl HealthRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a provider shows up in snapshots before its first call.
    pub fn register_provider(&self, provider_id: &str) {
        self.provider(provider_id);
    }

    fn provider(&self, provider_id: &str) -> Arc<ProviderStats> {
        {
            let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(stats) = providers.get(provider_id) {
                return stats.clone();
            }
        }

        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers
            .entry(provider_id.to_string())
            .or_default()
            .clone()
    }

    fn existing_provider(&self, provider_id: &str) -> Option<Arc<ProviderStats>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.get(provider_id).cloned()
    }

    // ========================================================================
    // Global counters
    // ========================================================================

    pub fn bump_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrease_in_flight(&self) {
        saturating_decrement(&self.in_flight);
    }

    /// Increments the call counter of `method`.
    pub fn bump_method(&self, method: &str) {
        let counter = {
            let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
            methods.get(method).cloned()
        };

        let counter = match counter {
            Some(counter) => counter,
            None => {
                let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
                methods.entry(method.to_string()).or_default().clone()
            }
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }

    // ========================================================================
    // Per-provider counters
    // ========================================================================

    pub fn bump_provider_total(&self, provider_id: &str) {
        self.provider(provider_id).total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_provider_in_flight(&self, provider_id: &str) {
        self.provider(provider_id).in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrease_provider_in_flight(&self, provider_id: &str) {
        if let Some(stats) = self.existing_provider(provider_id) {
            saturating_decrement(&stats.in_flight);
        }
    }

    /// Records a timeout against a provider and in the global total.
    pub fn bump_timeout(&self, provider_id: &str) {
        self.timeout_total.fetch_add(1, Ordering::Relaxed);
        self.provider(provider_id).timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rate-limited call against a provider and in the global total.
    pub fn bump_rate_limited(&self, provider_id: &str) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
        self.provider(provider_id).rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the start of a call: global, per-method and per-provider
    /// totals plus both in-flight counters.
    pub fn record_call_start(&self, provider_id: &str, method: &str) {
        self.bump_total();
        self.bump_in_flight();
        self.bump_method(method);
        self.bump_provider_total(provider_id);
        self.bump_provider_in_flight(provider_id);
    }

    /// Records the end of a call, successful or not.
    pub fn record_call_end(&self, provider_id: &str) {
        self.decrease_in_flight();
        self.decrease_provider_in_flight(provider_id);
    }

    /// Calls started against a provider.
    pub fn provider_total(&self, provider_id: &str) -> u64 {
        self.existing_provider(provider_id)
            .map(|s| s.total.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Calls to a provider that ended in a timeout.
    pub fn provider_timeouts(&self, provider_id: &str) -> u64 {
        self.existing_provider(provider_id)
            .map(|s| s.timeouts.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Fraction of a provider's calls that timed out; 0 before any call.
    pub fn timeout_ratio(&self, provider_id: &str) -> f64 {
        let Some(stats) = self.existing_provider(provider_id) else {
            return 0.0;
        };

        let total = stats.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        stats.timeouts.load(Ordering::Relaxed) as f64 / total as f64
    }

    // ========================================================================
    // Cooldowns
    // ========================================================================

    /// Puts a provider into cooldown for `duration` from now.
    ///
    /// Replaces any earlier deadline, whether it was sooner or later.
    /// Durations above [`MAX_COOLDOWN`] are clamped to it.
    pub fn set_cooldown(&self, provider_id: &str, duration: Duration) {
        let now = Instant::now();
        let until = now
            .checked_add(duration.min(MAX_COOLDOWN))
            .unwrap_or(now);
        let mut cooldowns = self.cooldowns.write().unwrap_or_else(PoisonError::into_inner);
        cooldowns.insert(provider_id.to_string(), until);
    }

    /// Whether the provider's cooldown deadline is still in the future.
    pub fn is_in_cooldown(&self, provider_id: &str) -> bool {
        self.cooldown_remaining(provider_id).is_some()
    }

    /// Time left in the provider's cooldown, if it is cooling down.
    pub fn cooldown_remaining(&self, provider_id: &str) -> Option<Duration> {
        let cooldowns = self.cooldowns.read().unwrap_or_else(PoisonError::into_inner);
        let until = *cooldowns.get(provider_id)?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Copies every counter and cooldown into a detached [`StatsSnapshot`].
    pub fn snapshot(&self) -> StatsSnapshot {
        let per_method_total = {
            let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
            methods
                .iter()
                .map(|(name, count)| (name.clone(), count.load(Ordering::Relaxed)))
                .collect()
        };

        let mut per_provider_total = HashMap::new();
        let mut per_provider_in_flight = HashMap::new();
        let mut per_provider_timeout = HashMap::new();
        let mut per_provider_rate_limited = HashMap::new();
        {
            let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
            for (id, stats) in providers.iter() {
                per_provider_total.insert(id.clone(), stats.total.load(Ordering::Relaxed));
                per_provider_in_flight.insert(id.clone(), stats.in_flight.load(Ordering::Relaxed));
                per_provider_timeout.insert(id.clone(), stats.timeouts.load(Ordering::Relaxed));
                per_provider_rate_limited
                    .insert(id.clone(), stats.rate_limited.load(Ordering::Relaxed));
            }
        }

        let provider_cooldown_until = {
            let now = Instant::now();
            let wall_now = SystemTime::now();
            let cooldowns = self.cooldowns.read().unwrap_or_else(PoisonError::into_inner);
            cooldowns
                .iter()
                .map(|(id, until)| {
                    let wall_until = if *until >= now {
                        wall_now.checked_add(*until - now)
                    } else {
                        wall_now.checked_sub(now - *until)
                    };
                    (id.clone(), wall_until.map(system_time_millis).unwrap_or(u64::MAX))
                })
                .collect()
        };

        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            per_method_total,
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            per_provider_rate_limited,
            timeout_total: self.timeout_total.load(Ordering::Relaxed),
            per_provider_timeout,
            per_provider_total,
            provider_cooldown_until,
            per_provider_in_flight,
        }
    }
}

fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "rpc#1-1-http://a";
    const B: &str = "rpc#2-1-http://b";

    #[test]
    fn test_call_start_and_end() {
        let registry = HealthRegistry::new();
        registry.record_call_start(A, "eth_blockNumber");

        let during = registry.snapshot();
        assert_eq!(during.total, 1);
        assert_eq!(during.in_flight, 1);
        assert_eq!(during.per_provider_in_flight[A], 1);

        registry.record_call_end(A);

        let after = registry.snapshot();
        assert_eq!(after.total, 1);
        assert_eq!(after.in_flight, 0);
        assert_eq!(after.per_provider_in_flight[A], 0);
        assert_eq!(after.per_provider_total[A], 1);
        assert_eq!(after.per_method_total["eth_blockNumber"], 1);
    }

    #[test]
    fn test_in_flight_never_negative() {
        let registry = HealthRegistry::new();
        registry.decrease_in_flight();
        registry.decrease_provider_in_flight(A);
        registry.record_call_end(B);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.in_flight, 0);
        assert!(!snapshot.per_provider_in_flight.contains_key(A));
    }

    #[test]
    fn test_timeout_ratio() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.timeout_ratio(A), 0.0);

        for _ in 0..4 {
            registry.bump_provider_total(A);
        }
        registry.bump_timeout(A);

        assert_eq!(registry.timeout_ratio(A), 0.25);
        assert_eq!(registry.provider_timeouts(A), 1);
        assert_eq!(registry.snapshot().timeout_total, 1);
    }

    #[test]
    fn test_rate_limited_counters() {
        let registry = HealthRegistry::new();
        registry.bump_rate_limited(A);
        registry.bump_rate_limited(A);
        registry.bump_rate_limited(B);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.rate_limited_total, 3);
        assert_eq!(snapshot.per_provider_rate_limited[A], 2);
        assert_eq!(snapshot.per_provider_rate_limited[B], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires() {
        let registry = HealthRegistry::new();
        assert!(!registry.is_in_cooldown(A));

        registry.set_cooldown(A, Duration::from_secs(2));
        assert!(registry.is_in_cooldown(A));
        assert!(!registry.is_in_cooldown(B));

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(registry.is_in_cooldown(A));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!registry.is_in_cooldown(A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_last_write_wins() {
        let registry = HealthRegistry::new();
        registry.set_cooldown(A, Duration::from_secs(60));
        registry.set_cooldown(A, Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!registry.is_in_cooldown(A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_is_clamped() {
        let registry = HealthRegistry::new();
        registry.set_cooldown(A, Duration::from_secs(u64::MAX));
        registry.set_cooldown(B, Duration::MAX);

        for id in [A, B] {
            assert!(registry.is_in_cooldown(id));
            assert_eq!(registry.cooldown_remaining(id), Some(MAX_COOLDOWN));
        }

        let until = registry.snapshot().provider_cooldown_until[A];
        assert!(until > system_time_millis(SystemTime::now()));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = HealthRegistry::new();
        registry.record_call_start(A, "eth_call");

        let mut snapshot = registry.snapshot();
        snapshot.total = 99;
        snapshot.per_method_total.insert("eth_call".into(), 42);
        snapshot.provider_cooldown_until.insert(A.into(), u64::MAX);

        let fresh = registry.snapshot();
        assert_eq!(fresh.total, 1);
        assert_eq!(fresh.per_method_total["eth_call"], 1);
        assert!(!registry.is_in_cooldown(A));

        registry.record_call_start(A, "eth_call");
        assert_eq!(fresh.total, 1);
    }

    #[test]
    fn test_snapshot_cooldown_as_unix_millis() {
        let registry = HealthRegistry::new();
        let before = system_time_millis(SystemTime::now());
        registry.set_cooldown(A, Duration::from_secs(10));

        let until = registry.snapshot().provider_cooldown_until[A];
        assert!(until >= before + 9_000);
        assert!(until <= system_time_millis(SystemTime::now()) + 10_000);
    }

    #[test]
    fn test_register_provider_appears_with_zeroes() {
        let registry = HealthRegistry::new();
        registry.register_provider(A);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.per_provider_total[A], 0);
        assert_eq!(snapshot.per_provider_timeout[A], 0);
        assert_eq!(snapshot.per_provider_rate_limited[A], 0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let registry = Arc::new(HealthRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let provider = if i % 2 == 0 { A } else { B };
                    for _ in 0..1000 {
                        registry.record_call_start(provider, "eth_getLogs");
                        registry.record_call_end(provider);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.total, 8000);
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.per_method_total["eth_getLogs"], 8000);
        assert_eq!(snapshot.per_provider_total[A], 4000);
        assert_eq!(snapshot.per_provider_total[B], 4000);
    }
}
