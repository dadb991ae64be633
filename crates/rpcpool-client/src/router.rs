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

//! Endpoint selection
//!
//! [`EndpointRouter`] hands out endpoints in round-robin order and skips any
//! endpoint whose cooldown in the [`HealthRegistry`] is still running. If every
//! endpoint is cooling down, the next one in rotation is returned anyway.

use crate::endpoint::Endpoint;
use rpcpool_metrics::HealthRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Chooses the endpoint for the next attempt.
pub trait Router: Send + Sync {
    /// Number of endpoints behind the router.
    fn size(&self) -> usize;

    /// Next endpoint to try, or `None` if there are no endpoints.
    fn pick(&self) -> Option<Arc<Endpoint>>;

    /// Provider ids in construction order.
    fn provider_ids(&self) -> Vec<String>;
}

/// Round-robin router that steps over endpoints in cooldown.
///
/// The cursor is a single monotonically increasing counter shared by all
/// callers; each scan step consumes one position. When every endpoint is
/// cooling down, the endpoint at the next position is returned anyway, since
/// a cooldown only deprioritizes.
pub struct EndpointRouter {
    endpoints: Vec<Arc<Endpoint>>,
    registry: Arc<HealthRegistry>,
    rr: AtomicU64,
}

impl EndpointRouter {
    pub fn new(endpoints: Vec<Arc<Endpoint>>, registry: Arc<HealthRegistry>) -> Self {
        Self {
            endpoints,
            registry,
            rr: AtomicU64::new(0),
        }
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    fn next_index(&self) -> usize {
        let n = self.endpoints.len() as u64;
        (self.rr.fetch_add(1, Ordering::Relaxed) % n) as usize
    }
}

impl Router for EndpointRouter {
    fn size(&self) -> usize {
        self.endpoints.len()
    }

    fn pick(&self) -> Option<Arc<Endpoint>> {
        if self.endpoints.is_empty() {
            return None;
        }

        for _ in 0..self.endpoints.len() {
            let endpoint = &self.endpoints[self.next_index()];
            if !self.registry.is_in_cooldown(endpoint.provider_id()) {
                return Some(endpoint.clone());
            }
        }

        Some(self.endpoints[self.next_index()].clone())
    }

    fn provider_ids(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .map(|e| e.provider_id().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use serde_json::json;
    use std::time::Duration;

    fn router(n: usize) -> (EndpointRouter, Arc<HealthRegistry>) {
        let registry = Arc::new(HealthRegistry::new());
        let ctx = test_context(registry.clone(), None);
        let endpoints = (0..n)
            .map(|i| test_endpoint(i, MockClient::ok(json!(i)), &test_limits(), &ctx))
            .collect();
        (EndpointRouter::new(endpoints, registry.clone()), registry)
    }

    fn picks(router: &EndpointRouter, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| router.pick().unwrap().url().to_string())
            .collect()
    }

    #[test]
    fn test_empty_router() {
        let (router, _) = router(0);
        assert_eq!(router.size(), 0);
        assert!(router.pick().is_none());
    }

    #[tokio::test]
    async fn test_round_robin() {
        let (router, _) = router(3);
        assert_eq!(
            picks(&router, 5),
            vec!["http://node-0", "http://node-1", "http://node-2", "http://node-0", "http://node-1"]
        );
    }

    #[tokio::test]
    async fn test_skips_cooling_endpoint() {
        let (router, registry) = router(3);
        registry.set_cooldown(&router.provider_ids()[1], Duration::from_secs(30));

        assert_eq!(
            picks(&router, 4),
            vec!["http://node-0", "http://node-2", "http://node-0", "http://node-2"]
        );
    }

    #[tokio::test]
    async fn test_all_cooling_keeps_rotating() {
        let (router, registry) = router(3);
        for id in router.provider_ids() {
            registry.set_cooldown(&id, Duration::from_secs(30));
        }

        assert_eq!(
            picks(&router, 4),
            vec!["http://node-0", "http://node-1", "http://node-2", "http://node-0"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooled_endpoint_returns() {
        let (router, registry) = router(2);
        registry.set_cooldown(&router.provider_ids()[0], Duration::from_secs(1));
        assert_eq!(picks(&router, 2), vec!["http://node-1", "http://node-1"]);

        tokio::time::advance(Duration::from_secs(1)).await;
        let after = picks(&router, 2);
        assert!(after.contains(&"http://node-0".to_string()));
    }

    #[test]
    fn test_provider_ids_in_order() {
        let (router, _) = router(2);
        assert_eq!(
            router.provider_ids(),
            vec!["rpc#1-1-http://node-0", "rpc#2-1-http://node-1"]
        );
    }
}
