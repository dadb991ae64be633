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

//! rpcpool Client
//!
//! Resilient client-side pool over several endpoints of the same RPC service.
//!
//! # Architecture
//!
//! ```text
//! Pool::call ──> Router::pick ──> InstrumentedClient::call ──> BaseClient::send
//!    │                │                  │
//!    │ retry/backoff  │ cooldown skip    │ rate limit, gate, timeout,
//!    │                │                  │ classification, events
//!    └────────────────┴──────────────────┴──> HealthRegistry
//! ```
//!
//! - [`Pool`]: retry/failover orchestrator and the public entry point
//! - [`EndpointRouter`]: round-robin endpoint selection avoiding cooldowns
//! - [`InstrumentedClient`]: per-endpoint limiting, timeout and bookkeeping
//! - [`HttpClient`]: JSON-RPC over HTTP [`BaseClient`]

pub mod classify;
pub mod config;
pub mod endpoint;
pub mod http;
pub mod pool;
pub mod router;
pub mod transport;

#[cfg(test)]
mod testing;

pub use classify::{classify, is_failover_eligible, Classification};
pub use config::{EndpointLimits, PoolConfig, PoolOptions, RetryConfig};
pub use endpoint::{Endpoint, EndpointContext, InstrumentedClient};
pub use http::HttpClient;
pub use pool::Pool;
pub use router::{EndpointRouter, Router};
pub use transport::BaseClient;
