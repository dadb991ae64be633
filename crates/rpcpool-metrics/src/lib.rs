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

//! rpcpool Health and Metrics
//!
//! This crate holds the single piece of shared mutable state in a pool: the
//! [`HealthRegistry`]. Every endpoint client of a pool writes its counters and
//! cooldowns into the same registry, and the router reads cooldowns from it.
//!
//! # Architecture
//!
//! - [`HealthRegistry`]: call counters (global, per method, per provider) and
//!   per-provider cooldown deadlines
//! - [`StatsSnapshot`]: serializable, detached copy of the registry
//! - [`RpcEvent`] / [`EventEmitter`]: request/response/error lifecycle events
//!   forwarded to an optional observer
//!
//! # Thread Safety
//!
//! The registry uses the same hybrid model throughout:
//! - Lock-free atomics for counter increments (hot path)
//! - `RwLock` only to insert new method/provider entries and cooldowns
//!
//! # Usage Example
//!
//! ```rust
//! use rpcpool_metrics::HealthRegistry;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = HealthRegistry::new();
//! registry.record_call_start("rpc#1-1-http://a", "eth_blockNumber");
//! registry.record_call_end("rpc#1-1-http://a");
//!
//! registry.set_cooldown("rpc#1-1-http://a", Duration::from_secs(5));
//! assert!(registry.is_in_cooldown("rpc#1-1-http://a"));
//!
//! let snapshot = registry.snapshot();
//! assert_eq!(snapshot.total, 1);
//! # });
//! ```

mod events;
mod registry;
mod snapshot;

pub use events::{unix_millis, EventEmitter, EventHook, RpcEvent};
pub use registry::{HealthRegistry, MAX_COOLDOWN};
pub use snapshot::StatsSnapshot;
