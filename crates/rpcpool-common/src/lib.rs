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

//! rpcpool Common Types and Limiters
//!
//! This crate provides the building blocks shared by every rpcpool component:
//!
//! - **Error taxonomy**: [`PoolError`] and the crate-wide [`Result`] alias
//! - **Protocol Layer**: JSON-RPC 2.0 request/response/error wire types
//! - **Limiters**: the per-endpoint [`ConcurrencyGate`] and token-bucket [`RateLimiter`]
//! - **Randomness**: the injectable [`RandomSource`] used for backoff and cooldown jitter
//!
//! # Example
//!
//! ```no_run
//! use rpcpool_common::{ConcurrencyGate, RateLimiter};
//!
//! # async fn run() -> rpcpool_common::Result<()> {
//! let gate = ConcurrencyGate::new(4)?;
//! let limiter = RateLimiter::new(10.0, 10);
//!
//! limiter.take(1).await;
//! let permit = gate.acquire().await;
//! // ... talk to the endpoint ...
//! drop(permit);
//! # Ok(())
//! # }
//! ```

pub mod concurrency;
pub mod error;
pub mod protocol;
pub mod random;
pub mod rate_limit;

pub use concurrency::{ConcurrencyGate, GatePermit};
pub use error::{PoolError, Result};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use random::{FixedRandom, RandomSource, ThreadRandom};
pub use rate_limit::RateLimiter;
