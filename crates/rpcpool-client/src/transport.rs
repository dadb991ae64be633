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

use async_trait::async_trait;
use rpcpool_common::Result;
use serde_json::Value;

/// Wire-level client for a single endpoint.
///
/// Implementations serialize `method` and `params` onto their protocol and
/// return the raw result. Failures should carry whatever the endpoint
/// reported (HTTP status, `Retry-After`, JSON-RPC code, message) so the pool
/// can classify them; see [`PoolError`](rpcpool_common::PoolError).
///
/// The pool may abandon a call on timeout while the returned future keeps
/// running in a background task, so implementations must be `'static`.
#[async_trait]
pub trait BaseClient: Send + Sync + 'static {
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}
