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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time copy of a [`HealthRegistry`](crate::HealthRegistry).
///
/// Owns all of its data; mutating a snapshot never touches the registry and
/// later registry updates never show up in an existing snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total: u64,
    pub in_flight: u64,
    pub per_method_total: HashMap<String, u64>,
    pub rate_limited_total: u64,
    pub per_provider_rate_limited: HashMap<String, u64>,
    pub timeout_total: u64,
    pub per_provider_timeout: HashMap<String, u64>,
    pub per_provider_total: HashMap<String, u64>,
    /// Cooldown deadlines as Unix timestamps in milliseconds
    pub provider_cooldown_until: HashMap<String, u64>,
    pub per_provider_in_flight: HashMap<String, u64>,
}

impl StatsSnapshot {
    /// Calls recorded against one provider.
    pub fn provider_total(&self, provider_id: &str) -> u64 {
        self.per_provider_total.get(provider_id).copied().unwrap_or(0)
    }

    /// Calls of one method across all providers.
    pub fn method_total(&self, method: &str) -> u64 {
        self.per_method_total.get(method).copied().unwrap_or(0)
    }
}
