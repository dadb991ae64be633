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

//! Error classification
//!
//! Decides whether a failed call is *failover-eligible* (rate-limited or timed
//! out, so it is safe and useful to try another endpoint) or *terminal*.
//! Classification only looks at the error; it never changes it.

use rpcpool_common::protocol::LIMIT_EXCEEDED;
use rpcpool_common::PoolError;

/// HTTP statuses providers use to signal throttling.
const RATE_LIMIT_STATUSES: [u16; 2] = [429, 402];

const GATEWAY_TIMEOUT: u16 = 504;

/// Lowercased message fragments hosted providers use for throttling.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "request limit",
    "exceeded the quota",
    "quota exceeded",
    "capacity exceeded",
    "daily request count exceeded",
    "throttled",
    // Cloudflare
    "error code: 1015",
];

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "time-out", "deadline exceeded"];

/// Result of classifying one error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub rate_limited: bool,
    pub timeout: bool,
}

impl Classification {
    /// Rate-limited and timed-out calls may be retried on another endpoint.
    pub fn is_failover_eligible(&self) -> bool {
        self.rate_limited || self.timeout
    }
}

pub fn classify(err: &PoolError) -> Classification {
    Classification {
        rate_limited: is_rate_limited(err),
        timeout: is_timeout(err),
    }
}

pub fn is_rate_limited(err: &PoolError) -> bool {
    if matches!(err.http_status(), Some(status) if RATE_LIMIT_STATUSES.contains(&status)) {
        return true;
    }
    if err.code() == Some(LIMIT_EXCEEDED) {
        return true;
    }
    message_matches(err, RATE_LIMIT_PATTERNS)
}

pub fn is_timeout(err: &PoolError) -> bool {
    if err.is_timeout_marker() || err.http_status() == Some(GATEWAY_TIMEOUT) {
        return true;
    }
    message_matches(err, TIMEOUT_PATTERNS)
}

pub fn is_failover_eligible(err: &PoolError) -> bool {
    classify(err).is_failover_eligible()
}

fn message_matches(err: &PoolError, patterns: &[&str]) -> bool {
    // Config errors are ours, never the provider's
    if matches!(err, PoolError::InvalidConfig(_) | PoolError::NoEndpointAvailable) {
        return false;
    }
    let message = err.to_string().to_lowercase();
    patterns.iter().any(|p| message.contains(p))
}
