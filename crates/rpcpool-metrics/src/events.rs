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
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Current wall-clock time as Unix milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lifecycle event of a single endpoint call.
///
/// Every call emits exactly one `Request` followed by either one `Response`
/// or one `Error`. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RpcEvent {
    Request {
        chain_id: u64,
        provider_id: String,
        method: String,
        started_at: u64,
    },
    Response {
        chain_id: u64,
        provider_id: String,
        method: String,
        started_at: u64,
        ended_at: u64,
        elapsed_ms: u64,
    },
    Error {
        chain_id: u64,
        provider_id: String,
        method: String,
        started_at: u64,
        ended_at: u64,
        elapsed_ms: u64,
        is_rate_limit: bool,
        is_timeout: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<i64>,
        message: String,
    },
}

impl RpcEvent {
    /// Provider the event belongs to.
    pub fn provider_id(&self) -> &str {
        match self {
            RpcEvent::Request { provider_id, .. }
            | RpcEvent::Response { provider_id, .. }
            | RpcEvent::Error { provider_id, .. } => provider_id,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            RpcEvent::Request { method, .. }
            | RpcEvent::Response { method, .. }
            | RpcEvent::Error { method, .. } => method,
        }
    }

    /// Short name of the variant, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcEvent::Request { .. } => "request",
            RpcEvent::Response { .. } => "response",
            RpcEvent::Error { .. } => "error",
        }
    }
}

/// Observer invoked synchronously for every [`RpcEvent`].
pub type EventHook = Arc<dyn Fn(&RpcEvent) + Send + Sync>;

/// Forwards events to an optional [`EventHook`].
///
/// A panic inside the hook is caught and logged, so an observer can never
/// abort the call that emitted the event.
#[derive(Clone, Default)]
pub struct EventEmitter {
    hook: Option<EventHook>,
}

impl EventEmitter {
    pub fn new(hook: Option<EventHook>) -> Self {
        Self { hook }
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Delivers `event` to the hook, if there is one.
    pub fn emit(&self, event: RpcEvent) {
        let Some(hook) = &self.hook else {
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| hook(&event))).is_err() {
            warn!(
                kind = event.kind(),
                provider = event.provider_id(),
                method = event.method(),
                "Event observer panicked"
            );
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("hook", &self.hook.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
