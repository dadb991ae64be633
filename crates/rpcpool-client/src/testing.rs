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

//! Scripted base clients and recorders shared by the unit tests.

use crate::config::EndpointLimits;
use crate::endpoint::{Endpoint, EndpointContext};
use crate::transport::BaseClient;
use async_trait::async_trait;
use rpcpool_common::{FixedRandom, PoolError, Result};
use rpcpool_metrics::{EventEmitter, EventHook, HealthRegistry, RpcEvent};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a [`MockClient`] does for one call.
pub enum Reply {
    Ok(Value),
    Err(PoolError),
    /// Never resolves
    Hang,
    /// Resolves with the value after the delay
    After(Duration, Value),
}

type Script = Box<dyn Fn(usize) -> Reply + Send + Sync>;

/// Base client answering each call from a script indexed by call number.
pub struct MockClient {
    calls: AtomicUsize,
    completed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    script: Script,
}

impl MockClient {
    pub fn new(script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }

    pub fn ok(value: Value) -> Arc<Self> {
        Self::new(move |_| Reply::Ok(value.clone()))
    }

    pub fn failing(err: impl Fn() -> PoolError + Send + Sync + 'static) -> Arc<Self> {
        Self::new(move |_| Reply::Err(err()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls whose future ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseClient for MockClient {
    async fn send(&self, _method: &str, _params: Vec<Value>) -> Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let result = match (self.script)(n) {
            Reply::Ok(value) => Ok(value),
            Reply::Err(err) => Err(err),
            Reply::Hang => std::future::pending::<Result<Value>>().await,
            Reply::After(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Collects every emitted event.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RpcEvent>>>,
}

impl EventLog {
    pub fn hook(&self) -> EventHook {
        let events = self.events.clone();
        Arc::new(move |e: &RpcEvent| events.lock().unwrap().push(e.clone()))
    }

    pub fn events(&self) -> Vec<RpcEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(RpcEvent::kind).collect()
    }
}

pub fn rate_limited() -> PoolError {
    PoolError::Http {
        status: 429,
        message: "Too Many Requests".into(),
        retry_after: None,
    }
}

pub fn terminal() -> PoolError {
    PoolError::Rpc {
        code: -32602,
        message: "invalid argument 0: hex string has odd length".into(),
        data: None,
    }
}

/// Unlimited rate, generous concurrency, 100ms timeout.
pub fn test_limits() -> EndpointLimits {
    EndpointLimits {
        in_flight: 8,
        timeout_ms: 100,
        rps: 0.0,
        rps_burst: None,
    }
}

pub fn test_context(registry: Arc<HealthRegistry>, log: Option<&EventLog>) -> EndpointContext {
    EndpointContext {
        chain_id: 1,
        registry,
        events: EventEmitter::new(log.map(EventLog::hook)),
        random: Arc::new(FixedRandom(0.5)),
    }
}

pub fn test_endpoint(
    index: usize,
    client: Arc<dyn BaseClient>,
    limits: &EndpointLimits,
    ctx: &EndpointContext,
) -> Arc<Endpoint> {
    let url = format!("http://node-{}", index);
    Arc::new(Endpoint::new(index, url, client, limits, ctx).unwrap())
}
