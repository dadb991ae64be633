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

//! Per-endpoint concurrency gate.
//!
//! Bounds how many calls may be in flight against a single endpoint. Waiters
//! are queued strictly first-in first-out: the earliest caller to start waiting
//! is the first to receive a freed slot.

use crate::error::{PoolError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore with FIFO hand-off.
///
/// Backed by [`tokio::sync::Semaphore`], whose waiter queue is fair, so a
/// waiting acquirer never suspends the runtime thread and never gets overtaken
/// by a later one.
///
/// # Example
///
/// ```
/// use rpcpool_common::ConcurrencyGate;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let gate = ConcurrencyGate::new(2).unwrap();
/// let mut first = gate.acquire().await.unwrap();
/// assert_eq!(gate.in_use(), 1);
///
/// first.release();
/// first.release(); // no-op
/// assert_eq!(gate.in_use(), 0);
/// # });
/// ```
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// Creates a gate admitting at most `capacity` concurrent holders.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if `capacity` is zero or larger than
    /// the semaphore can represent.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(PoolError::InvalidConfig(format!(
                "concurrency capacity must be between 1 and {}, got {}",
                Semaphore::MAX_PERMITS,
                capacity
            )));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Waits for a free slot and returns a handle that holds it.
    ///
    /// The slot is returned when the handle is released or dropped.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Transport("concurrency gate closed".into()))?;

        Ok(GatePermit {
            permit: Some(permit),
        })
    }

    /// Maximum number of concurrent holders.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }
}

/// A held slot of a [`ConcurrencyGate`].
///
/// Releasing is idempotent: only the first `release` (or the drop) returns the
/// slot to the gate.
#[derive(Debug)]
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
}

impl GatePermit {
    /// Returns the slot to the gate. Later calls do nothing.
    pub fn release(&mut self) {
        self.permit.take();
    }

    /// Whether the slot has already been returned.
    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}
