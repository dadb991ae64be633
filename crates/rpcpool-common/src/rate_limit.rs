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

//! Rate Limiting for rpcpool endpoints
//!
//! Each endpoint owns one [`RateLimiter`], a token bucket that bounds both the
//! sustained request rate and the size of bursts sent to that endpoint.
//!
//! # Algorithm
//!
//! - The bucket starts full (`tokens = burst`), so the first `burst` calls pass
//!   without waiting
//! - Tokens are refilled lazily on every [`take`](RateLimiter::take) from the
//!   time elapsed since the previous refill, capped at `burst`
//! - A caller short on tokens sleeps for the time needed to accumulate the
//!   deficit, in chunks of at most 250ms, and re-checks after each chunk
//! - A rate of zero (or below) disables limiting entirely
//!
//! # Example
//!
//! ```
//! use rpcpool_common::RateLimiter;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! // 10 requests per second, bursts of up to 20
//! let limiter = RateLimiter::new(10.0, 20);
//! limiter.take(1).await;
//! # });
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Longest single sleep while waiting for tokens.
pub const MAX_WAIT_CHUNK: Duration = Duration::from_millis(250);

/// Absorbs float rounding when comparing token balances.
const TOKEN_EPSILON: f64 = 1e-9;

/// Token bucket state.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens
    tokens: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a new token bucket with full tokens.
    fn new(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    /// Adds the tokens accumulated since the last refill.
    fn refill(&mut self, rate: f64, burst: f64, now: Instant) {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * rate).min(burst);
        self.last_refill = now;
    }

    /// Attempts to consume `n` tokens.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the tokens were deducted, otherwise the time needed for the
    /// missing tokens to accumulate.
    fn try_consume(&mut self, n: f64, rate: f64, burst: f64, now: Instant) -> Result<(), Duration> {
        self.refill(rate, burst, now);

        if self.tokens + TOKEN_EPSILON >= n {
            self.tokens = (self.tokens - n).max(0.0);
            Ok(())
        } else {
            let secs_needed = (n - self.tokens) / rate;
            Err(Duration::try_from_secs_f64(secs_needed).unwrap_or(Duration::MAX))
        }
    }
}

/// Token-bucket rate limiter for a single endpoint.
///
/// # Thread Safety
///
/// The bucket sits behind a mutex that is never held across an await point,
/// so concurrent `take` calls can never jointly debit more tokens than were
/// available. Waiters are not queued: whichever waiter re-checks first after
/// a refill gets the tokens.
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens added per second; `<= 0` disables limiting
    rate: f64,
    /// Bucket capacity
    burst: f64,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Creates a limiter refilling `rate` tokens per second with room for
    /// `burst` tokens. A burst of zero is raised to one.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            bucket: Mutex::new(TokenBucket::new(burst)),
        }
    }

    /// Creates a limiter that lets every request through.
    pub fn disabled() -> Self {
        Self::new(0.0, 1)
    }

    /// Returns whether limiting is in effect.
    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Waits until `n` tokens are available and deducts them.
    ///
    /// Requests larger than the bucket are clamped to `burst`, since more
    /// tokens than that can never accumulate.
    pub async fn take(&self, n: u32) {
        if !self.is_enabled() || n == 0 {
            return;
        }

        let n = f64::from(n).min(self.burst);

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
                match bucket.try_consume(n, self.rate, self.burst, Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };

            tokio::time::sleep(wait.min(MAX_WAIT_CHUNK)).await;
        }
    }

    /// Returns the current token balance after a lazy refill.
    ///
    /// Always `burst` for a disabled limiter.
    pub fn available_tokens(&self) -> f64 {
        if !self.is_enabled() {
            return self.burst;
        }

        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(self.rate, self.burst, Instant::now());
        bucket.tokens
    }
}
