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

use rand::Rng;

/// Source of uniform random numbers for backoff and cooldown jitter.
pub trait RandomSource: Send + Sync {
    /// Returns a value in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// Returns a whole number of milliseconds in `[0, max_ms)`, or 0 when
    /// `max_ms` is 0.
    fn jitter_ms(&self, max_ms: u64) -> u64 {
        let sample = self.next_f64().clamp(0.0, 1.0);
        ((sample * max_ms as f64).floor() as u64).min(max_ms.saturating_sub(1))
    }
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same sample. Used to make jitter deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_range() {
        let rng = ThreadRandom;
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(FixedRandom(0.0).jitter_ms(1000), 0);
        assert_eq!(FixedRandom(0.5).jitter_ms(1000), 500);
        assert_eq!(FixedRandom(0.9999).jitter_ms(1000), 999);
        assert_eq!(FixedRandom(1.0).jitter_ms(1000), 999);
        assert_eq!(FixedRandom(0.7).jitter_ms(0), 0);
    }
}
