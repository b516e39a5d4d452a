// Copyright 2024 RustFS Team
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
use std::time::Duration;

use crate::config::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_JITTER_BOUND};

/// Bounded retry schedule with uniformly jittered delays between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of acquisition attempts
    pub attempts: usize,
    /// Exclusive upper bound of the delay slept between two attempts
    pub jitter_bound: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: usize, jitter_bound: Duration) -> Self {
        Self { attempts, jitter_bound }
    }

    /// Random delay in `[0, jitter_bound)`
    pub fn jitter(&self) -> Duration {
        let bound = u64::try_from(self.jitter_bound.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::rng().random_range(0..bound))
    }

    /// Delay to sleep before attempt number `attempt` (zero-based); the first attempt never waits
    pub fn delay_before(&self, attempt: usize) -> Duration {
        if attempt == 0 { Duration::ZERO } else { self.jitter() }
    }

    /// Sleep the delay owed before `attempt`
    pub async fn backoff(&self, attempt: usize) {
        let delay = self.delay_before(attempt);
        if !delay.is_zero() {
            tracing::debug!("Retrying lock attempt {} after {:?}", attempt + 1, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_COUNT, DEFAULT_RETRY_JITTER_BOUND)
    }
}
