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

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::{
    drift::DriftEstimator,
    error::{LockError, Result},
    retry::RetryPolicy,
};

/// Default validity requested for a lock
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30);
/// Default number of acquisition attempts
pub const DEFAULT_RETRY_COUNT: usize = 3;
/// Default upper bound of the delay between attempts
pub const DEFAULT_RETRY_JITTER_BOUND: Duration = Duration::from_millis(200);
/// Default fraction of the expiration reserved for clock drift
pub const DEFAULT_DRIFT_FACTOR: f64 = 0.01;
/// Default fixed part of the clock drift margin
pub const DEFAULT_DRIFT_MINIMUM: Duration = Duration::from_millis(2);
/// Longest expiration accepted; keeps deadline arithmetic on `Instant` in range
pub const MAX_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const ENV_EXPIRATION_MS: &str = "REDLOCK_EXPIRATION_MS";
pub const ENV_RETRY_COUNT: &str = "REDLOCK_RETRY_COUNT";
pub const ENV_RETRY_JITTER_MS: &str = "REDLOCK_RETRY_JITTER_MS";
pub const ENV_DRIFT_FACTOR: &str = "REDLOCK_DRIFT_FACTOR";

/// Mutex configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutexOptions {
    /// Validity requested from every store
    #[serde(default = "default_expiration")]
    pub expiration: Duration,

    /// Maximum acquisition attempts
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    /// Upper bound of the random delay between attempts
    #[serde(default = "default_retry_jitter_bound")]
    pub retry_jitter_bound: Duration,

    /// Fraction of the expiration assumed lost to clock drift
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,

    /// Fixed drift allowance
    #[serde(default = "default_drift_minimum")]
    pub drift_minimum: Duration,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self {
            expiration: default_expiration(),
            retry_count: default_retry_count(),
            retry_jitter_bound: default_retry_jitter_bound(),
            drift_factor: default_drift_factor(),
            drift_minimum: default_drift_minimum(),
        }
    }
}

// Default value functions
fn default_expiration() -> Duration {
    DEFAULT_EXPIRATION
}

fn default_retry_count() -> usize {
    DEFAULT_RETRY_COUNT
}

fn default_retry_jitter_bound() -> Duration {
    DEFAULT_RETRY_JITTER_BOUND
}

fn default_drift_factor() -> f64 {
    DEFAULT_DRIFT_FACTOR
}

fn default_drift_minimum() -> Duration {
    DEFAULT_DRIFT_MINIMUM
}

fn get_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn get_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn get_env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl MutexOptions {
    /// Defaults overlaid with `REDLOCK_*` environment variables; unparsable values are ignored
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(ms) = get_env_u64(ENV_EXPIRATION_MS) {
            opts.expiration = Duration::from_millis(ms);
        }
        if let Some(count) = get_env_usize(ENV_RETRY_COUNT) {
            opts.retry_count = count;
        }
        if let Some(ms) = get_env_u64(ENV_RETRY_JITTER_MS) {
            opts.retry_jitter_bound = Duration::from_millis(ms);
        }
        if let Some(factor) = get_env_f64(ENV_DRIFT_FACTOR) {
            opts.drift_factor = factor;
        }
        opts
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_retry_count(mut self, retry_count: usize) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_jitter_bound(mut self, bound: Duration) -> Self {
        self.retry_jitter_bound = bound;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.expiration.is_zero() {
            return Err(LockError::configuration("Expiration must be greater than zero"));
        }

        if self.expiration > MAX_EXPIRATION {
            return Err(LockError::configuration(format!(
                "Expiration must not exceed {:?}, got {:?}",
                MAX_EXPIRATION, self.expiration
            )));
        }

        if self.retry_count == 0 {
            return Err(LockError::configuration("Retry count must be greater than zero"));
        }

        if !(0.0..1.0).contains(&self.drift_factor) {
            return Err(LockError::configuration("Drift factor must be in [0.0, 1.0)"));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_jitter_bound)
    }

    pub fn drift(&self) -> DriftEstimator {
        DriftEstimator::new(self.drift_factor, self.drift_minimum)
    }
}
