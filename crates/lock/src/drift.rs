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

use std::time::Duration;

use crate::config::{DEFAULT_DRIFT_FACTOR, DEFAULT_DRIFT_MINIMUM};

/// Clock drift estimator
///
/// The margin is subtracted from the validity left after a successful quorum.
/// It never extends the TTL requested from the stores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftEstimator {
    /// Fraction of the expiration assumed lost to skew
    pub factor: f64,
    /// Fixed floor added on top of the proportional part
    pub minimum: Duration,
}

impl DriftEstimator {
    pub fn new(factor: f64, minimum: Duration) -> Self {
        Self { factor, minimum }
    }

    /// Safety margin for a lock requested with `expiration`
    pub fn safety_margin(&self, expiration: Duration) -> Duration {
        let skew_nanos = (expiration.as_nanos() as f64 * self.factor).round() as u64;
        Duration::from_nanos(skew_nanos) + self.minimum
    }

    /// Validity left once `elapsed` and `margin` are taken off, `None` when nothing is left
    pub fn remaining_validity(expiration: Duration, elapsed: Duration, margin: Duration) -> Option<Duration> {
        expiration
            .checked_sub(elapsed)
            .and_then(|left| left.checked_sub(margin))
            .filter(|left| !left.is_zero())
    }
}

impl Default for DriftEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_FACTOR, DEFAULT_DRIFT_MINIMUM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_margin() {
        let drift = DriftEstimator::default();
        assert_eq!(drift.safety_margin(Duration::from_secs(30)), Duration::from_millis(302));
        assert_eq!(drift.safety_margin(Duration::from_millis(500)), Duration::from_millis(7));
        assert_eq!(drift.safety_margin(Duration::ZERO), Duration::from_millis(2));
    }

    #[test]
    fn test_remaining_validity() {
        let expiration = Duration::from_millis(100);
        let margin = Duration::from_millis(3);

        assert_eq!(
            DriftEstimator::remaining_validity(expiration, Duration::from_millis(10), margin),
            Some(Duration::from_millis(87))
        );
        // exactly exhausted is not valid
        assert_eq!(DriftEstimator::remaining_validity(expiration, Duration::from_millis(97), margin), None);
        assert_eq!(DriftEstimator::remaining_validity(expiration, Duration::from_millis(150), margin), None);
    }
}
