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

//! Parallel fan-out of lock and release requests over the adapter set.
//!
//! Every call is dispatched concurrently and joined before the aggregate is
//! observed, so one attempt costs roughly the slowest responsive adapter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    adapter::StoreAdapter,
    error::{LockError, Result},
    token::LockToken,
};

/// Majority of `n` voters: `floor(n / 2) + 1`
pub fn quorum_threshold(n: usize) -> usize {
    n / 2 + 1
}

/// Aggregate of one fan-out lock attempt
#[derive(Debug, Default)]
pub struct AttemptOutcome {
    /// Adapters that wrote the token
    pub successes: usize,
    /// Adapters that failed outright; "held by someone else" is not an error
    pub errors: Vec<LockError>,
}

impl AttemptOutcome {
    /// Quorum reached with no hard error
    pub fn reached(&self, quorum: usize) -> bool {
        self.successes >= quorum && self.errors.is_empty()
    }
}

/// Run `fut` under the adapter's own deadline, if it has one
async fn call_with_timeout<T, F>(adapter: &dyn StoreAdapter, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match adapter.timeout() {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(LockError::timeout(adapter.name(), limit)),
        },
        None => fut.await,
    }
}

/// Conditionally set `key = token` on every adapter in parallel
pub async fn attempt_lock(adapters: &[Arc<dyn StoreAdapter>], key: &str, token: &LockToken, ttl: Duration) -> AttemptOutcome {
    let futs: Vec<_> = adapters
        .iter()
        .enumerate()
        .map(|(idx, adapter)| async move {
            let result = call_with_timeout(adapter.as_ref(), adapter.try_set(key, token.as_str(), ttl)).await;
            (idx, result)
        })
        .collect();

    let results = futures::future::join_all(futs).await;

    let mut outcome = AttemptOutcome::default();
    for (idx, result) in results {
        match result {
            Ok(true) => outcome.successes += 1,
            Ok(false) => {
                tracing::debug!("Key '{}' already held on adapter {}", key, idx);
            }
            Err(e) => {
                tracing::warn!("Failed to set key '{}' on adapter {}: {}", key, idx, e);
                outcome.errors.push(e);
            }
        }
    }
    outcome
}

/// Compare-and-delete `key` on every adapter in parallel; failures are only logged
pub async fn release_all(adapters: &[Arc<dyn StoreAdapter>], key: &str, token: &LockToken) {
    let futs = adapters.iter().enumerate().map(|(idx, adapter)| async move {
        let result = call_with_timeout(adapter.as_ref(), adapter.release_if_owner(key, token.as_str())).await;
        (idx, result)
    });

    for (idx, result) in futures::future::join_all(futs).await {
        if let Err(e) = result {
            // the key expires on its own
            tracing::debug!("Failed to release key '{}' on adapter {}: {}", key, idx, e);
        }
    }
}
