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

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::{
    adapter::StoreAdapter,
    error::{LockError, Result},
};

/// stored value entry
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-process store adapter with per-key expiry
///
/// Expired keys are treated as absent and dropped lazily. Offline mode and
/// injected latency make it usable as a faulty voter in tests.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: Mutex<HashMap<String, MemoryEntry>>,
    offline: AtomicBool,
    latency_nanos: AtomicU64,
    timeout: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// create new memory store
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// create new memory store with a log label
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            latency_nanos: AtomicU64::new(0),
            timeout: None,
        }
    }

    /// Deadline the quorum coordinator applies to calls on this store
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// When offline every call fails with a store error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay injected before every call
    pub fn set_latency(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.store(nanos, Ordering::SeqCst);
    }

    /// Current unexpired value under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Drop every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of unexpired keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn simulate_io(&self) -> Result<()> {
        let latency = self.latency_nanos.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_nanos(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(LockError::store(&self.name, "store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn try_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.simulate_io().await?;

        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| LockError::store(&self.name, format!("ttl {ttl:?} out of range")))?;
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key)
            && !entry.is_expired(now)
        {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        tracing::debug!("Key '{}' set on {} for {:?}", key, self.name, ttl);
        Ok(true)
    }

    async fn release_if_owner(&self, key: &str, expected: &str) -> Result<()> {
        self.simulate_io().await?;

        let now = Instant::now();
        let mut entries = self.entries.lock();
        let owned = entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now) && entry.value == expected);
        if owned {
            entries.remove(key);
            tracing::debug!("Key '{}' released on {}", key, self.name);
        }
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
