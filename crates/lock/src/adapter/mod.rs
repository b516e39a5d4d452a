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

pub mod memory;

use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::MutexOptions,
    error::{LockError, Result},
    mutex::Mutex,
    quorum::quorum_threshold,
};

/// Store adapter trait
///
/// Both operations must be atomic on the backing store.
#[async_trait]
pub trait StoreAdapter: Send + Sync + std::fmt::Debug {
    /// Write `value` under `key` with expiry `ttl` only if `key` is absent.
    /// Returns whether the write happened.
    async fn try_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it currently holds `expected`.
    /// A mismatch or a missing key is not an error.
    async fn release_if_owner(&self, key: &str, expected: &str) -> Result<()>;

    /// Deadline applied to every call on this adapter
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Label used in logs and errors
    fn name(&self) -> String {
        "store".to_string()
    }
}

/// Fixed, ordered set of store adapters shared by the mutexes built on it
#[derive(Debug, Clone)]
pub struct Adapters(Arc<[Arc<dyn StoreAdapter>]>);

impl Adapters {
    /// Build the set; fails with no adapters
    pub fn new(adapters: Vec<Arc<dyn StoreAdapter>>) -> Result<Self> {
        if adapters.is_empty() {
            return Err(LockError::NoAdapters);
        }
        Ok(Self(adapters.into()))
    }

    /// Majority needed over this set
    pub fn quorum(&self) -> usize {
        quorum_threshold(self.0.len())
    }

    /// Create a mutex on `key` backed by this set
    pub fn new_mutex(&self, key: impl Into<String>) -> Mutex {
        Mutex::from_adapters(key.into(), self.clone(), Default::default())
    }

    /// Create a mutex on `key` with explicit options; fails if they do not validate
    pub fn new_mutex_with_options(&self, key: impl Into<String>, options: MutexOptions) -> Result<Mutex> {
        options.validate()?;
        Ok(Mutex::from_adapters(key.into(), self.clone(), options))
    }
}

impl Deref for Adapters {
    type Target = [Arc<dyn StoreAdapter>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
