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

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    adapter::{Adapters, StoreAdapter},
    config::MutexOptions,
    drift::DriftEstimator,
    error::{LockError, Result},
    quorum,
    token::LockToken,
};

/// Local view of the lock held through this instance
#[derive(Debug)]
enum LockState {
    Unlocked,
    /// A `lock` call is fanning out
    Acquiring,
    Locked {
        token: LockToken,
        valid_until: Instant,
    },
    /// An `unlock` call is fanning out
    Releasing,
}

#[derive(Debug)]
struct Inner {
    options: MutexOptions,
    state: LockState,
}

/// Puts the state back to `Unlocked` when dropped while armed, so a lock or
/// unlock future dropped mid fan-out does not leave the instance stuck.
struct StateReset<'a> {
    inner: &'a parking_lot::Mutex<Inner>,
    armed: bool,
}

impl<'a> StateReset<'a> {
    fn new(inner: &'a parking_lot::Mutex<Inner>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().state = LockState::Unlocked;
        }
    }
}

/// Distributed mutex acquired by majority quorum over independent stores (redlock)
///
/// An instance is not re-entrant: `lock` on an instance that holds the lock
/// fails with [`LockError::LockedAlready`]. Every acquisition draws a fresh
/// [`LockToken`], and `unlock` only deletes keys still carrying that token.
///
/// The internal guard covers state transitions only; the fan-out to the
/// stores runs without it.
#[derive(Debug)]
pub struct Mutex {
    key: String,
    adapters: Adapters,
    inner: parking_lot::Mutex<Inner>,
}

impl Mutex {
    /// Create a mutex on `key` with default options
    pub fn new(key: impl Into<String>, adapters: Vec<Arc<dyn StoreAdapter>>) -> Result<Self> {
        Ok(Self::from_adapters(key.into(), Adapters::new(adapters)?, MutexOptions::default()))
    }

    /// Create a mutex on `key` with explicit options
    pub fn with_options(key: impl Into<String>, adapters: Vec<Arc<dyn StoreAdapter>>, options: MutexOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::from_adapters(key.into(), Adapters::new(adapters)?, options))
    }

    pub(crate) fn from_adapters(key: String, adapters: Adapters, options: MutexOptions) -> Self {
        Self {
            key,
            adapters,
            inner: parking_lot::Mutex::new(Inner {
                options,
                state: LockState::Unlocked,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    /// Number of stores that must accept the token
    pub fn quorum(&self) -> usize {
        self.adapters.quorum()
    }

    /// Snapshot of the options the next `lock` will use
    pub fn options(&self) -> MutexOptions {
        self.inner.lock().options.clone()
    }

    /// Set the validity requested by the next `lock`
    pub fn set_expiration(&self, expiration: Duration) -> Result<()> {
        self.update_options(|opts| opts.expiration = expiration)
    }

    /// Set the attempt budget of the next `lock`
    pub fn set_retry_count(&self, retry_count: usize) -> Result<()> {
        self.update_options(|opts| opts.retry_count = retry_count)
    }

    /// Set the jitter bound of the next `lock`
    pub fn set_retry_jitter_bound(&self, bound: Duration) -> Result<()> {
        self.update_options(|opts| opts.retry_jitter_bound = bound)
    }

    /// Apply `change` to a copy of the options and keep it only if it validates
    fn update_options(&self, change: impl FnOnce(&mut MutexOptions)) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut candidate = inner.options.clone();
        change(&mut candidate);
        candidate.validate()?;
        inner.options = candidate;
        Ok(())
    }

    /// Whether this instance believes it holds the lock
    pub fn is_locked(&self) -> bool {
        matches!(self.inner.lock().state, LockState::Locked { .. })
    }

    /// Conservative end of validity of the held lock
    pub fn valid_until(&self) -> Option<Instant> {
        match self.inner.lock().state {
            LockState::Locked { valid_until, .. } => Some(valid_until),
            _ => None,
        }
    }

    /// Acquire the lock, retrying within the configured budget
    pub async fn lock(&self) -> Result<()> {
        self.acquire(None).await.map(drop)
    }

    /// Acquire the lock; `cancel` short-circuits the retry loop between attempts.
    /// The first attempt always runs.
    pub async fn lock_with_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        self.acquire(Some(cancel)).await.map(drop)
    }

    /// Acquire the lock and return a guard that releases it when dropped
    pub async fn lock_guard(&self) -> Result<MutexGuard<'_>> {
        let token = self.acquire(None).await?;
        Ok(MutexGuard {
            mutex: self,
            token,
            disarmed: false,
        })
    }

    /// Release the lock on every store and clear local state; a no-op when not locked
    pub async fn unlock(&self) {
        self.release(None).await
    }

    /// Release when locked; with `episode` set, only if the held token is that one
    async fn release(&self, episode: Option<&LockToken>) {
        let token = {
            let mut inner = self.inner.lock();
            match std::mem::replace(&mut inner.state, LockState::Releasing) {
                LockState::Locked { token, .. } if episode.is_none_or(|e| *e == token) => token,
                other => {
                    inner.state = other;
                    return;
                }
            }
        };
        let _reset = StateReset::new(&self.inner);

        quorum::release_all(&self.adapters, &self.key, &token).await;
        debug!("Released lock on '{}'", self.key);
    }

    async fn acquire(&self, cancel: Option<&CancellationToken>) -> Result<LockToken> {
        let options = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, LockState::Unlocked) {
                return Err(LockError::locked_already(&self.key));
            }
            inner.state = LockState::Acquiring;
            inner.options.clone()
        };
        let mut reset = StateReset::new(&self.inner);

        let (token, valid_until) = self.run_attempts(&options, cancel).await?;

        self.inner.lock().state = LockState::Locked {
            token: token.clone(),
            valid_until,
        };
        reset.disarm();
        Ok(token)
    }

    async fn run_attempts(&self, options: &MutexOptions, cancel: Option<&CancellationToken>) -> Result<(LockToken, Instant)> {
        let token = LockToken::generate()?;
        let quorum = self.adapters.quorum();
        let margin = options.drift().safety_margin(options.expiration);
        let retry = options.retry_policy();

        let mut last_errors = Vec::new();
        for attempt in 0..retry.attempts {
            if attempt > 0 {
                match cancel {
                    Some(cancel) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(LockError::Cancelled { key: self.key.clone() }),
                            _ = retry.backoff(attempt) => {}
                        }
                    }
                    None => retry.backoff(attempt).await,
                }
            }

            let start = Instant::now();
            let outcome = quorum::attempt_lock(&self.adapters, &self.key, &token, options.expiration).await;
            let elapsed = start.elapsed();
            let validity = DriftEstimator::remaining_validity(options.expiration, elapsed, margin);

            if outcome.reached(quorum)
                && let Some(validity) = validity
            {
                debug!(
                    "Acquired lock on '{}' with {}/{} stores, valid for {:?}",
                    self.key,
                    outcome.successes,
                    self.adapters.len(),
                    validity
                );
                return Ok((token, start + elapsed + validity));
            }

            debug!(
                "Lock attempt {} on '{}' failed: {}/{} stores (quorum {}), {} error(s), elapsed {:?}",
                attempt + 1,
                self.key,
                outcome.successes,
                self.adapters.len(),
                quorum,
                outcome.errors.len(),
                elapsed
            );
            quorum::release_all(&self.adapters, &self.key, &token).await;
            last_errors = outcome.errors;
        }

        let transient = last_errors.iter().filter(|e| e.is_retryable()).count();
        let fatal = last_errors.iter().filter(|e| e.is_fatal()).count();
        warn!(
            "Gave up lock on '{}' after {} attempt(s), last store errors ({} transient, {} fatal): {:?}",
            self.key,
            retry.attempts,
            transient,
            fatal,
            last_errors.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        Err(LockError::gave_up(&self.key, retry.attempts))
    }

    /// Clear local state now and release on the stores from a background task.
    /// Does nothing unless the held lock is still the episode of `token`.
    fn release_in_background(&self, token: &LockToken) {
        {
            let mut inner = self.inner.lock();
            if !matches!(&inner.state, LockState::Locked { token: held, .. } if held == token) {
                return;
            }
            inner.state = LockState::Unlocked;
        }
        let token = token.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let adapters = self.adapters.clone();
                let key = self.key.clone();
                handle.spawn(async move {
                    quorum::release_all(&adapters, &key, &token).await;
                    debug!("MutexGuard background released '{}'", key);
                });
            }
            Err(_) => {
                warn!("No runtime to release '{}' from MutexGuard drop; keys expire with their TTL", self.key);
            }
        }
    }
}

/// RAII guard returned by [`Mutex::lock_guard`]
///
/// Dropping an armed guard clears the local state at once and releases the
/// stores asynchronously. Use [`MutexGuard::unlock`] to wait for the release.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    token: LockToken,
    disarmed: bool,
}

impl MutexGuard<'_> {
    pub fn mutex(&self) -> &Mutex {
        self.mutex
    }

    /// Release this guard's acquisition and wait for every store to answer
    pub async fn unlock(mut self) {
        self.disarmed = true;
        self.mutex.release(Some(&self.token)).await;
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if !self.disarmed {
            self.mutex.release_in_background(&self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryStore;

    fn memory_mutex(key: &str, n: usize) -> (Vec<Arc<MemoryStore>>, Mutex) {
        let stores: Vec<Arc<MemoryStore>> = (0..n).map(|i| Arc::new(MemoryStore::named(format!("memory-{i}")))).collect();
        let adapters = stores.iter().map(|s| s.clone() as Arc<dyn StoreAdapter>).collect();
        (stores, Mutex::new(key, adapters).unwrap())
    }

    #[test]
    fn test_requires_adapters() {
        assert!(matches!(Mutex::new("k", Vec::new()), Err(LockError::NoAdapters)));
    }

    #[test]
    fn test_with_options_validates() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let bad = MutexOptions::default().with_retry_count(0);
        assert!(matches!(
            Mutex::with_options("k", vec![store], bad),
            Err(LockError::Configuration { .. })
        ));
    }

    #[test]
    fn test_setters_update_next_lock_options() {
        let (_, mutex) = memory_mutex("k", 1);
        mutex.set_expiration(Duration::from_millis(500)).unwrap();
        mutex.set_retry_count(7).unwrap();
        mutex.set_retry_jitter_bound(Duration::from_millis(5)).unwrap();

        let opts = mutex.options();
        assert_eq!(opts.expiration, Duration::from_millis(500));
        assert_eq!(opts.retry_count, 7);
        assert_eq!(opts.retry_jitter_bound, Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_setters_reject_invalid_options() {
        let (stores, mutex) = memory_mutex("k", 1);

        assert!(matches!(mutex.set_retry_count(0), Err(LockError::Configuration { .. })));
        assert!(matches!(mutex.set_expiration(Duration::ZERO), Err(LockError::Configuration { .. })));
        assert!(matches!(mutex.set_expiration(Duration::MAX), Err(LockError::Configuration { .. })));

        // rejected values leave the previous options in place
        let opts = mutex.options();
        assert_eq!(opts.retry_count, crate::config::DEFAULT_RETRY_COUNT);
        assert_eq!(opts.expiration, crate::config::DEFAULT_EXPIRATION);

        mutex.lock().await.unwrap();
        assert!(stores[0].get("k").is_some());
        mutex.unlock().await;
    }

    #[tokio::test]
    async fn test_longest_expiration_locks() {
        let (stores, mutex) = memory_mutex("k", 3);
        mutex.set_expiration(crate::config::MAX_EXPIRATION).unwrap();

        mutex.lock().await.unwrap();
        assert!(mutex.valid_until().is_some());
        mutex.unlock().await;
        assert!(stores.iter().all(|s| s.is_empty()));
    }

    #[tokio::test]
    async fn test_lock_is_not_reentrant() {
        let (stores, mutex) = memory_mutex("k", 3);
        mutex.lock().await.unwrap();
        let token = stores[0].get("k");

        let err = mutex.lock().await.unwrap_err();
        assert!(matches!(err, LockError::LockedAlready { .. }));
        // no store was touched by the rejected call
        assert_eq!(stores[0].get("k"), token);
        assert!(mutex.is_locked());
    }

    #[tokio::test]
    async fn test_fresh_token_per_acquisition() {
        let (stores, mutex) = memory_mutex("k", 1);
        mutex.lock().await.unwrap();
        let first = stores[0].get("k").unwrap();
        mutex.unlock().await;

        mutex.lock().await.unwrap();
        let second = stores[0].get("k").unwrap();
        assert_ne!(first, second);
        mutex.unlock().await;
    }

    #[tokio::test]
    async fn test_valid_until_accounts_for_drift() {
        let (_, mutex) = memory_mutex("k", 3);
        mutex.set_expiration(Duration::from_secs(10)).unwrap();
        let before = Instant::now();
        mutex.lock().await.unwrap();

        let valid_until = mutex.valid_until().unwrap();
        // 10s minus 1% and 2ms
        assert!(valid_until <= Instant::now() + Duration::from_millis(9898));
        assert!(valid_until > before);

        mutex.unlock().await;
        assert!(mutex.valid_until().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_lock_on_same_instance_conflicts() {
        let (stores, mutex) = memory_mutex("k", 1);
        stores[0].set_latency(Duration::from_millis(200));
        let mutex = Arc::new(mutex);

        let first = {
            let mutex = mutex.clone();
            tokio::spawn(async move { mutex.lock().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(mutex.lock().await, Err(LockError::LockedAlready { .. })));
        first.await.unwrap().unwrap();
        assert!(mutex.is_locked());
    }

    #[tokio::test]
    async fn test_dropped_lock_future_resets_state() {
        let (stores, mutex) = memory_mutex("k", 1);
        stores[0].set_latency(Duration::from_millis(500));

        let res = tokio::time::timeout(Duration::from_millis(20), mutex.lock()).await;
        assert!(res.is_err());
        assert!(!mutex.is_locked());

        stores[0].set_latency(Duration::ZERO);
        mutex.lock().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_between_attempts() {
        let (stores, mutex) = memory_mutex("k", 1);
        stores[0].try_set("k", "someone-else", Duration::from_secs(30)).await.unwrap();
        mutex.set_retry_count(100).unwrap();
        mutex.set_retry_jitter_bound(Duration::from_millis(50)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        // first attempt still runs, the loop stops before the second
        let err = mutex.lock_with_cancel(&cancel).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled { .. }));
        assert!(!mutex.is_locked());
        assert_eq!(stores[0].get("k").as_deref(), Some("someone-else"));
    }

    #[tokio::test]
    async fn test_guard_drop_releases() {
        let (stores, mutex) = memory_mutex("k", 3);
        {
            let guard = mutex.lock_guard().await.unwrap();
            assert!(guard.mutex().is_locked());
        }
        assert!(!mutex.is_locked());

        // background release lands shortly after the drop
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(stores.iter().all(|s| s.get("k").is_none()));
    }

    #[tokio::test]
    async fn test_guard_explicit_unlock() {
        let (stores, mutex) = memory_mutex("k", 3);
        let guard = mutex.lock_guard().await.unwrap();
        guard.unlock().await;

        assert!(!mutex.is_locked());
        assert!(stores.iter().all(|s| s.get("k").is_none()));
    }

    #[tokio::test]
    async fn test_stale_guard_drop_keeps_later_lock() {
        let (stores, mutex) = memory_mutex("k", 3);
        let guard = mutex.lock_guard().await.unwrap();
        guard.mutex().unlock().await;

        mutex.lock().await.unwrap();
        let current = stores[0].get("k").unwrap();

        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(mutex.is_locked());
        assert!(stores.iter().all(|s| s.get("k").as_deref() == Some(current.as_str())));
        mutex.unlock().await;
    }

    #[tokio::test]
    async fn test_stale_guard_unlock_keeps_later_lock() {
        let (stores, mutex) = memory_mutex("k", 3);
        let guard = mutex.lock_guard().await.unwrap();
        mutex.unlock().await;
        mutex.lock().await.unwrap();

        guard.unlock().await;
        assert!(mutex.is_locked());
        assert!(stores.iter().all(|s| s.get("k").is_some()));
        mutex.unlock().await;
    }
}
