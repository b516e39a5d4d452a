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

use redlock::{LockError, LockToken, StoreAdapter};
use redlock_redis::{RedisStore, new_with_redis};
use std::time::Duration;

fn local_redis_url() -> String {
    std::env::var("REDLOCK_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Keys are unique per run so tests do not see each other's leftovers
fn unique_key(prefix: &str) -> String {
    format!("redlock-test:{prefix}:{}", LockToken::generate().unwrap())
}

#[tokio::test]
#[ignore = "requires running Redis at REDLOCK_TEST_REDIS_URL"]
async fn test_set_nx_and_owner_release() {
    init_tracing();
    let store = RedisStore::connect(&local_redis_url()).await.unwrap();
    let key = unique_key("store");

    assert!(store.try_set(&key, "T1", Duration::from_secs(5)).await.unwrap());
    assert!(!store.try_set(&key, "T2", Duration::from_secs(5)).await.unwrap());

    // foreign token leaves the key in place
    store.release_if_owner(&key, "T2").await.unwrap();
    assert!(!store.try_set(&key, "T3", Duration::from_secs(5)).await.unwrap());

    store.release_if_owner(&key, "T1").await.unwrap();
    assert!(store.try_set(&key, "T4", Duration::from_secs(5)).await.unwrap());
    store.release_if_owner(&key, "T4").await.unwrap();
}

#[tokio::test]
#[ignore = "requires running Redis at REDLOCK_TEST_REDIS_URL"]
async fn test_single_lock() {
    init_tracing();
    let url = local_redis_url();
    let key = unique_key("lock");
    let m0 = new_with_redis(key.clone(), &[url.as_str()]).await.unwrap();
    let m1 = new_with_redis(key, &[url.as_str()]).await.unwrap();

    m0.lock().await.unwrap();
    assert!(matches!(m1.lock().await, Err(LockError::GaveUp { .. })));
    m0.unlock().await;
}

#[tokio::test]
#[ignore = "requires running Redis at REDLOCK_TEST_REDIS_URL"]
async fn test_single_unlock() {
    init_tracing();
    let url = local_redis_url();
    let key = unique_key("unlock");
    let m0 = new_with_redis(key.clone(), &[url.as_str()]).await.unwrap();
    let m1 = new_with_redis(key, &[url.as_str()]).await.unwrap();

    m0.lock().await.unwrap();
    m0.unlock().await;

    m1.lock().await.unwrap();
    m1.unlock().await;
}

#[tokio::test]
#[ignore = "requires running Redis at REDLOCK_TEST_REDIS_URL"]
async fn test_single_expire() {
    init_tracing();
    let url = local_redis_url();
    let key = unique_key("expire");
    let m0 = new_with_redis(key.clone(), &[url.as_str()]).await.unwrap();
    let m1 = new_with_redis(key, &[url.as_str()]).await.unwrap();
    m0.set_expiration(Duration::from_millis(500)).unwrap();

    m0.lock().await.unwrap();
    assert!(matches!(m1.lock().await, Err(LockError::GaveUp { .. })));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    m1.lock().await.unwrap();
    m1.unlock().await;
    m0.unlock().await;
}
