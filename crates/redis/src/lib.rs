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

//! Redis store adapter for [`redlock::Mutex`].
//!
//! The conditional set is `SET key token NX PX ttl`; the compare-and-delete
//! runs as a server-side Lua script so the read and the delete are one step.

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use redlock::{LockError, Mutex, Result, StoreAdapter};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Per-call deadline applied unless overridden
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

pub const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#;

static UNLOCK: LazyLock<Script> = LazyLock::new(|| Script::new(UNLOCK_SCRIPT));

/// Store adapter over one Redis server
#[derive(Clone)]
pub struct RedisStore {
    name: String,
    conn: ConnectionManager,
    timeout: Option<Duration>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connect to `url` (`redis://[user:password@]host:port/db`)
    pub async fn connect(url: &str) -> Result<Self> {
        let name = redact_url(url);
        let client = redis::Client::open(url).map_err(|e| LockError::store_with_source(&name, "invalid redis url", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::store_with_source(&name, "connect failed", e))?;
        tracing::debug!("Connected redis store {}", name);
        Ok(Self::from_connection(name, conn))
    }

    /// Wrap an existing connection manager
    pub fn from_connection(name: impl Into<String>, conn: ConnectionManager) -> Self {
        Self {
            name: name.into(),
            conn,
            timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }

    /// Per-call deadline, `None` to wait indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn try_set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::store_with_source(&self.name, "SET NX failed", e))?;
        Ok(reply.is_some())
    }

    async fn release_if_owner(&self, key: &str, expected: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _deleted: i64 = UNLOCK
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::store_with_source(&self.name, "unlock script failed", e))?;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Connect to every url and build a mutex on `key` over them
pub async fn new_with_redis(key: impl Into<String>, urls: &[&str]) -> Result<Mutex> {
    if urls.is_empty() {
        return Err(LockError::NoAdapters);
    }
    let mut adapters: Vec<Arc<dyn StoreAdapter>> = Vec::with_capacity(urls.len());
    for url in urls {
        adapters.push(Arc::new(RedisStore::connect(url).await?));
    }
    Mutex::new(key, adapters)
}

/// Drop credentials from a redis url so it can be logged
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => format!("{}{}", &url[..scheme_end + 3], &url[at + 1..]),
        _ => url.to_string(),
    }
}
