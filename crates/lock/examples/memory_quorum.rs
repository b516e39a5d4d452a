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

//! Two processes-worth of mutexes contending over five in-memory stores,
//! one of which is offline. Options come from `REDLOCK_*` environment variables.
//!
//! RUST_LOG=redlock=debug cargo run -p redlock --example memory_quorum

use redlock::{Adapters, LockError, MemoryStore, MutexOptions, StoreAdapter};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let stores: Vec<Arc<MemoryStore>> = (0..5).map(|i| Arc::new(MemoryStore::named(format!("memory-{i}")))).collect();
    stores[4].set_offline(true);
    let adapters = Adapters::new(stores.iter().map(|s| s.clone() as Arc<dyn StoreAdapter>).collect())?;

    let options = MutexOptions::from_env();
    println!("Options: {options:?}, quorum {}/{}", adapters.quorum(), adapters.len());

    let first = adapters.new_mutex_with_options("demo-resource", options.clone())?;
    let second = adapters.new_mutex_with_options("demo-resource", options)?;

    // one offline voter fails every attempt under the strict error policy
    match first.lock().await {
        Ok(()) => println!("first: locked"),
        Err(LockError::GaveUp { attempts, .. }) => println!("first: gave up after {attempts} attempt(s) with a store offline"),
        Err(e) => return Err(e.into()),
    }

    stores[4].set_offline(false);
    first.lock().await?;
    println!("first: locked, valid until {:?}", first.valid_until());

    match second.lock().await {
        Err(LockError::GaveUp { .. }) => println!("second: gave up while first holds the lock"),
        other => println!("second: unexpected {other:?}"),
    }

    first.unlock().await;
    second.lock().await?;
    println!("second: locked after first released");
    second.unlock().await;

    Ok(())
}
