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

//! Distributed mutual exclusion acquired by majority quorum across N
//! independent key-value stores (the redlock algorithm).
//!
//! ```no_run
//! # async fn demo() -> redlock::Result<()> {
//! use redlock::{MemoryStore, Mutex, StoreAdapter};
//! use std::sync::Arc;
//!
//! let stores: Vec<Arc<dyn StoreAdapter>> = (0..3).map(|_| Arc::new(MemoryStore::new()) as Arc<dyn StoreAdapter>).collect();
//! let mutex = Mutex::new("orders", stores)?;
//!
//! mutex.lock().await?;
//! // critical section
//! mutex.unlock().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Core Module Declarations
// ============================================================================

// Application Layer Modules
pub mod mutex;

// Abstraction Layer Modules
pub mod adapter;

// Protocol Modules
pub mod drift;
pub mod quorum;
pub mod retry;
pub mod token;

// Core Modules
pub mod config;
pub mod error;

// ============================================================================
// Public API Exports
// ============================================================================

pub use crate::{
    // Store interfaces
    adapter::{Adapters, StoreAdapter, memory::MemoryStore},
    // Configuration
    config::{
        DEFAULT_DRIFT_FACTOR, DEFAULT_DRIFT_MINIMUM, DEFAULT_EXPIRATION, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_JITTER_BOUND,
        MAX_EXPIRATION, MutexOptions,
    },
    drift::DriftEstimator,
    // Error types
    error::{LockError, Result},
    // Main components
    mutex::{Mutex, MutexGuard},
    quorum::{AttemptOutcome, quorum_threshold},
    retry::RetryPolicy,
    token::LockToken,
};

pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Version Information
// ============================================================================

/// Current version of the lock crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
