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
use thiserror::Error;

/// Lock operation related error types
#[derive(Error, Debug)]
pub enum LockError {
    /// `lock` called while this instance already holds (or is acquiring) the lock
    #[error("Lock on '{key}' is held already by this mutex")]
    LockedAlready { key: String },

    /// Every acquisition attempt failed
    #[error("Gave up lock on '{key}' after {attempts} attempt(s)")]
    GaveUp { key: String, attempts: usize },

    /// The random source could not produce an ownership token
    #[error("Entropy source failure: {message}")]
    Entropy {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single store adapter failed
    #[error("Store error on {adapter}: {message}")]
    Store {
        adapter: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single store adapter did not answer within its own deadline
    #[error("Store {adapter} timed out after {timeout:?}")]
    Timeout { adapter: String, timeout: Duration },

    /// Quorum over zero voters is undefined
    #[error("At least one store adapter is required")]
    NoAdapters,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Caller cancelled the acquisition loop
    #[error("Lock acquisition on '{key}' cancelled")]
    Cancelled { key: String },
}

impl LockError {
    /// Create store error without an underlying cause
    pub fn store(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            adapter: adapter.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create store error wrapping the client error
    pub fn store_with_source(
        adapter: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            adapter: adapter.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create timeout error
    pub fn timeout(adapter: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            adapter: adapter.into(),
            timeout,
        }
    }

    /// Create entropy error
    pub fn entropy(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Entropy {
            message: source.to_string(),
            source: Box::new(source),
        }
    }

    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create lock already held error
    pub fn locked_already(key: impl Into<String>) -> Self {
        Self::LockedAlready { key: key.into() }
    }

    /// Create gave up error
    pub fn gave_up(key: impl Into<String>, attempts: usize) -> Self {
        Self::GaveUp {
            key: key.into(),
            attempts,
        }
    }

    /// Check if it is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Timeout { .. })
    }

    /// Check if it is a fatal error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Entropy { .. } | Self::Configuration { .. } | Self::NoAdapters)
    }
}

/// Lock operation Result type
pub type Result<T> = std::result::Result<T, LockError>;
