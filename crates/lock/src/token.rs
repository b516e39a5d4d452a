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

use base64::{Engine, engine::general_purpose::URL_SAFE};
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::fmt;

use crate::error::{LockError, Result};

/// Raw token length in bytes (192 bits of entropy)
pub const TOKEN_BYTES: usize = 24;

/// Ownership token written as the value of a locked key.
///
/// One token is drawn per acquisition episode, so a release can only ever
/// delete the key written by the same episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Draw a fresh token from the OS random source
    pub fn generate() -> Result<Self> {
        let mut buf = [0u8; TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut buf).map_err(LockError::entropy)?;
        Ok(Self(URL_SAFE.encode(buf)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
