//! Per-account browser fingerprint
//!
//! Each account keeps one user agent for its whole life so the remote side
//! sees a stable device. The first assignment is derived from a SHA-256 of
//! the identifier, which spreads accounts across the pool and yields the
//! same choice again if the session file is ever lost.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::constants::{DEFAULT_USER_AGENTS, PLATFORM_PATTERNS};
use crate::error::Result;
use crate::store::JsonMapStore;

/// Platform derived from a user agent, sent in the `sec-ch-ua*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
    Unknown,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Unknown => "Unknown",
        }
    }
}

/// Resolve the platform of a user agent. First matching pattern wins.
pub fn resolve_platform(user_agent: &str) -> Platform {
    let lower = user_agent.to_lowercase();
    PLATFORM_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Unknown)
}

/// Pick the pool entry for `identifier`. `pool` must not be empty.
pub fn select_user_agent<'a>(pool: &'a [String], identifier: &str) -> &'a str {
    let digest = Sha256::digest(identifier.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(prefix) % pool.len() as u64) as usize;
    &pool[index]
}

/// Persisted identifier → user agent map.
pub struct SessionStore {
    store: JsonMapStore,
    pool: Vec<String>,
}

impl SessionStore {
    /// Load the session file. An empty `pool` falls back to
    /// [`DEFAULT_USER_AGENTS`].
    pub async fn load(path: PathBuf, pool: Vec<String>) -> Result<Self> {
        let pool = if pool.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            pool
        };
        Ok(Self {
            store: JsonMapStore::load(path).await?,
            pool,
        })
    }

    /// The user agent already assigned to `identifier`, if any.
    pub async fn user_agent(&self, identifier: &str) -> Option<String> {
        self.store.get(identifier).await
    }

    /// Return the assigned user agent, assigning and persisting one first if
    /// needed. A failed write is logged; the in-memory assignment still holds
    /// for the rest of the process.
    pub async fn assign(&self, identifier: &str) -> String {
        let (user_agent, created, persisted) = self
            .store
            .get_or_insert_with(identifier, || {
                select_user_agent(&self.pool, identifier).to_owned()
            })
            .await;

        if created {
            info!(account = identifier, "assigned new user agent");
        }
        if let Err(e) = persisted {
            warn!(account = identifier, error = %e, "failed to persist user agent");
        }
        user_agent
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }
}
