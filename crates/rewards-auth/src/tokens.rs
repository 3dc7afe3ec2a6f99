//! Persisted identifier → bearer token map
//!
//! Older token files wrap values in stray double quotes; they are stripped
//! on read so the value can be sent as-is in the Authorization header.

use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::store::JsonMapStore;

pub struct TokenStore {
    store: JsonMapStore,
}

impl TokenStore {
    pub async fn load(path: PathBuf) -> Result<Self> {
        Ok(Self {
            store: JsonMapStore::load(path).await?,
        })
    }

    /// Cached token for `identifier`, if one was ever saved.
    pub async fn get(&self, identifier: &str) -> Option<String> {
        self.store
            .get(identifier)
            .await
            .map(|token| token.replace('"', ""))
            .filter(|token| !token.is_empty())
    }

    /// Record a freshly issued token and persist the map.
    pub async fn save(&self, identifier: &str, token: &str) -> Result<()> {
        debug!(account = identifier, "saving token");
        self.store
            .insert(identifier.to_owned(), token.to_owned())
            .await
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }
}
