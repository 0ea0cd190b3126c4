//! Binary store collaborators: the local cache and ranked remotes.
//!
//! Only existence checks and fetches are consumed here; how a store lays out
//! or transfers artifacts is its own business.

use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};
use kiln_schema::{PackageId, Reference};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// A store query failed (network, permissions, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store '{store}' unavailable: {message}")]
    Unavailable { store: String, message: String },

    #[error("binary {key} not found in '{store}'")]
    NotFound { store: String, key: BinaryKey },
}

/// Identifies one binary: a reference plus a package ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryKey {
    pub reference: Reference,
    pub package_id: String,
}

impl BinaryKey {
    pub fn new(reference: &Reference, package_id: &PackageId) -> Self {
        Self {
            reference: reference.clone(),
            package_id: package_id.as_str().to_string(),
        }
    }
}

impl fmt::Display for BinaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.reference, self.package_id)
    }
}

/// Handle to a fetched binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryHandle {
    pub key: BinaryKey,
    /// Name of the store that served the binary.
    pub store: String,
}

#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Whether a binary for `key` exists in this store.
    async fn exists(&self, key: &BinaryKey) -> Result<bool, StoreError>;

    /// Retrieve the binary for `key`.
    async fn fetch(&self, key: &BinaryKey) -> Result<BinaryHandle, StoreError>;
}

/// Where a binary was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local,
    Remote(String),
}

/// Result of locating one key across the local cache and the remotes.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub location: Option<Location>,
    /// Queries that failed along the way; they counted as misses.
    pub errors: Vec<StoreError>,
}

/// The local cache plus remotes in priority order (first = highest).
#[derive(Clone)]
pub struct BinaryStores {
    local: Arc<dyn BinaryStore>,
    remotes: Vec<Arc<dyn BinaryStore>>,
}

impl fmt::Debug for BinaryStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryStores")
            .field("local", &self.local.name())
            .field(
                "remotes",
                &self.remotes.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl BinaryStores {
    pub fn new(local: Arc<dyn BinaryStore>) -> Self {
        Self {
            local,
            remotes: Vec::new(),
        }
    }

    /// Append a remote with lower priority than the ones already added.
    pub fn with_remote(mut self, remote: Arc<dyn BinaryStore>) -> Self {
        self.remotes.push(remote);
        self
    }

    pub fn remote(&self, name: &str) -> Option<&Arc<dyn BinaryStore>> {
        self.remotes.iter().find(|r| r.name() == name)
    }

    /// Find `key`, preferring the local cache, then remotes by priority.
    ///
    /// Remote queries run concurrently but are consumed in priority order;
    /// as soon as the best available hit is known the remaining queries are
    /// dropped, which cancels them.
    pub async fn locate(&self, key: &BinaryKey) -> Lookup {
        let mut lookup = Lookup::default();

        match self.local.exists(key).await {
            Ok(true) => {
                lookup.location = Some(Location::Local);
                return lookup;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Local cache query for {key} failed, treated as not found: {e}");
                lookup.errors.push(e);
            }
        }

        let mut queries: FuturesOrdered<_> = self
            .remotes
            .iter()
            .map(|remote| async move { (remote.name().to_string(), remote.exists(key).await) })
            .collect();

        while let Some((name, result)) = queries.next().await {
            match result {
                Ok(true) => {
                    lookup.location = Some(Location::Remote(name));
                    return lookup;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Remote '{name}' query for {key} failed, treated as not found: {e}");
                    lookup.errors.push(e);
                }
            }
        }

        lookup
    }
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    binaries: RwLock<HashSet<BinaryKey>>,
    offline: RwLock<bool>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub async fn insert(&self, key: BinaryKey) {
        self.binaries.write().await.insert(key);
    }

    /// Make every query fail with [`StoreError::Unavailable`].
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.write().await = offline;
    }

    pub async fn len(&self) -> usize {
        self.binaries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.binaries.read().await.is_empty()
    }

    async fn check_online(&self) -> Result<(), StoreError> {
        if *self.offline.read().await {
            return Err(StoreError::Unavailable {
                store: self.name.clone(),
                message: "store is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BinaryStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &BinaryKey) -> Result<bool, StoreError> {
        self.check_online().await?;
        Ok(self.binaries.read().await.contains(key))
    }

    async fn fetch(&self, key: &BinaryKey) -> Result<BinaryHandle, StoreError> {
        self.check_online().await?;
        if self.binaries.read().await.contains(key) {
            Ok(BinaryHandle {
                key: key.clone(),
                store: self.name.clone(),
            })
        } else {
            Err(StoreError::NotFound {
                store: self.name.clone(),
                key: key.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schema::ConfigurationModel;

    fn key() -> BinaryKey {
        BinaryKey::new(
            &Reference::new("pkg", "0.1"),
            &PackageId::compute(&ConfigurationModel::new()),
        )
    }

    #[tokio::test]
    async fn local_hit_wins() {
        let local = Arc::new(MemoryStore::new("local"));
        let remote = Arc::new(MemoryStore::new("remote"));
        local.insert(key()).await;
        remote.insert(key()).await;

        let stores = BinaryStores::new(local).with_remote(remote);
        let lookup = stores.locate(&key()).await;
        assert_eq!(lookup.location, Some(Location::Local));
    }

    #[tokio::test]
    async fn remotes_are_ranked() {
        let first = Arc::new(MemoryStore::new("first"));
        let second = Arc::new(MemoryStore::new("second"));
        first.insert(key()).await;
        second.insert(key()).await;

        let stores = BinaryStores::new(Arc::new(MemoryStore::new("local")))
            .with_remote(second.clone())
            .with_remote(first.clone());
        let lookup = stores.locate(&key()).await;
        assert_eq!(lookup.location, Some(Location::Remote("second".to_string())));
    }

    #[tokio::test]
    async fn unavailable_store_counts_as_miss() {
        let broken = Arc::new(MemoryStore::new("broken"));
        broken.insert(key()).await;
        broken.set_offline(true).await;
        let backup = Arc::new(MemoryStore::new("backup"));
        backup.insert(key()).await;

        let stores = BinaryStores::new(Arc::new(MemoryStore::new("local")))
            .with_remote(broken)
            .with_remote(backup);
        let lookup = stores.locate(&key()).await;
        assert_eq!(lookup.location, Some(Location::Remote("backup".to_string())));
        assert_eq!(lookup.errors.len(), 1);
        assert!(matches!(lookup.errors[0], StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn fetch_reports_missing_binary() {
        let store = MemoryStore::new("local");
        assert!(matches!(
            store.fetch(&key()).await,
            Err(StoreError::NotFound { .. })
        ));
        store.insert(key()).await;
        assert_eq!(store.fetch(&key()).await.unwrap().store, "local");
    }
}
