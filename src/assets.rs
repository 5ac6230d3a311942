//! Icon asset cache (C11).
//!
//! A bounded cache in front of an OS icon lookup. The OS-specific lookup
//! itself is an external collaborator (spec.md §1); this module owns the
//! cache and the miss/error plumbing so ASSET_REQUEST handling never
//! blocks on repeated lookups for the same process.
//!
//! Grounded on `persona.rs`'s `Arc<RwLock<T>>` shared-state shape, with
//! a plain `Vec`-backed recency list rather than pulling in an `lru`
//! crate — the teacher's own caches (session/client maps in
//! `transport_udp.rs`) are hand-rolled `HashMap`s behind an async lock,
//! not third-party collection crates.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    NotAvailable,
    Backend(String),
}

#[async_trait]
pub trait AssetProvider: Send + Sync {
    async fn fetch_icon(&self, process_name: &str) -> Result<Vec<u8>, AssetError>;
}

/// Always reports icons unavailable. Used when no real OS icon lookup
/// is wired in (e.g. running the mock audio backend standalone).
pub struct UnavailableAssetProvider;

#[async_trait]
impl AssetProvider for UnavailableAssetProvider {
    async fn fetch_icon(&self, _process_name: &str) -> Result<Vec<u8>, AssetError> {
        Err(AssetError::NotAvailable)
    }
}

struct CacheInner {
    entries: HashMap<String, Vec<u8>>,
    /// Most-recently-used last; eviction pops from the front.
    recency: Vec<String>,
}

/// Bounded LRU cache of process-name -> icon bytes, backed by a
/// fallible `AssetProvider` for cache misses.
pub struct AssetCache {
    inner: RwLock<CacheInner>,
    provider: Arc<dyn AssetProvider>,
}

impl AssetCache {
    pub fn new(provider: Arc<dyn AssetProvider>) -> Arc<Self> {
        Arc::new(Self { inner: RwLock::new(CacheInner { entries: HashMap::new(), recency: Vec::new() }), provider })
    }

    /// Look up the icon for `process_name`, consulting the cache first
    /// and falling back to the provider on a miss. A provider failure is
    /// not cached — the next call retries.
    pub async fn get(&self, process_name: &str) -> Result<Vec<u8>, AssetError> {
        {
            let mut guard = self.inner.write().await;
            if let Some(bytes) = guard.entries.get(process_name).cloned() {
                guard.touch(process_name);
                return Ok(bytes);
            }
        }

        let bytes = self.provider.fetch_icon(process_name).await?;

        let mut guard = self.inner.write().await;
        guard.insert(process_name.to_string(), bytes.clone());
        Ok(bytes)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

impl CacheInner {
    fn touch(&mut self, process_name: &str) {
        if let Some(pos) = self.recency.iter().position(|n| n == process_name) {
            let name = self.recency.remove(pos);
            self.recency.push(name);
        }
    }

    fn insert(&mut self, process_name: String, bytes: Vec<u8>) {
        if self.entries.contains_key(&process_name) {
            self.entries.insert(process_name.clone(), bytes);
            self.touch(&process_name);
            return;
        }

        if self.entries.len() >= CACHE_CAPACITY {
            if let Some(oldest) = self.recency.first().cloned() {
                self.recency.remove(0);
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(process_name.clone(), bytes);
        self.recency.push(process_name);
    }
}
