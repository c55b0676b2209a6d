// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyed loading cache with single-flight loads
//!
//! Derived data (floating IPs for a node, the reserved placement-group
//! or security-group name for a node group) is expensive to compute and
//! queried from several provisioning workflows at once.  This cache
//! guarantees at most one loader invocation per key at a time:
//! concurrent callers for an in-flight key await the same load rather
//! than re-triggering it.  Loader failures propagate to every waiter
//! and are not cached, so the next `get` retries.  Entries live until
//! explicitly invalidated, which teardown paths do after destroying the
//! backing resource.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use slog::Logger;
use slog::debug;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Mutex;
use stratus_common::api::Error;

/// Computes the value for a cache key.  Implementations typically wrap
/// one provider listing call; see [`crate::loaders`].
#[async_trait]
pub trait Loader<K, V>: Send + Sync + 'static {
    async fn load(&self, key: &K) -> Result<V, Error>;
}

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, Error>>>;

enum Entry<V> {
    Ready(V),
    InFlight(SharedLoad<V>),
}

/// A keyed, loading cache.  Cheap to clone via `Arc` at construction
/// sites; internally the entry map is guarded by a mutex held only for
/// map operations, never across a load.
pub struct KeyedCache<K, V> {
    loader: Arc<dyn Loader<K, V>>,
    entries: Mutex<HashMap<K, Entry<V>>>,
    log: Logger,
}

impl<K, V> KeyedCache<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(loader: Arc<dyn Loader<K, V>>, log: Logger) -> KeyedCache<K, V> {
        KeyedCache { loader, entries: Mutex::new(HashMap::new()), log }
    }

    /// Returns the cached value for `key`, invoking the loader if no
    /// load has succeeded for it yet.
    ///
    /// If a load for `key` is already in flight, this awaits that load
    /// instead of starting another; all waiters observe the same
    /// result.  An `Err` result is returned to every waiter but never
    /// stored.
    pub async fn get(&self, key: &K) -> Result<V, Error> {
        let load = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get(key) {
                Some(Entry::Ready(value)) => return Ok(value.clone()),
                Some(Entry::InFlight(shared)) => shared.clone(),
                None => {
                    let loader = Arc::clone(&self.loader);
                    let owned_key = key.clone();
                    let shared = async move { loader.load(&owned_key).await }
                        .boxed()
                        .shared();
                    entries.insert(
                        key.clone(),
                        Entry::InFlight(shared.clone()),
                    );
                    shared
                }
            }
        };

        let result = load.clone().await;

        // Publish the outcome.  Every waiter runs this, so it must be
        // idempotent: only the load we actually awaited may replace the
        // in-flight entry, and an entry removed by `invalidate` while
        // the load ran stays removed.
        let mut entries = self.entries.lock().unwrap();
        if let Some(Entry::InFlight(current)) = entries.get(key) {
            if Shared::ptr_eq(current, &load) {
                match &result {
                    Ok(value) => {
                        entries.insert(key.clone(), Entry::Ready(value.clone()));
                    }
                    Err(error) => {
                        debug!(self.log, "cache load failed";
                            "key" => ?key, "error" => %error);
                        entries.remove(key);
                    }
                }
            }
        }
        result
    }

    /// Returns the value only if a load for `key` has already
    /// completed successfully.
    pub fn get_if_cached(&self, key: &K) -> Option<V> {
        match self.entries.lock().unwrap().get(key) {
            Some(Entry::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Drops any entry for `key`; the next `get` reloads.  Called after
    /// destructive operations so the cache never serves derived data
    /// for a resource that no longer exists.
    pub fn invalidate(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().unwrap().clear();
    }
}
