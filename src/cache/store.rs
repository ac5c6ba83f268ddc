//! Keyed client-side cache of server-derived data.
//!
//! Each entry holds the last fetched JSON value for a [`QueryKey`] together
//! with the fetcher a view registered for it. Views keep an [`Observer`]
//! alive while mounted; an entry with at least one live observer is
//! *active*. Invalidation marks entries stale and, depending on
//! [`RefetchType`], starts a background refetch. A refetch result is only
//! applied if no newer invalidation or removal happened in the meantime.
//!
//! Every mutation is published as a [`CacheEvent`] on a broadcast channel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::key::{QueryFilter, QueryKey};
use crate::Result;

/// Boxed future produced by a [`Fetcher`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Produces fresh data for one cache key.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

const EVENT_CAPACITY: usize = 256;

/// Which invalidated entries are refetched immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchType {
    /// Every matched entry with a registered fetcher.
    All,
    /// Only entries with at least one live observer.
    Active,
    /// Mark stale only; the next observer triggers the fetch.
    None,
}

/// Cache activity notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// New data was written to the key.
    Updated(QueryKey),
    /// The key was marked stale.
    Invalidated(QueryKey),
    /// A refetch for the key started.
    Refetching(QueryKey),
    /// The key was dropped from the cache.
    Removed(QueryKey),
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryState {
    /// Last fetched or written value.
    pub data: Option<Value>,
    /// Set by invalidation, cleared by a successful fetch or write.
    pub stale: bool,
    /// A refetch is in flight.
    pub fetching: bool,
    /// Live observer count.
    pub observers: usize,
    /// Bumped on every invalidation and write.
    pub generation: u64,
    /// Time of the last successful write.
    pub updated_at: Option<Instant>,
}

#[derive(Default)]
struct Entry {
    data: Option<Value>,
    stale: bool,
    fetching: bool,
    observers: usize,
    generation: u64,
    updated_at: Option<Instant>,
    fetcher: Option<Fetcher>,
}

impl Entry {
    fn state(&self) -> EntryState {
        EntryState {
            data: self.data.clone(),
            stale: self.stale,
            fetching: self.fetching,
            observers: self.observers,
            generation: self.generation,
            updated_at: self.updated_at,
        }
    }
}

/// Process-wide query cache.
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    events: broadcast::Sender<CacheEvent>,
    this: Weak<QueryCache>,
}

impl QueryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new_cyclic(|this| Self {
            entries: Mutex::new(HashMap::new()),
            events,
            this: this.clone(),
        })
    }

    /// Receive every subsequent [`CacheEvent`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Cached value for `key`.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.lock().get(key).and_then(|e| e.data.clone())
    }

    /// Cached value for `key`, decoded into `T`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if the stored value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Entry metadata for `key`.
    #[must_use]
    pub fn state(&self, key: &QueryKey) -> Option<EntryState> {
        self.lock().get(key).map(Entry::state)
    }

    /// Whether `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys selected by `filter`, sorted.
    #[must_use]
    pub fn keys_matching(&self, filter: &QueryFilter) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .lock()
            .keys()
            .filter(|k| filter.matches(k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Write `value` to `key`, clearing staleness and superseding any
    /// in-flight refetch.
    pub fn set_data(&self, key: QueryKey, value: Value) {
        {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_default();
            entry.data = Some(value);
            entry.stale = false;
            entry.fetching = false;
            entry.generation += 1;
            entry.updated_at = Some(Instant::now());
        }
        debug!(%key, "cache entry written");
        self.emit(CacheEvent::Updated(key));
    }

    /// Serialize `value` and write it to `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if `value` cannot be serialized.
    pub fn set_as<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_data(key, value);
        Ok(())
    }

    /// Drop a single key. Returns whether it was present.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            debug!(%key, "cache entry removed");
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Drop every key selected by `filter`; returns the removed keys.
    pub fn remove_queries(&self, filter: &QueryFilter) -> Vec<QueryKey> {
        let removed: Vec<QueryKey> = {
            let mut entries = self.lock();
            let mut keys: Vec<QueryKey> =
                entries.keys().filter(|k| filter.matches(k)).cloned().collect();
            keys.sort();
            for key in &keys {
                entries.remove(key);
            }
            keys
        };
        for key in &removed {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Mark every key selected by `filter` stale and start refetches per
    /// `refetch`. Returns the invalidated keys.
    ///
    /// Invalidating an already-stale entry is harmless: it bumps the
    /// generation and at most restarts its refetch.
    pub fn invalidate_queries(&self, filter: &QueryFilter, refetch: RefetchType) -> Vec<QueryKey> {
        let mut invalidated = Vec::new();
        let mut to_fetch = Vec::new();
        {
            let mut entries = self.lock();
            for (key, entry) in entries.iter_mut().filter(|(k, _)| filter.matches(k)) {
                entry.stale = true;
                entry.generation += 1;
                invalidated.push(key.clone());

                let wanted = match refetch {
                    RefetchType::All => true,
                    RefetchType::Active => entry.observers > 0,
                    RefetchType::None => false,
                };
                if let (true, Some(fetcher)) = (wanted, entry.fetcher.as_ref()) {
                    entry.fetching = true;
                    to_fetch.push((key.clone(), entry.generation, Arc::clone(fetcher)));
                }
            }
        }
        invalidated.sort();
        to_fetch.sort_by(|a, b| a.0.cmp(&b.0));

        debug!(
            filter = %filter.key(),
            matched = invalidated.len(),
            refetching = to_fetch.len(),
            ?refetch,
            "cache invalidation"
        );

        for key in &invalidated {
            self.emit(CacheEvent::Invalidated(key.clone()));
        }
        for (key, generation, fetcher) in to_fetch {
            self.spawn_fetch(key, generation, fetcher);
        }
        invalidated
    }

    /// Register `fetcher` for `key` and attach an observer. Starts a fetch
    /// when the entry has no data yet or is stale.
    pub fn observe(&self, key: QueryKey, fetcher: Fetcher) -> Observer {
        let start = {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_default();
            entry.observers += 1;
            entry.fetcher = Some(Arc::clone(&fetcher));
            let needs_fetch = (entry.data.is_none() || entry.stale) && !entry.fetching;
            if needs_fetch {
                entry.fetching = true;
            }
            needs_fetch.then_some(entry.generation)
        };
        if let Some(generation) = start {
            self.spawn_fetch(key.clone(), generation, fetcher);
        }
        Observer {
            key,
            cache: self.this.clone(),
        }
    }

    /// Run the registered fetcher for `key` and store its result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no fetcher is registered for `key`, or
    /// the fetcher's own error.
    pub async fn fetch(&self, key: &QueryKey) -> Result<Value> {
        let (generation, fetcher) = {
            let mut entries = self.lock();
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| crate::AppError::NotFound(format!("cache key {key}")))?;
            let fetcher = entry
                .fetcher
                .clone()
                .ok_or_else(|| crate::AppError::NotFound(format!("fetcher for {key}")))?;
            entry.fetching = true;
            (entry.generation, fetcher)
        };
        let result = fetcher().await;
        self.complete_fetch(key, generation, result.clone());
        result
    }

    fn spawn_fetch(&self, key: QueryKey, generation: u64, fetcher: Fetcher) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%key, "no tokio runtime; refetch deferred until next observe");
            if let Some(entry) = self.lock().get_mut(&key) {
                entry.fetching = false;
            }
            return;
        };

        self.emit(CacheEvent::Refetching(key.clone()));
        let cache = self.this.clone();
        runtime.spawn(async move {
            let result = fetcher().await;
            if let Some(cache) = cache.upgrade() {
                cache.complete_fetch(&key, generation, result);
            }
        });
    }

    fn complete_fetch(&self, key: &QueryKey, generation: u64, result: Result<Value>) {
        let applied = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                debug!(%key, "fetch result dropped; entry removed");
                return;
            };
            if entry.generation != generation {
                debug!(%key, generation, current = entry.generation, "stale fetch result dropped");
                return;
            }
            entry.fetching = false;
            match result {
                Ok(value) => {
                    entry.data = Some(value);
                    entry.stale = false;
                    entry.updated_at = Some(Instant::now());
                    true
                }
                Err(err) => {
                    warn!(%key, %err, "cache refetch failed; keeping stale data");
                    false
                }
            }
        };
        if applied {
            self.emit(CacheEvent::Updated(key.clone()));
        }
    }

    fn release(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a cache entry active while alive.
#[derive(Debug)]
pub struct Observer {
    key: QueryKey,
    cache: Weak<QueryCache>,
}

impl Observer {
    /// Key this observer keeps active.
    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.release(&self.key);
        }
    }
}
