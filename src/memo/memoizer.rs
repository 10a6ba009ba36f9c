//! The memoized wrapper
//!
//! Every [`Memoized`] owns a private map from [`CacheKey`] to the stored result. Each
//! store gets a fresh generation number and its own expiry action on the scheduler; the
//! action removes the entry only while that generation is still the one stored, so a
//! stale timer never deletes a newer result stored under the same key.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, warn};

use super::error::MemoizeError;
use super::key::{CacheKey, KeyStrategy};
use crate::scheduler::{Scheduler, TokioScheduler};

/// Function whose results are memoized
pub type MemoFn<A, R> = Arc<dyn Fn(&A) -> R + Send + Sync>;

/// A pending computation that every caller of the same key shares
pub type SharedFuture<T> = Shared<BoxFuture<'static, T>>;

/// Hit and miss counters of a wrapper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls answered from the cache
    pub hits: u64,
    /// Calls that invoked the wrapped function
    pub misses: u64,
}

struct Entry<R> {
    value: R,
    generation: u64,
    /// `None` when the deadline lies beyond what `Instant` can represent
    expires_at: Option<Instant>,
}

impl<R> Entry<R> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

struct Store<R> {
    entries: HashMap<CacheKey, Entry<R>>,
    next_generation: u64,
    stats: CacheStats,
    /// Set once the scheduler dropped an expiry action; stores then sweep expired entries
    sweep_on_store: bool,
}

impl<R> Store<R> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 0,
            stats: CacheStats::default(),
            sweep_on_store: false,
        }
    }

    /// Removes the entry for `key` if it still belongs to `generation`
    fn remove_generation(&mut self, key: &CacheKey, generation: u64) -> bool {
        let current = self.entries.get(key).map(|entry| entry.generation) == Some(generation);
        if current {
            self.entries.remove(key);
        }
        current
    }
}

fn lock<R>(store: &Mutex<Store<R>>) -> MutexGuard<'_, Store<R>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A function wrapped with a time-limited result cache
///
/// Calls with the same cache key inside the timeout window return a clone of the first
/// result without invoking the function again. The entry disappears once the timeout has
/// elapsed, measured from the moment it was stored; at exactly the timeout it is already
/// gone. A cached value counts as present whatever it is, including `None`, `0`, `false`
/// and empty strings.
///
/// Clones share the same cache.
pub struct Memoized<A, R> {
    func: MemoFn<A, R>,
    keys: KeyStrategy<A>,
    timeout: Duration,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<Mutex<Store<R>>>,
}

impl<A, R> Memoized<A, R>
where
    R: Clone + Send + 'static,
{
    /// Wraps `func`, expiring results on the tokio runtime
    pub fn new<F>(func: F, keys: KeyStrategy<A>, timeout: Duration) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self::from_parts(Arc::new(func), keys, timeout, Arc::new(TokioScheduler))
    }

    /// Starts a builder that validates its configuration on [`MemoizedBuilder::build`]
    pub fn builder() -> MemoizedBuilder<A, R> {
        MemoizedBuilder::default()
    }

    pub(crate) fn from_parts(
        func: MemoFn<A, R>,
        keys: KeyStrategy<A>,
        timeout: Duration,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            func,
            keys,
            timeout,
            scheduler,
            store: Arc::new(Mutex::new(Store::new())),
        }
    }

    /// Calls the wrapped function, or returns the cached result for these arguments
    ///
    /// Every return value is cached, `Err` included. For functions returning `Result`
    /// use [`Memoized::try_call`], which leaves failures uncached.
    pub fn call(&self, args: A) -> R {
        let Some(key) = self.derive_key(&args) else {
            return (self.func)(&args);
        };

        if let Some((value, _)) = self.lookup(&key, |value| Some(value.clone())) {
            return value;
        }

        let value = (self.func)(&args);
        self.store(key, value.clone());
        value
    }

    /// How long each result stays cached
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The key strategy used for calls
    pub fn key_strategy(&self) -> &KeyStrategy<A> {
        &self.keys
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let now = self.scheduler.now();
        lock(&self.store)
            .entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Returns true if no unexpired entry is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit and miss counters since construction
    pub fn stats(&self) -> CacheStats {
        lock(&self.store).stats
    }

    fn derive_key(&self, args: &A) -> Option<CacheKey> {
        match self.keys.derive(args) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(error = %err, "failed to serialize arguments, calling without cache");
                None
            }
        }
    }

    /// Looks up a live entry, projecting its value with `project`
    ///
    /// Entries that have reached their deadline are removed here even if their timer has
    /// not fired yet. A projection returning `None` counts as a miss.
    fn lookup<V>(
        &self,
        key: &CacheKey,
        project: impl FnOnce(&R) -> Option<V>,
    ) -> Option<(V, u64)> {
        let now = self.scheduler.now();
        let mut guard = lock(&self.store);
        let store = &mut *guard;

        let found = match store.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                project(&entry.value).map(|value| (value, entry.generation))
            }
            Some(_) => {
                store.entries.remove(key);
                None
            }
            None => None,
        };

        if found.is_some() {
            store.stats.hits += 1;
            debug!(key = %key, "memoized hit");
        } else {
            store.stats.misses += 1;
            debug!(key = %key, "memoized miss");
        }
        found
    }

    /// Stores `value` under `key` and schedules its expiry, returning its generation
    ///
    /// A timeout too large to form a deadline keeps the entry for the wrapper's lifetime.
    fn store(&self, key: CacheKey, value: R) -> u64 {
        let now = self.scheduler.now();
        let expires_at = now.checked_add(self.timeout);
        let generation = {
            let mut store = lock(&self.store);
            if store.sweep_on_store {
                store.entries.retain(|_, entry| entry.is_live(now));
            }
            let generation = store.next_generation;
            store.next_generation += 1;
            store.entries.insert(
                key.clone(),
                Entry {
                    value,
                    generation,
                    expires_at,
                },
            );
            generation
        };

        if expires_at.is_none() {
            return generation;
        }

        let store: Weak<Mutex<Store<R>>> = Arc::downgrade(&self.store);
        let scheduled = self.scheduler.schedule(
            self.timeout,
            Box::new(move || {
                // The wrapper may already be gone.
                let Some(store) = store.upgrade() else {
                    return;
                };
                if lock(&store).remove_generation(&key, generation) {
                    debug!(key = %key, "memoized entry expired");
                }
            }),
        );

        if !scheduled {
            lock(&self.store).sweep_on_store = true;
        }

        generation
    }

    fn evict(&self, key: &CacheKey, generation: u64) {
        if lock(&self.store).remove_generation(key, generation) {
            debug!(key = %key, "evicted failed computation");
        }
    }
}

impl<A, T, E> Memoized<A, Result<T, E>>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Like [`Memoized::call`], but never caches an `Err`
    ///
    /// Errors are returned unchanged and the next call with the same key invokes the
    /// wrapped function again.
    pub fn try_call(&self, args: A) -> Result<T, E> {
        let Some(key) = self.derive_key(&args) else {
            return (self.func)(&args);
        };

        if let Some((value, _)) = self.lookup(&key, |value| value.as_ref().ok().cloned()) {
            return Ok(value);
        }

        let value = (self.func)(&args)?;
        self.store(key, Ok(value.clone()));
        Ok(value)
    }
}

impl<A, T, E> Memoized<A, SharedFuture<Result<T, E>>>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Awaits the shared computation for these arguments, dropping it from the cache if it
    /// resolves to an `Err`
    ///
    /// Callers that share the failed computation all observe the same error.
    pub async fn try_call(&self, args: A) -> Result<T, E> {
        let Some(key) = self.derive_key(&args) else {
            return (self.func)(&args).await;
        };

        let (computation, generation) = match self.lookup(&key, |value| Some(value.clone())) {
            Some(found) => found,
            None => {
                let computation = (self.func)(&args);
                let generation = self.store(key.clone(), computation.clone());
                (computation, generation)
            }
        };

        let result = computation.await;
        if result.is_err() {
            self.evict(&key, generation);
        }
        result
    }
}

impl<A, R> Clone for Memoized<A, R> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            keys: self.keys.clone(),
            timeout: self.timeout,
            scheduler: Arc::clone(&self.scheduler),
            store: Arc::clone(&self.store),
        }
    }
}

impl<A, R> fmt::Debug for Memoized<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("keys", &self.keys)
            .field("timeout", &self.timeout)
            .field("entries", &lock(&self.store).entries.len())
            .finish()
    }
}

/// Builder for [`Memoized`]
///
/// A missing function or timeout is reported by [`MemoizedBuilder::build`] with the same
/// errors as the positional [`memoize`](super::memoize) entry point.
pub struct MemoizedBuilder<A, R> {
    func: Option<MemoFn<A, R>>,
    keys: Option<KeyStrategy<A>>,
    timeout: Option<Duration>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<A, R> Default for MemoizedBuilder<A, R> {
    fn default() -> Self {
        Self {
            func: None,
            keys: None,
            timeout: None,
            scheduler: None,
        }
    }
}

impl<A, R> MemoizedBuilder<A, R>
where
    R: Clone + Send + 'static,
{
    /// Sets the function to memoize
    pub fn func<F>(mut self, func: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.func = Some(Arc::new(func));
        self
    }

    /// Derives cache keys with `resolver` instead of serializing the arguments
    pub fn resolver<F, K>(mut self, resolver: F) -> Self
    where
        F: Fn(&A) -> K + Send + Sync + 'static,
        K: Into<CacheKey>,
    {
        self.keys = Some(KeyStrategy::resolver(resolver));
        self
    }

    /// Sets the key strategy directly
    pub fn key_strategy(mut self, keys: KeyStrategy<A>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Sets how long results stay cached
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how long results stay cached, in milliseconds
    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Runs expiry actions on `scheduler` instead of the tokio runtime
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Validates the configuration and builds the wrapper
    ///
    /// Without a resolver, keys are the JSON serialization of the arguments.
    pub fn build(self) -> Result<Memoized<A, R>, MemoizeError>
    where
        A: Serialize,
    {
        let timeout = match (self.timeout, &self.keys) {
            (Some(timeout), _) => timeout,
            (None, Some(KeyStrategy::Resolver(_))) => return Err(MemoizeError::InvalidTimeout),
            (None, _) => return Err(MemoizeError::MissingArguments),
        };
        let func = self.func.ok_or(MemoizeError::FuncNotCallable)?;
        let keys = self.keys.unwrap_or_else(KeyStrategy::canonical);
        let scheduler = self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler));

        Ok(Memoized::from_parts(func, keys, timeout, scheduler))
    }
}

/// Memoizes `func`, keying calls by their serialized arguments
pub fn memoize_fn<A, R, F>(func: F, timeout: Duration) -> Memoized<A, R>
where
    A: Serialize,
    R: Clone + Send + 'static,
    F: Fn(&A) -> R + Send + Sync + 'static,
{
    Memoized::new(func, KeyStrategy::canonical(), timeout)
}

/// Memoizes `func`, keying calls by the output of `resolver`
pub fn memoize_with_resolver<A, R, F, G, K>(
    func: F,
    resolver: G,
    timeout: Duration,
) -> Memoized<A, R>
where
    R: Clone + Send + 'static,
    F: Fn(&A) -> R + Send + Sync + 'static,
    G: Fn(&A) -> K + Send + Sync + 'static,
    K: Into<CacheKey>,
{
    Memoized::new(func, KeyStrategy::resolver(resolver), timeout)
}

/// Turns a future-returning function into one that returns a [`SharedFuture`]
///
/// Memoizing the result caches the pending computation itself, so every caller with
/// the same key awaits the same underlying work.
pub fn shared_computation<A, T, F, Fut>(
    func: F,
) -> impl Fn(&A) -> SharedFuture<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    move |args: &A| func(args).boxed().shared()
}

/// Memoizes an async function, caching its pending computations
pub fn memoize_async<A, T, F, Fut>(
    func: F,
    keys: KeyStrategy<A>,
    timeout: Duration,
) -> Memoized<A, SharedFuture<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    Memoized::new(shared_computation(func), keys, timeout)
}
