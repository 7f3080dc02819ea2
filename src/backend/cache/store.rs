//! In-memory single-flight cache store

use super::DiskCache;
use crate::ast::{FunctionId, SourceFunction};
use crate::backend::artifact::CompiledArtifact;
use crate::config::CacheConfig;
use crate::error::{CacheCompileError, CompilationError};
use crate::signature::{TypeSignature, format_signatures};
use rustc_hash::FxHashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Cache key: function identity plus the ordered signature list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    function: FunctionId,
    name: String,
    signatures: Vec<TypeSignature>,
}

impl CacheKey {
    pub fn new(source: &SourceFunction, signatures: Vec<TypeSignature>) -> Self {
        Self {
            function: source.id(),
            name: source.name().to_string(),
            signatures,
        }
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signatures(&self) -> &[TypeSignature] {
        &self.signatures
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, format_signatures(&self.signatures))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Requests that blocked on another caller's compilation
    pub waits: usize,
    pub compilations: usize,
    pub evictions: usize,
    pub entries: usize,
    pub disk_hits: usize,
}

type Outcome = Result<Arc<CompiledArtifact>, CompilationError>;

/// Result slot of a compilation in progress
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl InFlight {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    fn publish(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
        self.ready.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut guard = lock(&self.outcome);
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

enum Slot {
    InFlight(Arc<InFlight>),
    Ready {
        artifact: Arc<CompiledArtifact>,
        last_used: u64,
    },
}

#[derive(Default)]
struct CacheState {
    entries: FxHashMap<CacheKey, Slot>,
    tick: u64,
    stats: CacheStats,
}

impl CacheState {
    fn ready_count(&self) -> usize {
        self.entries
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    /// Evict least recently used completed entries until `capacity` fits
    fn evict_to(&mut self, capacity: usize) {
        while self.ready_count() > capacity {
            let oldest = self
                .entries
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready { last_used, .. } => Some((key, *last_used)),
                    Slot::InFlight(_) => None,
                })
                .min_by_key(|(_, last_used)| *last_used)
                .map(|(key, _)| key.clone());
            let Some(key) = oldest else { break };
            self.entries.remove(&key);
            self.stats.evictions += 1;
            log::debug!("evicted {}", key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe compilation cache with single-flight semantics.
///
/// The first caller for a key compiles while concurrent callers for the same
/// key wait and receive the same artifact or the same error. Distinct keys
/// compile in parallel. Failed compilations are not cached.
pub struct CompilationCache {
    state: Mutex<CacheState>,
    capacity: Option<usize>,
    disk: Option<DiskCache>,
}

enum Role {
    Leader(Arc<InFlight>),
    Waiter(Arc<InFlight>),
}

impl CompilationCache {
    /// Unbounded in-memory cache
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: None,
            disk: None,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: config.capacity,
            disk: config.disk_dir.as_ref().map(DiskCache::new),
        }
    }

    /// Keep at most `capacity` completed entries
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_disk_cache(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Return the artifact for `key`, compiling it with `compile` on a miss.
    pub fn get_or_compile<F>(
        &self,
        key: &CacheKey,
        compile: F,
    ) -> Result<Arc<CompiledArtifact>, CacheCompileError>
    where
        F: FnOnce() -> Result<CompiledArtifact, CompilationError>,
    {
        let role = {
            let mut state = lock(&self.state);
            state.tick += 1;
            let tick = state.tick;
            match state.entries.get_mut(key) {
                Some(Slot::Ready {
                    artifact,
                    last_used,
                }) => {
                    *last_used = tick;
                    let artifact = Arc::clone(artifact);
                    state.stats.hits += 1;
                    log::debug!("cache hit: {}", key);
                    return Ok(artifact);
                }
                Some(Slot::InFlight(flight)) => {
                    let flight = Arc::clone(flight);
                    state.stats.waits += 1;
                    Role::Waiter(flight)
                }
                None => {
                    let flight = InFlight::new();
                    state
                        .entries
                        .insert(key.clone(), Slot::InFlight(Arc::clone(&flight)));
                    state.stats.misses += 1;
                    Role::Leader(flight)
                }
            }
        };

        let outcome = match role {
            Role::Waiter(flight) => {
                log::debug!("waiting for in-flight compilation of {}", key);
                flight.wait()
            }
            Role::Leader(flight) => {
                let outcome = self.lead(key, compile);
                self.finish(key, &outcome);
                flight.publish(outcome.clone());
                outcome
            }
        };

        outcome.map_err(|source| CacheCompileError {
            key: key.to_string(),
            source,
        })
    }

    fn lead<F>(&self, key: &CacheKey, compile: F) -> Outcome
    where
        F: FnOnce() -> Result<CompiledArtifact, CompilationError>,
    {
        if let Some(disk) = &self.disk {
            match disk.load(key) {
                Ok(Some(artifact)) => {
                    lock(&self.state).stats.disk_hits += 1;
                    log::info!("loaded {} from disk cache", key);
                    return Ok(Arc::new(artifact));
                }
                Ok(None) => {}
                Err(e) => log::warn!("disk cache read failed for {}: {}", key, e),
            }
        }

        lock(&self.state).stats.compilations += 1;
        let result = panic::catch_unwind(AssertUnwindSafe(compile)).unwrap_or_else(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "compiler panicked".to_string());
            Err(CompilationError::Aborted(msg))
        });
        let artifact = Arc::new(result?);

        if let Some(disk) = &self.disk
            && let Err(e) = disk.store(key, &artifact)
        {
            log::warn!("disk cache write failed for {}: {}", key, e);
        }
        Ok(artifact)
    }

    /// Replace the in-flight slot with the result, or drop it on failure
    fn finish(&self, key: &CacheKey, outcome: &Outcome) {
        let mut state = lock(&self.state);
        match outcome {
            Ok(artifact) => {
                state.tick += 1;
                let tick = state.tick;
                state.entries.insert(
                    key.clone(),
                    Slot::Ready {
                        artifact: Arc::clone(artifact),
                        last_used: tick,
                    },
                );
                if let Some(capacity) = self.capacity {
                    state.evict_to(capacity);
                }
            }
            Err(e) => {
                state.entries.remove(key);
                log::debug!("compilation of {} failed: {}", key, e);
            }
        }
        state.stats.entries = state.ready_count();
    }

    /// Cached artifact for `key`, without compiling
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledArtifact>> {
        let state = lock(&self.state);
        match state.entries.get(key) {
            Some(Slot::Ready { artifact, .. }) => Some(Arc::clone(artifact)),
            _ => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            entries: state.ready_count(),
            ..state.stats.clone()
        }
    }

    /// Number of completed entries
    pub fn len(&self) -> usize {
        lock(&self.state).ready_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all completed entries. In-flight compilations are kept.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state
            .entries
            .retain(|_, slot| matches!(slot, Slot::InFlight(_)));
        state.stats.entries = 0;
    }
}

impl Default for CompilationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompilationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationCache")
            .field("stats", &self.stats())
            .field("capacity", &self.capacity)
            .field("disk", &self.disk)
            .finish()
    }
}
