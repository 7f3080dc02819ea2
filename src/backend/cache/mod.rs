//! Compiled kernel cache
//!
//! Artifacts are keyed by function identity and the exact argument signature
//! list, so a function compiled once for `array(float64, 2d, C)` is reused by
//! every later dispatch with that signature.

mod disk;
mod store;

pub use disk::{DiskCache, DiskCacheMetadata, default_cache_dir};
pub use store::{CacheKey, CacheStats, CompilationCache};
