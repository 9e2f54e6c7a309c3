//! In-memory caches: a generic bounded LRU and the backend's hub vector cache.

/// Hub membership and resident full-precision vectors.
pub mod hub;
/// Thread-safe LRU cache with size accounting and eviction callbacks.
pub mod lru;

pub use self::hub::HubCache;
pub use self::lru::{CacheStats, LruCache};
