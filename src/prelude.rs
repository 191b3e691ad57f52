//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Tierflow,
//! allowing users to import them with a single `use tierflow::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::cache::{Cache, CacheBuilder, KeyValue};
pub use crate::config::CacheSettings;
pub use crate::error::{CacheError, StorageError};
pub use crate::options::{GracefulRetainOptions, RawCacheOptions};

// Tiers and invalidation
pub use crate::bus::{InvalidationBus, MemoryBus};
pub use crate::storage::{MemoryStorage, MemoryStorageConfig, TierDriver};

// Feature-gated exports
#[cfg(feature = "redis")]
pub use crate::redis_bus::RedisBus;

#[cfg(feature = "redis")]
pub use crate::redis_storage::{RedisConfig, RedisStorage};
