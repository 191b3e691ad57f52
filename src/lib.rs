//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Tierflow - Multi-tier Cache Orchestration
//!
//! Read-through / write-through caching over a local tier (L1) and an optional
//! shared remote tier (L2), with stampede protection, graceful retain of stale
//! values and cross-instance invalidation.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use tierflow::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`Cache`] - The multi-tier cache facade
//! - [`CacheBuilder`] - Construction from code or from [`CacheSettings`]
//! - [`RawCacheOptions`] - Per-call / per-store / global options
//! - [`CacheError`] - Error types
//!
//! ## Extension points
//!
//! - [`TierDriver`] - Storage backends (memory, Redis)
//! - [`InvalidationBus`] - Cross-instance invalidation (in-process, Redis pub/sub)
//! - [`Serializer`] - Stored record codec
//!
//! # Examples
//!
//! ```rust
//! use tierflow::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache: Cache<String> = Cache::builder("users")
//!         .memory(MemoryStorageConfig::default())
//!         .defaults(RawCacheOptions::new().ttl(Duration::from_secs(60)))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let name = cache
//!         .get_or_set("user:1", || async { Ok("alice".to_string()) })
//!         .await
//!         .unwrap();
//!     assert_eq!(name, "alice");
//! }
//! ```
//!
//! # Features
//!
//! - **Entry states**: fresh, early-due (background refresh), grace-expired (serve stale on error), missing
//! - **Single flight**: at most one factory execution per key per process
//! - **Read repair**: L2 hits are written back to L1
//! - **Invalidation bus**: peers drop their L1 copy on set/delete
//! - **Redis**: tier driver and pub/sub bus (requires `redis` feature)

pub mod prelude;

pub mod bus;
pub mod cache;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod lock;
pub mod options;
#[cfg(feature = "redis")]
pub mod redis_bus;
#[cfg(feature = "redis")]
pub mod redis_storage;
pub mod serializer;
pub mod storage;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// 重新导出常用类型
pub use bus::{
    InvalidationBus, InvalidationEvent, InvalidationHandler, InvalidationKind, MemoryBus,
    SubscriptionId,
};
pub use cache::{Cache, CacheBuilder, CacheStats, CacheValue, KeyValue};
pub use config::{parse_duration, CacheSettings, MemorySettings, StoreSettings};
pub use entry::{CacheEntry, EntryState};
pub use error::{CacheError, StorageError};
pub use lock::{Acquisition, FlightGuard, FlightHandle, StampedeLock};
pub use options::{CacheOptions, GracefulRetain, GracefulRetainOptions, RawCacheOptions};
#[cfg(feature = "redis")]
pub use redis_bus::RedisBus;
#[cfg(feature = "redis")]
pub use redis_storage::{RedisConfig, RedisStorage, RetryStats};
pub use serializer::{JsonSerializer, Serializer};
pub use storage::{MemoryStorage, MemoryStorageConfig, MemoryStorageStats, TierDriver};
#[cfg(feature = "telemetry")]
pub use telemetry::{init_tracing, TelemetryConfig};
