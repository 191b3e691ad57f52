//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for tierflow.
//!
//! All default values used by the options resolver, the tier drivers and the
//! invalidation bus are defined here.

use std::time::Duration;

/// Default logical TTL of a cache entry (30 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default graceful retain duration (6 hours).
///
/// Used whenever graceful retain is enabled without an explicit duration.
pub const DEFAULT_GRACE_DURATION: Duration = Duration::from_secs(6 * 60 * 60);

/// Remote tier errors are swallowed unless a caller opts out.
pub const DEFAULT_SUPPRESS_REMOTE_CACHE_ERRORS: bool = true;

/// Default maximum number of items kept by the memory tier.
pub const DEFAULT_MEMORY_MAX_SIZE: usize = 1_000;

/// Default store name used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "default";

/// Redis pub/sub channel carrying invalidation events.
pub const DEFAULT_BUS_CHANNEL: &str = "tierflow:invalidation";

/// Logical expiration of entries stored "forever".
pub const NEVER_EXPIRES: i64 = i64::MAX;
