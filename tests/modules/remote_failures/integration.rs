//! 远程缓存故障集成测试

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tierflow::{
    bus::MemoryBus,
    cache::Cache,
    error::CacheError,
    options::{GracefulRetainOptions, RawCacheOptions},
    storage::{MemoryStorage, TierDriver},
};

fn strict() -> RawCacheOptions {
    RawCacheOptions::new().suppress_remote_cache_errors(false)
}

/// 默认吞掉远程读取错误，按未命中处理
#[tokio::test]
async fn test_remote_read_error_is_suppressed_by_default() {
    let remote = ChaosStorage::new();
    let cache = create_tiered_cache(
        "users",
        remote.clone(),
        Arc::new(MemoryBus::new()),
        RawCacheOptions::default(),
    )
    .await;
    remote.always_throw();

    let value = cache
        .get_or_set("foo", slow_factory(Duration::ZERO, "bar"))
        .await
        .unwrap();
    assert_eq!(value, "bar");
    assert!(cache.stats().remote_errors_suppressed() >= 1);

    // L1 已写入，后续读取不再访问 L2
    let calls = remote.calls();
    assert_eq!(cache.get("foo").await.unwrap(), Some("bar".to_string()));
    assert_eq!(remote.calls(), calls);
}

/// 不吞掉错误时读取失败直接返回
#[tokio::test]
async fn test_remote_read_error_is_returned_when_not_suppressed() {
    let remote = ChaosStorage::new();
    let cache = create_tiered_cache(
        "users",
        remote.clone(),
        Arc::new(MemoryBus::new()),
        strict(),
    )
    .await;
    remote.always_throw();

    let calls = Arc::new(AtomicUsize::new(0));
    let result = cache
        .get_or_set(
            "foo",
            counting_factory(calls.clone(), Duration::ZERO, "bar"),
        )
        .await;

    assert!(matches!(result, Err(CacheError::RemoteTier(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// 远程写入失败时 L1 仍然写入，不吞掉错误时返回错误
#[tokio::test]
async fn test_remote_write_error_keeps_local_value() {
    let remote = ChaosStorage::new();
    let local = Arc::new(MemoryStorage::default());
    let cache: Cache<String> = Cache::builder("users")
        .local(local.clone())
        .remote(remote.clone())
        .build()
        .await
        .unwrap();
    remote.always_throw();

    let result = cache.set_with("foo", "bar".to_string(), strict()).await;
    assert!(matches!(result, Err(CacheError::RemoteTier(_))));
    assert!(local.has("foo").await.unwrap());

    cache.set("baz", "qux".to_string()).await.unwrap();
    assert!(local.has("baz").await.unwrap());
}

/// 远程读取失败时返回 L1 中优雅保留的旧值，不执行工厂函数
#[tokio::test]
async fn test_grace_local_served_when_remote_fails() {
    let remote = ChaosStorage::new();
    let cache = create_tiered_cache(
        "users",
        remote.clone(),
        Arc::new(MemoryBus::new()),
        RawCacheOptions::new()
            .ttl(Duration::from_millis(10))
            .graceful_retain(GracefulRetainOptions::enabled(Duration::from_secs(5))),
    )
    .await;

    cache.set("foo", "old".to_string()).await.unwrap();
    sleep_ms(30).await;
    remote.always_throw();

    let calls = Arc::new(AtomicUsize::new(0));
    let value = cache
        .get_or_set(
            "foo",
            counting_factory(calls.clone(), Duration::ZERO, "new"),
        )
        .await
        .unwrap();

    assert_eq!(value, "old");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.stats().stale_served(), 1);
}

/// 远程恢复后正常读写
#[tokio::test]
async fn test_remote_recovers() {
    let remote = ChaosStorage::new();
    let cache = create_tiered_cache(
        "users",
        remote.clone(),
        Arc::new(MemoryBus::new()),
        RawCacheOptions::default(),
    )
    .await;

    remote.always_throw();
    cache.set("foo", "bar".to_string()).await.unwrap();
    assert!(!remote.inner_has("foo").await);

    remote.never_throw();
    cache.set("foo", "baz".to_string()).await.unwrap();
    assert!(remote.inner_has("foo").await);
}

/// L1 故障总是返回错误，不受 suppress_remote_cache_errors 影响
#[tokio::test]
async fn test_local_tier_errors_are_never_suppressed() {
    let local = ChaosStorage::new();
    let cache: Cache<String> = Cache::builder("users")
        .local(local.clone())
        .remote(Arc::new(MemoryStorage::default()))
        .defaults(RawCacheOptions::new().suppress_remote_cache_errors(true))
        .build()
        .await
        .unwrap();
    local.always_throw();

    assert!(matches!(
        cache.get("foo").await,
        Err(CacheError::LocalTier(_))
    ));
    assert!(matches!(
        cache.set("foo", "bar".to_string()).await,
        Err(CacheError::LocalTier(_))
    ));
    assert!(matches!(
        cache.delete("foo").await,
        Err(CacheError::LocalTier(_))
    ));
}
