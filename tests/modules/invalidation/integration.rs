//! 失效总线集成测试
//!
//! 两个实例共享同一个 L2 和总线，各自拥有独立的 L1。

use crate::common::*;
use std::sync::Arc;
use tierflow::{
    bus::MemoryBus,
    cache::Cache,
    error::CacheError,
    options::RawCacheOptions,
    storage::{MemoryStorage, TierDriver},
};

struct Node {
    cache: Cache<String>,
    local: Arc<MemoryStorage>,
}

async fn node(name: &str, remote: Arc<dyn TierDriver>, bus: Arc<MemoryBus>) -> Node {
    let local = Arc::new(MemoryStorage::default());
    let cache = Cache::builder(name)
        .local(local.clone())
        .remote(remote)
        .bus(bus)
        .build()
        .await
        .unwrap();
    Node { cache, local }
}

/// 写入会使其他实例的 L1 失效
#[tokio::test]
async fn test_set_invalidates_peer_local() {
    let remote = Arc::new(MemoryStorage::default());
    let bus = Arc::new(MemoryBus::new());
    let a = node("users", remote.clone(), bus.clone()).await;
    let b = node("users", remote.clone(), bus.clone()).await;

    a.cache.set("foo", "v1".to_string()).await.unwrap();
    assert_eq!(b.cache.get("foo").await.unwrap(), Some("v1".to_string()));
    assert!(b.local.has("foo").await.unwrap());

    a.cache.set("foo", "v2".to_string()).await.unwrap();

    assert!(!b.local.has("foo").await.unwrap());
    assert!(a.local.has("foo").await.unwrap());
    assert_eq!(b.cache.get("foo").await.unwrap(), Some("v2".to_string()));
    assert!(b.cache.stats().invalidations_received() >= 1);
}

/// 两个实例先后写入同一个键，先写入的实例读到后写入的值
#[tokio::test]
async fn test_last_writer_wins_across_instances() {
    let remote = Arc::new(MemoryStorage::default());
    let bus = Arc::new(MemoryBus::new());
    let a = node("users", remote.clone(), bus.clone()).await;
    let b = node("users", remote.clone(), bus.clone()).await;

    a.cache.set("foo", "bar".to_string()).await.unwrap();
    b.cache.set("foo", "baz".to_string()).await.unwrap();

    assert!(!a.local.has("foo").await.unwrap());
    assert_eq!(a.cache.get("foo").await.unwrap(), Some("baz".to_string()));
}

/// 删除会使其他实例的 L1 失效
#[tokio::test]
async fn test_delete_invalidates_peer_local() {
    let remote = Arc::new(MemoryStorage::default());
    let bus = Arc::new(MemoryBus::new());
    let a = node("users", remote.clone(), bus.clone()).await;
    let b = node("users", remote.clone(), bus.clone()).await;

    a.cache.set("foo", "bar".to_string()).await.unwrap();
    b.cache.get("foo").await.unwrap();
    assert!(b.local.has("foo").await.unwrap());

    assert!(a.cache.delete("foo").await.unwrap());

    assert!(!b.local.has("foo").await.unwrap());
    assert_eq!(b.cache.get("foo").await.unwrap(), None);
}

/// 远程删除失败时仍然发布事件；未吞掉错误时返回错误
#[tokio::test]
async fn test_delete_with_failing_remote_still_invalidates_peer() {
    let remote = ChaosStorage::new();
    let bus = Arc::new(MemoryBus::new());
    let a = node("users", remote.clone(), bus.clone()).await;
    let b = node("users", remote.clone(), bus.clone()).await;

    a.cache.set("foo", "bar".to_string()).await.unwrap();
    b.cache.get("foo").await.unwrap();
    a.cache.set("baz", "qux".to_string()).await.unwrap();
    b.cache.get("baz").await.unwrap();

    remote.always_throw();

    // 默认吞掉远程错误
    assert!(a.cache.delete("foo").await.unwrap());
    assert!(!a.local.has("foo").await.unwrap());
    assert!(!b.local.has("foo").await.unwrap());

    let strict = RawCacheOptions::new().suppress_remote_cache_errors(false);
    let result = a.cache.delete_with("baz", strict).await;
    assert!(matches!(result, Err(CacheError::RemoteTier(_))));
    assert!(!a.local.has("baz").await.unwrap());
    assert!(!b.local.has("baz").await.unwrap());
}

/// 不同命名空间的事件互不影响
#[tokio::test]
async fn test_events_are_scoped_by_namespace() {
    let remote = Arc::new(MemoryStorage::default());
    let bus = Arc::new(MemoryBus::new());
    let users = node("users", remote.clone(), bus.clone()).await;
    let posts = node("posts", Arc::new(MemoryStorage::default()), bus.clone()).await;

    posts.cache.set("foo", "post".to_string()).await.unwrap();
    users.cache.set("foo", "user".to_string()).await.unwrap();

    assert!(posts.local.has("foo").await.unwrap());
    assert_eq!(posts.cache.stats().invalidations_received(), 0);
}

/// 断开连接或释放实例后不再接收事件
#[tokio::test]
async fn test_disconnect_and_drop_unsubscribe() {
    let remote = Arc::new(MemoryStorage::default());
    let bus = Arc::new(MemoryBus::new());
    let a = node("users", remote.clone(), bus.clone()).await;
    let b = node("users", remote.clone(), bus.clone()).await;
    assert_eq!(bus.subscriber_count(), 2);

    b.cache.disconnect();
    assert_eq!(bus.subscriber_count(), 1);

    a.cache.set("foo", "v1".to_string()).await.unwrap();
    b.cache.get("foo").await.unwrap();
    a.cache.set("foo", "v2".to_string()).await.unwrap();

    // 已断开的实例仍然持有旧值
    assert_eq!(b.cache.get("foo").await.unwrap(), Some("v1".to_string()));

    drop(a);
    assert_eq!(bus.subscriber_count(), 0);
}
