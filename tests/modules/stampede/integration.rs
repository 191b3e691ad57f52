//! 单飞锁集成测试

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tierflow::error::CacheError;

/// 并发请求同一个键时工厂函数只执行一次
#[tokio::test]
async fn test_concurrent_get_or_set_runs_factory_once() {
    let cache = create_memory_cache("users").await;
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let cache = cache.clone();
        let factory = counting_factory(calls.clone(), Duration::from_millis(50), "bar");
        handles.push(tokio::spawn(async move {
            cache.get_or_set("foo", factory).await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "bar");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().factory_calls(), 1);
    assert_eq!(cache.in_flight(), 0);
}

/// 等待者收到执行者的错误
#[tokio::test]
async fn test_waiters_share_factory_error() {
    let cache = create_memory_cache("users").await;
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_set("foo", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<String, _>(anyhow::anyhow!("db down"))
                })
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CacheError::Factory(_))));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.in_flight(), 0);
}

/// 失败后锁被释放，下一次调用可以重新执行
#[tokio::test]
async fn test_lock_released_after_failure() {
    let cache = create_memory_cache("users").await;

    let result = cache.get_or_set("foo", throwing_factory("db down")).await;
    assert!(result.is_err());
    assert_eq!(cache.in_flight(), 0);

    let value = cache
        .get_or_set("foo", slow_factory(Duration::ZERO, "bar"))
        .await
        .unwrap();
    assert_eq!(value, "bar");
}

/// 工厂函数 panic 时锁被释放
#[tokio::test]
async fn test_lock_released_after_panic() {
    let cache = create_memory_cache("users").await;

    let result = cache
        .get_or_set("foo", || async {
            let fail = true;
            if fail {
                panic!("factory panicked");
            }
            Ok("unreachable".to_string())
        })
        .await;

    assert!(matches!(result, Err(CacheError::Lock(_))));
    assert_eq!(cache.in_flight(), 0);

    let value = cache
        .get_or_set("foo", slow_factory(Duration::ZERO, "bar"))
        .await
        .unwrap();
    assert_eq!(value, "bar");
}

/// 不同的键互不阻塞
#[tokio::test]
async fn test_different_keys_run_in_parallel() {
    let cache = create_memory_cache("users").await;
    let calls = Arc::new(AtomicUsize::new(0));

    let started = std::time::Instant::now();
    let (a, b) = tokio::join!(
        cache.get_or_set("a", counting_factory(calls.clone(), Duration::from_millis(100), "1")),
        cache.get_or_set("b", counting_factory(calls.clone(), Duration::from_millis(100), "2")),
    );

    assert_eq!(a.unwrap(), "1");
    assert_eq!(b.unwrap(), "2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < Duration::from_millis(190));
}

/// 调用方放弃等待后工厂函数仍然执行完成并写入缓存
#[tokio::test]
async fn test_abandoned_caller_does_not_cancel_factory() {
    let cache = create_memory_cache("users").await;

    let result = tokio::time::timeout(
        Duration::from_millis(10),
        cache.get_or_set("foo", slow_factory(Duration::from_millis(100), "bar")),
    )
    .await;
    assert!(result.is_err());

    sleep_ms(150).await;

    assert_eq!(cache.get("foo").await.unwrap(), Some("bar".to_string()));
    assert_eq!(cache.in_flight(), 0);
    assert_eq!(cache.stats().factory_calls(), 1);
}
