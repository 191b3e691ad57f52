//! 测试通用工具模块
//!
//! 提供测试中常用的工具函数和辅助结构。

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tierflow::{
    bus::MemoryBus,
    cache::Cache,
    error::StorageError,
    options::RawCacheOptions,
    storage::{MemoryStorage, MemoryStorageConfig, TierDriver},
};

/// 可切换为总是失败的存储驱动
pub struct ChaosStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl ChaosStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStorage::default(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    /// 之后的所有操作都返回连接错误
    pub fn always_throw(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// 恢复正常
    pub fn never_throw(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// 驱动被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 绕过故障注入直接查看底层存储
    pub async fn inner_has(&self, key: &str) -> bool {
        self.inner.has(key).await.unwrap_or(false)
    }

    fn check(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::ConnectionError("chaos: connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TierDriver for ChaosStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn has(&self, key: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.has(key).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.check()?;
        self.inner.clear().await
    }

    fn name(&self) -> &str {
        "chaos"
    }
}

/// 安装测试用的日志订阅者（`RUST_LOG` 可覆盖默认级别）
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tierflow=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// 仅有 L1 的缓存
pub async fn create_memory_cache(name: &str) -> Cache<String> {
    init_test_tracing();
    Cache::builder(name)
        .memory(MemoryStorageConfig::default())
        .build()
        .await
        .unwrap()
}

/// L1 + 共享 L2 + 共享总线的缓存实例
pub async fn create_tiered_cache(
    name: &str,
    remote: Arc<dyn TierDriver>,
    bus: Arc<MemoryBus>,
    defaults: RawCacheOptions,
) -> Cache<String> {
    init_test_tracing();
    Cache::builder(name)
        .memory(MemoryStorageConfig::default())
        .remote(remote)
        .bus(bus)
        .defaults(defaults)
        .build()
        .await
        .unwrap()
}

/// 总是失败的工厂函数
pub fn throwing_factory(
    message: &'static str,
) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<String>> + Send + 'static {
    move || Box::pin(async move { Err(anyhow::anyhow!(message)) })
}

/// 等待一段时间后返回值的工厂函数
pub fn slow_factory(
    delay: Duration,
    value: &'static str,
) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<String>> + Send + 'static {
    move || {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(value.to_string())
        })
    }
}

/// 记录调用次数的工厂函数
pub fn counting_factory(
    calls: Arc<AtomicUsize>,
    delay: Duration,
    value: &'static str,
) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<String>> + Send + 'static {
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value.to_string())
        })
    }
}

/// 等待
pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
