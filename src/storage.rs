//! 存储抽象层
//!
//! 定义缓存层驱动接口 `TierDriver` 以及进程内的 LRU 内存实现。
//! 驱动只处理已序列化的字符串，过期状态的判断由缓存条目负责；
//! 驱动的 TTL 即条目的物理过期时间。

use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::config::MemorySettings;
use crate::constants::DEFAULT_MEMORY_MAX_SIZE;
use crate::error::StorageError;

/// 缓存层驱动接口
#[async_trait]
pub trait TierDriver: Send + Sync {
    /// 获取值，不存在或已物理过期时返回 `None`
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 设置值，`ttl` 为 `None` 时永久保存
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError>;

    /// 删除值，返回键是否存在
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// 检查键是否存在
    async fn has(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// 清空
    async fn clear(&self) -> Result<(), StorageError>;

    /// 驱动名称（用于日志）
    fn name(&self) -> &str;
}

/// 内存存储配置
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// 最大条目数
    pub max_size: usize,
    /// 键前缀
    pub prefix: Option<String>,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MEMORY_MAX_SIZE,
            prefix: None,
        }
    }
}

impl MemoryStorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl From<&MemorySettings> for MemoryStorageConfig {
    fn from(settings: &MemorySettings) -> Self {
        Self {
            max_size: settings.max_size,
            prefix: settings.prefix.clone(),
        }
    }
}

/// 内存存储统计
#[derive(Debug, Default)]
pub struct MemoryStorageStats {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStorageStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredItem {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }
}

/// LRU 内存存储（L1）
pub struct MemoryStorage {
    data: parking_lot::Mutex<lru::LruCache<String, StoredItem>>,
    config: MemoryStorageConfig,
    stats: Arc<MemoryStorageStats>,
}

impl MemoryStorage {
    pub fn new(max_size: usize) -> Self {
        Self::with_config(MemoryStorageConfig::new().max_size(max_size))
    }

    pub fn with_config(config: MemoryStorageConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);

        Self {
            data: parking_lot::Mutex::new(lru::LruCache::new(capacity)),
            config,
            stats: Arc::new(MemoryStorageStats::default()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.config.prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// 当前条目数（包括尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn stats(&self) -> &MemoryStorageStats {
        &self.stats
    }

    pub fn config(&self) -> &MemoryStorageConfig {
        &self.config
    }

    /// 清理物理过期的条目，返回清理数量
    pub fn cleanup_expired(&self) -> usize {
        let mut cache = self.data.lock();

        let expired_keys: Vec<String> = cache
            .iter()
            .filter(|(_, item)| item.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            cache.pop(key);
        }

        let count = expired_keys.len();
        self.stats
            .expirations
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }
}

#[async_trait]
impl TierDriver for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let full_key = self.full_key(key);
        let mut cache = self.data.lock();

        let Some(item) = cache.get(&full_key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if item.is_expired() {
            cache.pop(&full_key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(item.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let full_key = self.full_key(key);
        let item = StoredItem {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };

        let mut cache = self.data.lock();
        if !cache.contains(&full_key) && cache.len() >= cache.cap().get() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }

        cache.put(full_key, item);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        trace!("内存存储写入 key={}, ttl={:?}", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let full_key = self.full_key(key);
        let removed = self.data.lock().pop(&full_key);
        Ok(removed.map(|item| !item.is_expired()).unwrap_or(false))
    }

    async fn has(&self, key: &str) -> Result<bool, StorageError> {
        let full_key = self.full_key(key);
        let cache = self.data.lock();
        Ok(cache
            .peek(&full_key)
            .map(|item| !item.is_expired())
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.lock().clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
