//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 多级缓存
//!
//! `Cache` 组合 L1（本地）与 L2（远程）两个缓存层、单飞锁和失效总线，
//! 提供读穿透/写穿透语义：
//!
//! - **FRESH**: 直接返回
//! - **EARLY_DUE**: 立即返回旧值，同时在后台刷新
//! - **GRACE_EXPIRED**: 重新计算，工厂失败时返回优雅保留的旧值
//! - **MISSING**: 重新计算，失败时返回错误
//!
//! # 使用示例
//!
//! ```no_run
//! use tierflow::cache::Cache;
//! use tierflow::storage::MemoryStorageConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tierflow::CacheError> {
//!     let cache: Cache<String> = Cache::builder("users")
//!         .memory(MemoryStorageConfig::new().max_size(10_000))
//!         .build()
//!         .await?;
//!
//!     let name = cache
//!         .get_or_set("user:1", || async { Ok("alice".to_string()) })
//!         .await?;
//!     assert_eq!(name, "alice");
//!     Ok(())
//! }
//! ```

mod builder;
mod stats;

pub use builder::CacheBuilder;
pub use stats::CacheStats;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::bus::{InvalidationBus, InvalidationEvent, SubscriptionId};
use crate::entry::{CacheEntry, EntryState};
use crate::error::CacheError;
use crate::lock::{Acquisition, StampedeLock};
use crate::options::{CacheOptions, RawCacheOptions};
use crate::serializer::{JsonSerializer, Serializer};
use crate::storage::TierDriver;

/// 可缓存的值
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// 批量操作的键值对
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue<V> {
    pub key: String,
    pub value: V,
}

impl<V> KeyValue<V> {
    /// 创建键值对
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// 查找结果
enum Lookup<T> {
    /// 可直接返回的条目
    Hit(CacheEntry<T>, EntryState),
    /// 未命中，可能带有优雅保留的旧条目
    Miss(Option<CacheEntry<T>>),
    /// 远程读取失败（已吞掉），可能带有优雅保留的旧条目
    RemoteFailed(Option<CacheEntry<T>>),
}

pub(crate) struct CacheInner<T, S> {
    name: String,
    local: Option<Arc<dyn TierDriver>>,
    remote: Option<Arc<dyn TierDriver>>,
    bus: Option<Arc<dyn InvalidationBus>>,
    serializer: S,
    defaults: RawCacheOptions,
    store_options: RawCacheOptions,
    locks: StampedeLock<CacheEntry<T>>,
    stats: Arc<CacheStats>,
    instance_id: Uuid,
    subscription: parking_lot::Mutex<Option<SubscriptionId>>,
}

impl<T, S> CacheInner<T, S> {
    fn unsubscribe(&self) {
        if let (Some(bus), Some(id)) = (&self.bus, self.subscription.lock().take()) {
            bus.unsubscribe(id);
            debug!("取消失效事件订阅 store={}", self.name);
        }
    }
}

impl<T, S> Drop for CacheInner<T, S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// 多级缓存
pub struct Cache<T, S = JsonSerializer> {
    inner: Arc<CacheInner<T, S>>,
}

impl<T, S> Clone for Cache<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CacheValue> Cache<T, JsonSerializer> {
    /// 创建构建器
    pub fn builder(name: impl Into<String>) -> CacheBuilder<T, JsonSerializer> {
        CacheBuilder::new(name)
    }
}

impl<T: CacheValue, S: Serializer + 'static> Cache<T, S> {
    pub(crate) fn from_inner(inner: Arc<CacheInner<T, S>>) -> Self {
        Self { inner }
    }

    /// 存储名称
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 实例ID（失效事件的来源标识）
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    /// 缓存统计
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    /// 正在执行工厂函数的键数量
    pub fn in_flight(&self) -> usize {
        self.inner.locks.in_flight()
    }

    /// 获取值，未命中时返回 `None`
    pub async fn get(&self, key: &str) -> Result<Option<T>, CacheError> {
        self.get_with(key, None, RawCacheOptions::default()).await
    }

    /// 获取值，未命中时返回默认值
    pub async fn get_or(&self, key: &str, default: T) -> Result<T, CacheError> {
        Ok(self
            .get_with(key, None, RawCacheOptions::default())
            .await?
            .unwrap_or(default))
    }

    /// 使用调用级选项获取值
    ///
    /// 优雅保留窗口中的旧值也会被返回。
    pub async fn get_with(
        &self,
        key: &str,
        default: Option<T>,
        options: RawCacheOptions,
    ) -> Result<Option<T>, CacheError> {
        let options = self.resolve(&options);

        match self.lookup(key, &options).await? {
            Lookup::Hit(entry, _) => Ok(Some(entry.into_value())),
            Lookup::Miss(Some(entry)) | Lookup::RemoteFailed(Some(entry)) => {
                trace!("返回优雅保留的旧值 store={}, key={}", self.inner.name, key);
                self.inner.stats.record_stale_served();
                Ok(Some(entry.into_value()))
            }
            Lookup::Miss(None) | Lookup::RemoteFailed(None) => {
                self.inner.stats.record_miss();
                Ok(default)
            }
        }
    }

    /// 键是否不可用（`get_with` 返回 `None` 的情况）
    pub async fn missing(&self, key: &str, options: RawCacheOptions) -> Result<bool, CacheError> {
        Ok(self.get_with(key, None, options).await?.is_none())
    }

    /// 任一缓存层中物理存在该键
    pub async fn has(&self, key: &str) -> Result<bool, CacheError> {
        if let Some(local) = &self.inner.local {
            if local.has(key).await.map_err(CacheError::LocalTier)? {
                return Ok(true);
            }
        }

        let Some(remote) = &self.inner.remote else {
            return Ok(false);
        };

        let options = self.resolve(&RawCacheOptions::default());
        let result = remote.has(key).await.map_err(CacheError::RemoteTier);
        self.settle_remote(key, result, &options)
    }

    /// 获取值，未命中时执行工厂函数并写入缓存
    pub async fn get_or_set<F, Fut>(&self, key: &str, factory: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.get_or_set_with(key, None, factory, RawCacheOptions::default())
            .await
    }

    /// 使用TTL覆盖和调用级选项的 `get_or_set`
    pub async fn get_or_set_with<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
        options: RawCacheOptions,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut options = options;
        if let Some(ttl) = ttl {
            options.ttl = Some(ttl);
        }

        let options = self.resolve(&options);
        self.get_or_set_resolved(key, factory, options).await
    }

    /// 永不逻辑过期的 `get_or_set`
    pub async fn get_or_set_forever<F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: RawCacheOptions,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let options = self.resolve(&options).forever();
        self.get_or_set_resolved(key, factory, options).await
    }

    /// 写入值
    pub async fn set(&self, key: &str, value: T) -> Result<(), CacheError> {
        self.set_with(key, value, RawCacheOptions::default()).await
    }

    /// 使用调用级选项写入值
    pub async fn set_with(
        &self,
        key: &str,
        value: T,
        options: RawCacheOptions,
    ) -> Result<(), CacheError> {
        let options = self.resolve(&options);
        let entry = CacheEntry::new(key, value, &options);
        self.write_entry(&entry, &options).await
    }

    /// 写入永不逻辑过期的值
    pub async fn set_forever(
        &self,
        key: &str,
        value: T,
        options: RawCacheOptions,
    ) -> Result<(), CacheError> {
        let options = self.resolve(&options).forever();
        let entry = CacheEntry::new(key, value, &options);
        self.write_entry(&entry, &options).await
    }

    /// 删除值，返回任一缓存层中是否存在该键
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.delete_with(key, RawCacheOptions::default()).await
    }

    /// 使用调用级选项删除值
    ///
    /// 先删除 L1（失败直接返回错误），再删除 L2，然后发布删除事件。
    /// L2 的错误在本地删除和事件发布之后才根据 `suppress_remote_cache_errors` 决定是否返回。
    pub async fn delete_with(
        &self,
        key: &str,
        options: RawCacheOptions,
    ) -> Result<bool, CacheError> {
        let options = self.resolve(&options);

        let local_deleted = match &self.inner.local {
            Some(local) => local.delete(key).await.map_err(CacheError::LocalTier)?,
            None => false,
        };

        let remote_result = match &self.inner.remote {
            Some(remote) => remote.delete(key).await.map_err(CacheError::RemoteTier),
            None => Ok(false),
        };

        self.publish(InvalidationEvent::delete(
            &self.inner.name,
            key,
            self.inner.instance_id,
        ))
        .await;

        debug!("删除缓存 store={}, key={}", self.inner.name, key);

        let remote_deleted = self.settle_remote(key, remote_result, &options)?;
        Ok(local_deleted || remote_deleted)
    }

    /// 批量删除，返回是否有键被删除
    pub async fn delete_many<K: AsRef<str>>(
        &self,
        keys: &[K],
        options: RawCacheOptions,
    ) -> Result<bool, CacheError> {
        let deleted = try_join_all(
            keys.iter()
                .map(|key| self.delete_with(key.as_ref(), options.clone())),
        )
        .await?;

        Ok(deleted.into_iter().any(|deleted| deleted))
    }

    /// 获取值后删除
    pub async fn pull(&self, key: &str) -> Result<Option<T>, CacheError> {
        let value = self.get(key).await?;
        self.delete(key).await?;
        Ok(value)
    }

    /// 批量获取
    ///
    /// 返回结果与输入键一一对应；未命中时使用同位置的默认值（没有则为 `None`）。
    pub async fn get_many<K: AsRef<str>>(
        &self,
        keys: &[K],
        defaults: &[T],
    ) -> Result<Vec<KeyValue<Option<T>>>, CacheError> {
        try_join_all(keys.iter().enumerate().map(|(index, key)| async move {
            let key = key.as_ref();
            let value = self
                .get_with(key, defaults.get(index).cloned(), RawCacheOptions::default())
                .await?;
            Ok::<_, CacheError>(KeyValue::new(key, value))
        }))
        .await
    }

    /// 批量写入
    pub async fn set_many(
        &self,
        items: Vec<KeyValue<T>>,
        options: RawCacheOptions,
    ) -> Result<(), CacheError> {
        let options = &options;
        try_join_all(
            items
                .into_iter()
                .map(|KeyValue { key, value }| async move {
                    self.set_with(&key, value, options.clone()).await
                }),
        )
        .await?;

        Ok(())
    }

    /// 使条目立即逻辑过期
    ///
    /// 条目仍保留在缓存层中，启用优雅保留时可以作为旧值返回。
    pub async fn expire(&self, key: &str) -> Result<bool, CacheError> {
        let options = self.resolve(&RawCacheOptions::default());

        let entry = match self.read_local(key).await? {
            Some(entry) => Some(entry),
            None => {
                let result = self.read_remote(key).await;
                self.settle_remote(key, result, &options)?
            }
        };

        let Some(mut entry) = entry else {
            return Ok(false);
        };

        entry.expire();
        self.write_entry(&entry, &options).await?;
        debug!("缓存已过期 store={}, key={}", self.inner.name, key);
        Ok(true)
    }

    /// 清空所有缓存层（不发布失效事件）
    pub async fn clear(&self) -> Result<(), CacheError> {
        if let Some(local) = &self.inner.local {
            local.clear().await.map_err(CacheError::LocalTier)?;
        }

        if let Some(remote) = &self.inner.remote {
            let options = self.resolve(&RawCacheOptions::default());
            let result = remote.clear().await.map_err(CacheError::RemoteTier);
            self.settle_remote("*", result, &options)?;
        }

        debug!("缓存已清空 store={}", self.inner.name);
        Ok(())
    }

    /// 取消失效事件订阅
    pub fn disconnect(&self) {
        self.inner.unsubscribe();
    }

    fn resolve(&self, call: &RawCacheOptions) -> CacheOptions {
        CacheOptions::resolve(&[call, &self.inner.store_options, &self.inner.defaults])
    }

    async fn get_or_set_resolved<F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: CacheOptions,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match self.lookup(key, &options).await? {
            Lookup::Hit(entry, state) => {
                if state == EntryState::EarlyDue {
                    self.refresh_in_background(key, factory, options);
                }
                Ok(entry.into_value())
            }
            Lookup::RemoteFailed(Some(mut entry)) => {
                warn!(
                    "远程缓存不可用，返回优雅保留的旧值 store={}, key={}",
                    self.inner.name, key
                );
                entry.apply_fallback_duration(options.graceful_retain().duration);
                self.inner.stats.record_stale_served();
                Ok(entry.into_value())
            }
            Lookup::Miss(stale) | Lookup::RemoteFailed(stale) => {
                if stale.is_none() {
                    self.inner.stats.record_miss();
                }
                let entry = self.compute(key, factory, options, stale).await?;
                Ok(entry.into_value())
            }
        }
    }

    /// 依次查找 L1、L2
    ///
    /// 优先级：新鲜的 L1 > 新鲜的 L2 > 优雅保留的 L1 > 优雅保留的 L2。
    /// L2 中可用的条目会写回 L1。
    async fn lookup(&self, key: &str, options: &CacheOptions) -> Result<Lookup<T>, CacheError> {
        let grace_enabled = options.is_graceful_retain_enabled();
        let mut stale = None;

        if let Some(entry) = self.read_local(key).await? {
            let state = entry.state(grace_enabled);
            if state.is_usable() {
                trace!("L1命中 store={}, key={}", self.inner.name, key);
                self.inner.stats.record_local_hit();
                return Ok(Lookup::Hit(entry, state));
            }
            if state == EntryState::GraceExpired {
                stale = Some(entry);
            }
        }

        match self.read_remote(key).await {
            Ok(Some(entry)) => {
                let state = entry.state(grace_enabled);
                if state.is_usable() {
                    trace!("L2命中 store={}, key={}", self.inner.name, key);
                    self.repair_local(&entry, options).await?;
                    self.inner.stats.record_remote_hit();
                    return Ok(Lookup::Hit(entry, state));
                }
                if state == EntryState::GraceExpired && stale.is_none() {
                    self.repair_local(&entry, options).await?;
                    stale = Some(entry);
                }
            }
            Ok(None) => {}
            Err(err) => {
                if !options.suppress_remote_cache_errors() {
                    return Err(err);
                }
                warn!(
                    "远程缓存读取失败，已忽略 store={}, key={}: {}",
                    self.inner.name, key, err
                );
                self.inner.stats.record_remote_error_suppressed();
                return Ok(Lookup::RemoteFailed(stale));
            }
        }

        trace!("缓存未命中 store={}, key={}", self.inner.name, key);
        Ok(Lookup::Miss(stale))
    }

    async fn read_local(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let Some(local) = &self.inner.local else {
            return Ok(None);
        };

        let raw = local.get(key).await.map_err(CacheError::LocalTier)?;
        raw.map(|raw| CacheEntry::from_driver(key, &raw, &self.inner.serializer))
            .transpose()
    }

    async fn read_remote(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(None);
        };

        let raw = remote.get(key).await.map_err(CacheError::RemoteTier)?;
        raw.map(|raw| CacheEntry::from_driver(key, &raw, &self.inner.serializer))
            .transpose()
    }

    /// 将 L2 中读到的条目写回 L1
    async fn repair_local(
        &self,
        entry: &CacheEntry<T>,
        options: &CacheOptions,
    ) -> Result<(), CacheError> {
        let Some(local) = &self.inner.local else {
            return Ok(());
        };

        let ttl = if entry.is_forever() {
            None
        } else {
            options.physical_ttl()
        };

        let raw = entry.serialize(&self.inner.serializer)?;
        local
            .set(entry.key(), &raw, ttl)
            .await
            .map_err(CacheError::LocalTier)
    }

    /// 在单飞锁下执行工厂函数
    ///
    /// 执行者的工作在独立任务中运行，调用方放弃等待不会取消工厂函数。
    async fn compute<F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: CacheOptions,
        stale: Option<CacheEntry<T>>,
    ) -> Result<CacheEntry<T>, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match self.inner.locks.acquire(key) {
            Acquisition::Joined(handle) => match handle.wait().await {
                // 执行者可能是后台刷新或未启用优雅保留的调用，使用自己的旧值兜底
                Err(err @ CacheError::Factory(_)) if options.is_graceful_retain_enabled() => {
                    match stale {
                        Some(mut entry) => {
                            warn!(
                                "等待的工厂函数执行失败，返回优雅保留的旧值 store={}, key={}: {}",
                                self.inner.name, key, err
                            );
                            entry.apply_fallback_duration(options.graceful_retain().duration);
                            self.inner.stats.record_stale_served();
                            Ok(entry)
                        }
                        None => Err(err),
                    }
                }
                outcome => outcome,
            },
            Acquisition::Owner(guard) => {
                let cache = self.clone();
                let key = key.to_string();

                let task = tokio::spawn(async move {
                    let outcome = cache.run_factory(&key, factory, &options, stale).await;
                    guard.complete(outcome.clone());
                    outcome
                });

                match task.await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(CacheError::Lock(format!("工厂任务异常退出: {}", err))),
                }
            }
        }
    }

    /// 后台刷新提前过期的条目，已有刷新在进行时直接跳过
    fn refresh_in_background<F, Fut>(&self, key: &str, factory: F, options: CacheOptions)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let guard = match self.inner.locks.acquire(key) {
            Acquisition::Owner(guard) => guard,
            Acquisition::Joined(_) => {
                trace!("提前刷新已在进行中 store={}, key={}", self.inner.name, key);
                return;
            }
        };

        debug!("提前刷新 store={}, key={}", self.inner.name, guard.key());
        self.inner.stats.record_early_refresh();

        let cache = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let outcome = cache.run_factory(&key, factory, &options, None).await;
            if let Err(err) = &outcome {
                warn!(
                    "提前刷新失败，保留原条目 store={}, key={}: {}",
                    cache.inner.name, key, err
                );
            }
            guard.complete(outcome);
        });
    }

    /// 单飞执行者的工作：复查 L1、执行工厂函数、写入结果
    async fn run_factory<F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &CacheOptions,
        stale: Option<CacheEntry<T>>,
    ) -> Result<CacheEntry<T>, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(entry) = self.read_local(key).await? {
            if entry.state(options.is_graceful_retain_enabled()) == EntryState::Fresh {
                trace!("其他执行已写入新值 store={}, key={}", self.inner.name, key);
                return Ok(entry);
            }
        }

        self.inner.stats.record_factory_call();

        match factory().await {
            Ok(value) => {
                let entry = CacheEntry::new(key, value, options);
                self.write_entry(&entry, options).await?;
                Ok(entry)
            }
            Err(err) => {
                self.inner.stats.record_factory_error();
                let err = CacheError::factory(err);

                match stale {
                    Some(mut entry) if options.is_graceful_retain_enabled() => {
                        warn!(
                            "工厂函数执行失败，返回优雅保留的旧值 store={}, key={}: {}",
                            self.inner.name, key, err
                        );
                        entry.apply_fallback_duration(options.graceful_retain().duration);
                        self.inner.stats.record_stale_served();
                        Ok(entry)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    /// 写入所有缓存层并发布写入事件
    async fn write_entry(
        &self,
        entry: &CacheEntry<T>,
        options: &CacheOptions,
    ) -> Result<(), CacheError> {
        let raw = entry.serialize(&self.inner.serializer)?;
        let ttl = options.physical_ttl();
        let key = entry.key();

        if let Some(local) = &self.inner.local {
            local
                .set(key, &raw, ttl)
                .await
                .map_err(CacheError::LocalTier)?;
        }

        let remote_result = match &self.inner.remote {
            Some(remote) => remote
                .set(key, &raw, ttl)
                .await
                .map_err(CacheError::RemoteTier),
            None => Ok(()),
        };

        self.publish(InvalidationEvent::set(
            &self.inner.name,
            key,
            self.inner.instance_id,
        ))
        .await;

        debug!(
            "写入缓存 store={}, key={}, physical_ttl={:?}",
            self.inner.name, key, ttl
        );

        self.settle_remote(key, remote_result, options)
    }

    /// 根据 `suppress_remote_cache_errors` 处理远程缓存错误
    fn settle_remote<R: Default>(
        &self,
        key: &str,
        result: Result<R, CacheError>,
        options: &CacheOptions,
    ) -> Result<R, CacheError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if options.suppress_remote_cache_errors() => {
                warn!(
                    "远程缓存操作失败，已忽略 store={}, key={}: {}",
                    self.inner.name, key, err
                );
                self.inner.stats.record_remote_error_suppressed();
                Ok(R::default())
            }
            Err(err) => Err(err),
        }
    }

    async fn publish(&self, event: InvalidationEvent) {
        let Some(bus) = &self.inner.bus else {
            return;
        };

        if let Err(err) = bus.publish(event).await {
            warn!("发布失效事件失败 store={}: {}", self.inner.name, err);
        }
    }
}
