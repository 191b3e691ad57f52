//! 缓存构建器

use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Cache, CacheInner, CacheStats, CacheValue};
use crate::bus::{InvalidationBus, InvalidationEvent, InvalidationHandler};
use crate::config::CacheSettings;
use crate::constants::DEFAULT_STORE_NAME;
use crate::error::CacheError;
use crate::lock::StampedeLock;
use crate::options::RawCacheOptions;
use crate::serializer::{JsonSerializer, Serializer};
use crate::storage::{MemoryStorage, MemoryStorageConfig, TierDriver};

/// 缓存构建器
///
/// 至少需要配置一个缓存层（L1 或 L2）。
pub struct CacheBuilder<T, S = JsonSerializer> {
    name: String,
    local: Option<Arc<dyn TierDriver>>,
    remote: Option<Arc<dyn TierDriver>>,
    bus: Option<Arc<dyn InvalidationBus>>,
    serializer: S,
    defaults: RawCacheOptions,
    store_options: RawCacheOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue> CacheBuilder<T, JsonSerializer> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local: None,
            remote: None,
            bus: None,
            serializer: JsonSerializer,
            defaults: RawCacheOptions::default(),
            store_options: RawCacheOptions::default(),
            _marker: PhantomData,
        }
    }

    /// 从配置创建构建器
    ///
    /// 使用配置中的全局选项和存储选项，并按存储的 `memory` 配置创建 L1。
    pub fn from_settings(settings: &CacheSettings, store: &str) -> Result<Self, CacheError> {
        let store_settings = settings
            .store(store)
            .ok_or_else(|| CacheError::Config(format!("未找到存储配置: {}", store)))?;

        let memory = store_settings.memory.clone().unwrap_or_default();

        Ok(Self::new(store)
            .defaults(settings.defaults.clone())
            .options(store_settings.options.clone())
            .memory(MemoryStorageConfig::from(&memory)))
    }
}

impl<T: CacheValue> Default for CacheBuilder<T, JsonSerializer> {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_NAME)
    }
}

impl<T: CacheValue, S: Serializer + 'static> CacheBuilder<T, S> {
    /// 使用内存存储作为 L1
    pub fn memory(self, config: MemoryStorageConfig) -> Self {
        self.local(Arc::new(MemoryStorage::with_config(config)))
    }

    /// 设置 L1 驱动
    pub fn local(mut self, driver: Arc<dyn TierDriver>) -> Self {
        self.local = Some(driver);
        self
    }

    /// 设置 L2 驱动
    pub fn remote(mut self, driver: Arc<dyn TierDriver>) -> Self {
        self.remote = Some(driver);
        self
    }

    /// 设置失效总线
    pub fn bus(mut self, bus: Arc<dyn InvalidationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 全局默认选项
    pub fn defaults(mut self, defaults: RawCacheOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// 存储级选项
    pub fn options(mut self, options: RawCacheOptions) -> Self {
        self.store_options = options;
        self
    }

    /// 替换序列化实现
    pub fn serializer<S2: Serializer + 'static>(self, serializer: S2) -> CacheBuilder<T, S2> {
        CacheBuilder {
            name: self.name,
            local: self.local,
            remote: self.remote,
            bus: self.bus,
            serializer,
            defaults: self.defaults,
            store_options: self.store_options,
            _marker: PhantomData,
        }
    }

    /// 构建缓存，配置了总线和 L1 时订阅失效事件
    pub async fn build(self) -> Result<Cache<T, S>, CacheError> {
        if self.local.is_none() && self.remote.is_none() {
            return Err(CacheError::Config(format!(
                "存储[{}]至少需要配置一个缓存层",
                self.name
            )));
        }

        if self.bus.is_some() && self.local.is_none() {
            warn!("存储[{}]未配置L1，失效总线不会生效", self.name);
        }

        let inner = Arc::new(CacheInner {
            locks: StampedeLock::new(self.name.clone()),
            name: self.name,
            local: self.local,
            remote: self.remote,
            bus: self.bus,
            serializer: self.serializer,
            defaults: self.defaults,
            store_options: self.store_options,
            stats: Arc::new(CacheStats::default()),
            instance_id: Uuid::new_v4(),
            subscription: parking_lot::Mutex::new(None),
        });

        if let (Some(bus), Some(_)) = (&inner.bus, &inner.local) {
            let id = bus
                .subscribe(invalidation_handler(&inner))
                .await
                .map_err(CacheError::RemoteTier)?;
            *inner.subscription.lock() = Some(id);
            debug!("订阅失效事件 store={}, subscription={}", inner.name, id);
        }

        info!(
            "缓存已创建 store={}, l1={}, l2={}, instance={}",
            inner.name,
            inner.local.as_ref().map(|d| d.name()).unwrap_or("-"),
            inner.remote.as_ref().map(|d| d.name()).unwrap_or("-"),
            inner.instance_id
        );

        Ok(Cache::from_inner(inner))
    }
}

/// 收到其他实例的事件时删除本地 L1 中的键
fn invalidation_handler<T, S>(inner: &Arc<CacheInner<T, S>>) -> InvalidationHandler
where
    T: Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    let weak = Arc::downgrade(inner);

    Arc::new(move |event: InvalidationEvent| -> BoxFuture<'static, ()> {
        let weak = weak.clone();
        Box::pin(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };

            if event.namespace != inner.name || event.source == inner.instance_id {
                return;
            }

            inner.stats.record_invalidation();

            if let Some(local) = &inner.local {
                match local.delete(&event.key).await {
                    Ok(_) => debug!(
                        "收到失效事件，已删除L1 store={}, key={}, kind={:?}",
                        inner.name, event.key, event.kind
                    ),
                    Err(err) => warn!(
                        "处理失效事件失败 store={}, key={}: {}",
                        inner.name, event.key, err
                    ),
                }
            }
        })
    })
}
