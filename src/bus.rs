//! 失效总线
//!
//! 多个缓存实例之间通过总线广播键的写入/删除事件，
//! 收到事件的实例删除自己 L1 中的对应条目。
//!
//! 总线只是尽力而为的一致性提示：发布失败只记录日志，不影响写操作。

use ahash::AHashMap;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use crate::error::StorageError;

/// 失效事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationKind {
    Set,
    Delete,
}

/// 失效事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// 缓存命名空间（存储名称）
    pub namespace: String,
    /// 键
    pub key: String,
    /// 事件类型
    pub kind: InvalidationKind,
    /// 发布者实例ID
    pub source: Uuid,
}

impl InvalidationEvent {
    pub fn set(namespace: impl Into<String>, key: impl Into<String>, source: Uuid) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            kind: InvalidationKind::Set,
            source,
        }
    }

    pub fn delete(namespace: impl Into<String>, key: impl Into<String>, source: Uuid) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            kind: InvalidationKind::Delete,
            source,
        }
    }
}

/// 订阅ID
pub type SubscriptionId = Uuid;

/// 事件处理函数
pub type InvalidationHandler =
    Arc<dyn Fn(InvalidationEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// 失效总线接口
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// 发布事件
    async fn publish(&self, event: InvalidationEvent) -> Result<(), StorageError>;

    /// 订阅事件
    async fn subscribe(&self, handler: InvalidationHandler)
        -> Result<SubscriptionId, StorageError>;

    /// 取消订阅
    fn unsubscribe(&self, id: SubscriptionId);
}

/// 进程内总线
///
/// `publish` 在返回之前依次调用所有订阅者的处理函数。
#[derive(Default)]
pub struct MemoryBus {
    subscribers: parking_lot::RwLock<AHashMap<SubscriptionId, InvalidationHandler>>,
    published: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// 已发布事件数量
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InvalidationBus for MemoryBus {
    async fn publish(&self, event: InvalidationEvent) -> Result<(), StorageError> {
        self.published.fetch_add(1, Ordering::Relaxed);

        let handlers: Vec<InvalidationHandler> =
            self.subscribers.read().values().cloned().collect();

        trace!(
            "发布失效事件 namespace={}, key={}, kind={:?}, subscribers={}",
            event.namespace,
            event.key,
            event.kind,
            handlers.len()
        );

        for handler in handlers {
            handler(event.clone()).await;
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        handler: InvalidationHandler,
    ) -> Result<SubscriptionId, StorageError> {
        let id = Uuid::new_v4();
        self.subscribers.write().insert(id, handler);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().remove(&id);
    }
}
