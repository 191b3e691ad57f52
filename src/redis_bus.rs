//! Redis 发布/订阅失效总线
//!
//! 事件以 JSON 形式发布到同一个频道，每个订阅在独立的任务中监听。

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::Client;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::bus::{InvalidationBus, InvalidationEvent, InvalidationHandler, SubscriptionId};
use crate::constants::DEFAULT_BUS_CHANNEL;
use crate::error::StorageError;
use crate::redis_storage::RedisConfig;

/// Redis 失效总线
pub struct RedisBus {
    client: Client,
    publisher: ConnectionManager,
    channel: String,
    listeners: DashMap<SubscriptionId, JoinHandle<()>>,
}

impl RedisBus {
    /// 使用默认频道连接
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        Self::with_channel(config, DEFAULT_BUS_CHANNEL).await
    }

    pub async fn with_channel(
        config: &RedisConfig,
        channel: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let client = config.client()?;
        let publisher = ConnectionManager::new(client.clone()).await.map_err(|e| {
            error!("创建Redis发布连接失败: {}", e);
            StorageError::ConnectionError(format!("创建Redis发布连接失败: {}", e))
        })?;

        Ok(Self {
            client,
            publisher,
            channel: channel.into(),
            listeners: DashMap::new(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 监听任务数量
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl InvalidationBus for RedisBus {
    async fn publish(&self, event: InvalidationEvent) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| StorageError::QueryError(format!("事件序列化失败: {}", e)))?;

        let mut conn = self.publisher.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        debug!(
            "发布失效事件 channel={}, key={}, receivers={}",
            self.channel, event.key, receivers
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        handler: InvalidationHandler,
    ) -> Result<SubscriptionId, StorageError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(&self.channel).await?;

        let channel = self.channel.clone();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.on_message();

            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("读取失效事件失败 channel={}: {}", channel, e);
                        continue;
                    }
                };

                match serde_json::from_str::<InvalidationEvent>(&payload) {
                    Ok(event) => handler(event).await,
                    Err(e) => warn!("无法解析失效事件 channel={}: {}", channel, e),
                }
            }

            debug!("失效事件监听结束 channel={}", channel);
        });

        let id = Uuid::new_v4();
        self.listeners.insert(id, task);
        debug!("订阅失效事件 channel={}, subscription={}", self.channel, id);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((_, task)) = self.listeners.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for RedisBus {
    fn drop(&mut self) {
        for listener in self.listeners.iter() {
            listener.value().abort();
        }
    }
}
