//! Redis 缓存层驱动
//!
//! 基于 `ConnectionManager` 的 L2 驱动，支持键前缀、密码（`Secret` 包装）
//! 和指数退避重试。物理 TTL 以毫秒精度（`SET ... PX`）写入。

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo};
use secrecy::{ExposeSecret, Secret};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::error::StorageError;
use crate::options::duration_millis;
use crate::storage::TierDriver;

/// SCAN 每批返回的键数量
const SCAN_BATCH_SIZE: usize = 100;

/// Redis配置
#[derive(Clone)]
pub struct RedisConfig {
    /// Redis连接URL
    pub url: String,
    /// 数据库索引
    pub db: i64,
    /// 密码（使用 Secret 包装以防止意外泄露）
    pub password: Option<Secret<String>>,
    /// 键前缀
    pub prefix: Option<String>,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试初始退避时间
    pub retry_initial_backoff: Duration,
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &self.url)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("prefix", &self.prefix)
            .field("max_retries", &self.max_retries)
            .field("retry_initial_backoff", &self.retry_initial_backoff)
            .finish()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            db: 0,
            password: None,
            prefix: None,
            max_retries: 3,
            retry_initial_backoff: Duration::from_millis(100),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    pub fn password_secret(mut self, password: Secret<String>) -> Self {
        self.password = Some(password);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_initial_backoff(mut self, backoff: Duration) -> Self {
        self.retry_initial_backoff = backoff;
        self
    }

    /// 构造连接信息，URL 中的密码会被配置中的密码覆盖
    pub(crate) fn connection_info(&self) -> Result<ConnectionInfo, StorageError> {
        let mut info = self.url.as_str().into_connection_info().map_err(|e| {
            error!("解析Redis URL失败: {}", e);
            StorageError::ConnectionError(format!("无效的Redis URL: {}", e))
        })?;

        info.redis.db = self.db;
        if let Some(password) = &self.password {
            info.redis.password = Some(password.expose_secret().clone());
        }

        Ok(info)
    }

    pub(crate) fn client(&self) -> Result<Client, StorageError> {
        Client::open(self.connection_info()?).map_err(|e| {
            error!("创建Redis客户端失败: {}", e);
            StorageError::ConnectionError(format!("创建Redis客户端失败: {}", e))
        })
    }
}

/// 重试统计
#[derive(Debug, Default)]
pub struct RetryStats {
    successful_retries: AtomicU64,
    failed_retries: AtomicU64,
}

impl RetryStats {
    pub fn successful_retries(&self) -> u64 {
        self.successful_retries.load(Ordering::Relaxed)
    }

    pub fn failed_retries(&self) -> u64 {
        self.failed_retries.load(Ordering::Relaxed)
    }

    pub fn total_retries(&self) -> u64 {
        self.successful_retries() + self.failed_retries()
    }
}

fn prefixed_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, key),
        None => key.to_string(),
    }
}

fn clear_pattern(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("{}:*", prefix),
        None => "*".to_string(),
    }
}

/// Redis 存储（L2）
#[derive(Clone)]
pub struct RedisStorage {
    conn: ConnectionManager,
    config: RedisConfig,
    retry_stats: Arc<RetryStats>,
}

impl RedisStorage {
    /// 连接Redis并创建存储
    pub async fn new(config: RedisConfig) -> Result<Self, StorageError> {
        info!("创建Redis存储, URL: {}", config.url);

        let client = config.client()?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            error!("创建Redis连接管理器失败: {}", e);
            StorageError::ConnectionError(format!("创建Redis连接管理器失败: {}", e))
        })?;

        info!("Redis连接建立成功");
        Ok(Self {
            conn,
            config,
            retry_stats: Arc::new(RetryStats::default()),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn retry_stats(&self) -> &RetryStats {
        &self.retry_stats
    }

    /// 检查Redis连接
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.execute_with_retry(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn full_key(&self, key: &str) -> String {
        prefixed_key(self.config.prefix.as_deref(), key)
    }

    /// 带重试的执行
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        let mut backoff = self.config.retry_initial_backoff;
        let mut attempt = 0;

        loop {
            match f(self.conn.clone()).await {
                Ok(result) => {
                    if attempt > 0 {
                        self.retry_stats
                            .successful_retries
                            .fetch_add(1, Ordering::Relaxed);
                        debug!("重试成功，尝试次数: {}", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Redis操作失败，将在 {:?} 后重试 (尝试 {}/{}): {}",
                        backoff, attempt, self.config.max_retries, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.mul_f32(2.0);
                }
                Err(e) => {
                    self.retry_stats
                        .failed_retries
                        .fetch_add(1, Ordering::Relaxed);
                    error!("Redis操作失败，已达最大重试次数: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl TierDriver for RedisStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let full_key = self.full_key(key);

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            async move {
                let result: Option<String> = conn.get(&full_key).await?;
                trace!("GET key={}, hit={}", full_key, result.is_some());
                Ok(result)
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let full_key = self.full_key(key);

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&full_key).arg(value);
                if let Some(ttl) = ttl {
                    cmd.arg("PX").arg(duration_millis(ttl).max(1));
                }

                let _: () = cmd.query_async(&mut conn).await?;
                trace!("SET key={}, ttl={:?}", full_key, ttl);
                Ok(())
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let full_key = self.full_key(key);

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            async move {
                let removed: i64 = conn.del(&full_key).await?;
                trace!("DEL key={}, removed={}", full_key, removed);
                Ok(removed > 0)
            }
        })
        .await
    }

    async fn has(&self, key: &str) -> Result<bool, StorageError> {
        let full_key = self.full_key(key);

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            async move { Ok(conn.exists(&full_key).await?) }
        })
        .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let pattern = clear_pattern(self.config.prefix.as_deref());

        self.execute_with_retry(|mut conn| {
            let pattern = pattern.clone();
            async move {
                let mut cursor: u64 = 0;
                let mut removed = 0usize;

                loop {
                    let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH_SIZE)
                        .query_async(&mut conn)
                        .await?;

                    if !keys.is_empty() {
                        let _: i64 = conn.del(&keys).await?;
                        removed += keys.len();
                    }

                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }

                debug!("清空Redis键 pattern={}, removed={}", pattern, removed);
                Ok(())
            }
        })
        .await
    }

    fn name(&self) -> &str {
        "redis"
    }
}
