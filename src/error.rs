//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。`CacheError` 实现了 `Clone`，
//! 因此同一个单飞执行的结果（包括错误）可以广播给所有等待者。

use std::sync::Arc;
use thiserror::Error;

/// 缓存错误类型
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// 工厂函数执行失败
    #[error("工厂函数执行失败: {0}")]
    Factory(Arc<anyhow::Error>),

    /// 远程缓存层（L2）错误
    #[error("远程缓存错误: {0}")]
    RemoteTier(StorageError),

    /// 本地缓存层（L1）错误
    #[error("本地缓存错误: {0}")]
    LocalTier(StorageError),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 单飞锁错误
    #[error("锁获取错误: {0}")]
    Lock(String),
}

impl CacheError {
    /// 包装工厂函数返回的错误
    pub fn factory(err: anyhow::Error) -> Self {
        CacheError::Factory(Arc::new(err))
    }

    /// 是否为工厂函数错误
    pub fn is_factory(&self) -> bool {
        matches!(self, CacheError::Factory(_))
    }

    /// 是否为远程缓存层错误
    pub fn is_remote(&self) -> bool {
        matches!(self, CacheError::RemoteTier(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CacheError {
    fn from(err: serde_yaml::Error) -> Self {
        CacheError::Config(format!("YAML解析错误: {}", err))
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        CacheError::Config(format!("TOML解析错误: {}", err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Config(format!("IO错误: {}", err))
    }
}

/// 存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),

    /// 未找到
    #[error("未找到: {0}")]
    NotFound(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StorageError::TimeoutError(err.to_string())
        } else if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            StorageError::ConnectionError(err.to_string())
        } else {
            StorageError::QueryError(err.to_string())
        }
    }
}
