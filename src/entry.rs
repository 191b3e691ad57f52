//! 缓存条目
//!
//! 缓存值及其过期时间点（毫秒时间戳）。物理过期时间不保存在条目中，
//! 而是在写入存储层时以TTL的形式传给驱动。
//!
//! 存储格式：
//!
//! ```json
//! {"value": "...", "logicalExpiration": 1700000000000, "earlyExpiration": 1699999990000}
//! ```
//!
//! 未启用提前过期时省略 `earlyExpiration`；缺少 `logicalExpiration` 的记录视为永不过期。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::NEVER_EXPIRES;
use crate::error::CacheError;
use crate::options::{duration_millis, CacheOptions};
use crate::serializer::Serializer;

/// 当前时间（毫秒时间戳）
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// 未过期
    Fresh,
    /// 已到提前刷新时间，但仍在逻辑有效期内
    EarlyDue,
    /// 逻辑过期，但处于优雅保留窗口中
    GraceExpired,
    /// 逻辑过期且未启用优雅保留
    Expired,
}

impl EntryState {
    /// 是否可直接返回给调用方而不重新计算
    pub fn is_usable(&self) -> bool {
        matches!(self, EntryState::Fresh | EntryState::EarlyDue)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord<V> {
    value: V,
    #[serde(default = "never_expires")]
    logical_expiration: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    early_expiration: Option<i64>,
}

fn never_expires() -> i64 {
    NEVER_EXPIRES
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    key: String,
    value: T,
    logical_expiration: i64,
    early_expiration: Option<i64>,
}

impl<T> CacheEntry<T> {
    /// 根据解析后的选项创建条目，过期时间点从当前时刻计算
    pub fn new(key: impl Into<String>, value: T, options: &CacheOptions) -> Self {
        let now = now_millis();
        Self::from_parts(
            key,
            value,
            options.logical_expiration_from(now),
            options.early_expiration_from(now),
        )
    }

    /// 使用给定的过期时间点创建条目
    ///
    /// 不早于逻辑过期时间的提前过期时间会被丢弃。
    pub fn from_parts(
        key: impl Into<String>,
        value: T,
        logical_expiration: i64,
        early_expiration: Option<i64>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            logical_expiration,
            early_expiration: early_expiration.filter(|early| *early < logical_expiration),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn logical_expiration(&self) -> i64 {
        self.logical_expiration
    }

    pub fn early_expiration(&self) -> Option<i64> {
        self.early_expiration
    }

    pub fn is_forever(&self) -> bool {
        self.logical_expiration == NEVER_EXPIRES
    }

    pub fn is_logically_expired(&self) -> bool {
        now_millis() >= self.logical_expiration
    }

    pub fn is_early_expired(&self) -> bool {
        let Some(early) = self.early_expiration else {
            return false;
        };

        if self.is_logically_expired() {
            return false;
        }

        now_millis() >= early
    }

    /// 计算条目状态
    pub fn state(&self, grace_enabled: bool) -> EntryState {
        if self.is_logically_expired() {
            if grace_enabled {
                EntryState::GraceExpired
            } else {
                EntryState::Expired
            }
        } else if self.is_early_expired() {
            EntryState::EarlyDue
        } else {
            EntryState::Fresh
        }
    }

    /// 工厂失败时延长逻辑有效期，并关闭提前刷新
    pub fn apply_fallback_duration(&mut self, duration: Duration) -> &mut Self {
        self.logical_expiration = self
            .logical_expiration
            .saturating_add(duration_millis(duration));
        self.early_expiration = None;
        self
    }

    /// 立即逻辑过期
    pub fn expire(&mut self) -> &mut Self {
        self.logical_expiration = now_millis() - 100;
        self.early_expiration = None;
        self
    }
}

impl<T: Serialize> CacheEntry<T> {
    /// 序列化为存储格式
    pub fn serialize<S: Serializer>(&self, serializer: &S) -> Result<String, CacheError> {
        serializer.serialize(&StoredRecord {
            value: &self.value,
            logical_expiration: self.logical_expiration,
            early_expiration: self.early_expiration,
        })
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    /// 从驱动返回的原始字符串还原条目
    pub fn from_driver<S: Serializer>(
        key: impl Into<String>,
        raw: &str,
        serializer: &S,
    ) -> Result<Self, CacheError> {
        let record: StoredRecord<T> = serializer.deserialize(raw)?;
        Ok(Self::from_parts(
            key,
            record.value,
            record.logical_expiration,
            record.early_expiration,
        ))
    }
}
