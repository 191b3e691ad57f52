//! 缓存选项解析
//!
//! 将用户配置（TTL、优雅保留、提前过期比例等）解析为具体的 TTL。
//!
//! # 优先级
//!
//! 选项按 调用级 > 存储级 > 全局 的顺序合并，每个字段取第一个设置的层：
//!
//! - 标量字段（`ttl`、`early_expiration`、`suppress_remote_cache_errors`）直接覆盖
//! - `graceful_retain` 作为整体覆盖，不做字段级深度合并；
//!   某一层只设置了 `enabled` 时使用内置默认时长，而不是下层的时长
//!
//! # 示例
//!
//! ```rust
//! use tierflow::options::{CacheOptions, RawCacheOptions};
//! use std::time::Duration;
//!
//! let global = RawCacheOptions::new().ttl(Duration::from_secs(60));
//! let call = RawCacheOptions::new().early_expiration(0.5);
//!
//! let options = CacheOptions::resolve(&[&call, &global]);
//! assert_eq!(options.logical_ttl(), Some(Duration::from_secs(60)));
//! assert_eq!(options.early_expire_ttl(), Some(Duration::from_secs(30)));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::serde_duration;
use crate::constants::{
    DEFAULT_GRACE_DURATION, DEFAULT_SUPPRESS_REMOTE_CACHE_ERRORS, DEFAULT_TTL, NEVER_EXPIRES,
};

/// 单层的优雅保留配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GracefulRetainOptions {
    /// 是否启用
    pub enabled: bool,
    /// 保留时长（未设置时使用默认值）
    #[serde(default, with = "serde_duration::option")]
    pub duration: Option<Duration>,
}

impl GracefulRetainOptions {
    pub fn enabled(duration: Duration) -> Self {
        Self {
            enabled: true,
            duration: Some(duration),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            duration: None,
        }
    }
}

/// 原始缓存选项（单层，所有字段可选）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCacheOptions {
    /// 逻辑TTL
    #[serde(default, with = "serde_duration::option")]
    pub ttl: Option<Duration>,
    /// 优雅保留
    #[serde(default)]
    pub graceful_retain: Option<GracefulRetainOptions>,
    /// 提前过期比例，仅 (0, 1) 区间内有效
    #[serde(default)]
    pub early_expiration: Option<f64>,
    /// 是否吞掉远程缓存错误
    #[serde(default)]
    pub suppress_remote_cache_errors: Option<bool>,
}

impl RawCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn graceful_retain(mut self, graceful_retain: GracefulRetainOptions) -> Self {
        self.graceful_retain = Some(graceful_retain);
        self
    }

    pub fn early_expiration(mut self, fraction: f64) -> Self {
        self.early_expiration = Some(fraction);
        self
    }

    pub fn suppress_remote_cache_errors(mut self, suppress: bool) -> Self {
        self.suppress_remote_cache_errors = Some(suppress);
        self
    }
}

/// 解析后的优雅保留配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracefulRetain {
    pub enabled: bool,
    pub duration: Duration,
}

impl Default for GracefulRetain {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: DEFAULT_GRACE_DURATION,
        }
    }
}

impl From<GracefulRetainOptions> for GracefulRetain {
    fn from(options: GracefulRetainOptions) -> Self {
        Self {
            enabled: options.enabled,
            duration: options.duration.unwrap_or(DEFAULT_GRACE_DURATION),
        }
    }
}

/// 解析后的缓存选项
///
/// 在创建缓存条目时计算一次，之后不再重新计算。
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    logical_ttl: Option<Duration>,
    physical_ttl: Option<Duration>,
    early_expire_ttl: Option<Duration>,
    graceful_retain: GracefulRetain,
    suppress_remote_cache_errors: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::resolve(&[])
    }
}

impl CacheOptions {
    /// 按优先级合并各层选项（第一个元素优先级最高）
    pub fn resolve(layers: &[&RawCacheOptions]) -> Self {
        let ttl = layers
            .iter()
            .find_map(|layer| layer.ttl)
            .unwrap_or(DEFAULT_TTL);

        let graceful_retain = layers
            .iter()
            .find_map(|layer| layer.graceful_retain)
            .map(GracefulRetain::from)
            .unwrap_or_default();

        let fraction = layers.iter().find_map(|layer| layer.early_expiration);

        let suppress_remote_cache_errors = layers
            .iter()
            .find_map(|layer| layer.suppress_remote_cache_errors)
            .unwrap_or(DEFAULT_SUPPRESS_REMOTE_CACHE_ERRORS);

        let physical_ttl = if graceful_retain.enabled {
            graceful_retain.duration
        } else {
            ttl
        };

        Self {
            logical_ttl: Some(ttl),
            physical_ttl: Some(physical_ttl),
            early_expire_ttl: resolve_early_expire_ttl(ttl, fraction),
            graceful_retain,
            suppress_remote_cache_errors,
        }
    }

    /// 转换为永久选项：无逻辑过期、无物理TTL、无提前刷新
    pub fn forever(mut self) -> Self {
        self.logical_ttl = None;
        self.physical_ttl = None;
        self.early_expire_ttl = None;
        self
    }

    pub fn logical_ttl(&self) -> Option<Duration> {
        self.logical_ttl
    }

    pub fn physical_ttl(&self) -> Option<Duration> {
        self.physical_ttl
    }

    pub fn early_expire_ttl(&self) -> Option<Duration> {
        self.early_expire_ttl
    }

    pub fn graceful_retain(&self) -> GracefulRetain {
        self.graceful_retain
    }

    pub fn is_graceful_retain_enabled(&self) -> bool {
        self.graceful_retain.enabled
    }

    pub fn suppress_remote_cache_errors(&self) -> bool {
        self.suppress_remote_cache_errors
    }

    /// 逻辑过期时间点（毫秒时间戳）
    pub fn logical_expiration_from(&self, now: i64) -> i64 {
        match self.logical_ttl {
            Some(ttl) => now.saturating_add(duration_millis(ttl)),
            None => NEVER_EXPIRES,
        }
    }

    /// 提前过期时间点（毫秒时间戳）
    pub fn early_expiration_from(&self, now: i64) -> Option<i64> {
        self.early_expire_ttl
            .map(|ttl| now.saturating_add(duration_millis(ttl)))
    }
}

/// 计算提前过期TTL
///
/// 比例不在 (0, 1) 区间内时静默禁用提前刷新，仅记录警告。
fn resolve_early_expire_ttl(ttl: Duration, fraction: Option<f64>) -> Option<Duration> {
    let fraction = fraction?;

    if fraction > 0.0 && fraction < 1.0 {
        Some(ttl.mul_f64(fraction))
    } else {
        warn!(
            "提前过期比例 {} 不在 (0, 1) 区间内，已禁用提前刷新",
            fraction
        );
        None
    }
}

pub(crate) fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
