//! 日志初始化
//!
//! 基于 `tracing-subscriber` 的日志输出配置，过滤规则可以被
//! `RUST_LOG` 环境变量覆盖。
//!
//! # 示例
//!
//! ```rust
//! use tierflow::telemetry::{init_tracing, TelemetryConfig};
//!
//! let _ = init_tracing(&TelemetryConfig::default().filter("tierflow=debug"));
//! ```

use tracing_subscriber::EnvFilter;

use crate::error::CacheError;

/// 日志配置
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// 默认过滤规则（`RUST_LOG` 未设置时使用）
    pub filter: String,
    /// 是否输出 target
    pub with_target: bool,
    /// 是否使用 ANSI 颜色
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "tierflow=info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, CacheError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.filter)
                .map_err(|e| CacheError::Config(format!("无效的日志过滤规则: {}", e))),
        }
    }
}

/// 安装全局日志订阅者
///
/// 已经安装过订阅者时返回错误。
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), CacheError> {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|e| CacheError::Config(format!("日志初始化失败: {}", e)))
}
