//! 配置模块
//!
//! 定义缓存的配置文件结构，支持 YAML 与 TOML 两种格式。
//!
//! ```yaml
//! defaults:
//!   ttl: "30m"
//!   graceful_retain:
//!     enabled: true
//!     duration: "6h"
//! stores:
//!   users:
//!     options:
//!       ttl: "10m"
//!       early_expiration: 0.8
//!     memory:
//!       max_size: 5000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::constants::DEFAULT_MEMORY_MAX_SIZE;
use crate::error::CacheError;
use crate::options::RawCacheOptions;

/// 缓存配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// 全局默认选项
    #[serde(default)]
    pub defaults: RawCacheOptions,
    /// 各存储的配置
    #[serde(default)]
    pub stores: BTreeMap<String, StoreSettings>,
}

impl CacheSettings {
    /// 从 YAML 字符串解析
    pub fn from_yaml_str(content: &str) -> Result<Self, CacheError> {
        let settings: CacheSettings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self, CacheError> {
        let settings: CacheSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 从文件加载，根据扩展名选择格式
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(CacheError::Config(format!(
                "不支持的配置文件格式: {:?}，支持: yaml, yml, toml",
                other
            ))),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), CacheError> {
        for (name, store) in &self.stores {
            if name.is_empty() {
                return Err(CacheError::Config("存储名称不能为空".to_string()));
            }

            store
                .validate()
                .map_err(|e| CacheError::Config(format!("存储[{}]校验失败: {}", name, e)))?;
        }

        Ok(())
    }

    /// 获取存储配置
    pub fn store(&self, name: &str) -> Option<&StoreSettings> {
        self.stores.get(name)
    }
}

/// 单个存储的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// 存储级选项
    #[serde(default)]
    pub options: RawCacheOptions,
    /// 本地内存层配置
    #[serde(default)]
    pub memory: Option<MemorySettings>,
}

impl StoreSettings {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(memory) = &self.memory {
            if memory.max_size == 0 {
                return Err("memory.max_size 必须大于0".to_string());
            }
        }
        Ok(())
    }
}

/// 内存层配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySettings {
    /// 最大条目数，超出后按LRU淘汰
    #[serde(default = "default_memory_max_size")]
    pub max_size: usize,
    /// 键前缀
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MEMORY_MAX_SIZE,
            prefix: None,
        }
    }
}

fn default_memory_max_size() -> usize {
    DEFAULT_MEMORY_MAX_SIZE
}

/// 解析时长字符串
///
/// 支持的格式：
/// - `500` / `500ms` - 毫秒
/// - `10s` - 秒
/// - `5m` - 分钟
/// - `2h` - 小时
/// - `1d` - 天
///
/// # 示例
///
/// ```rust
/// use tierflow::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, CacheError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CacheError::Config("时长不能为空".to_string()));
    }

    let (num_part, unit_part) =
        input.split_at(input.find(|c: char| c.is_alphabetic()).unwrap_or(input.len()));

    let num_str = num_part.trim();
    let unit = unit_part.trim().to_lowercase();

    if num_str.is_empty() {
        return Err(CacheError::Config("时长格式错误：缺少数字部分".to_string()));
    }

    let num: u64 = num_str
        .parse()
        .map_err(|_| CacheError::Config(format!("无效的数字格式: {}", num_str)))?;

    if num == 0 {
        return Err(CacheError::Config("时长必须大于0".to_string()));
    }

    let duration = match unit.as_str() {
        "" | "ms" | "millis" | "milliseconds" => Duration::from_millis(num),
        "s" | "sec" | "second" | "seconds" => Duration::from_secs(num),
        "m" | "min" | "minute" | "minutes" => Duration::from_secs(num * 60),
        "h" | "hr" | "hour" | "hours" => Duration::from_secs(num * 3600),
        "d" | "day" | "days" => Duration::from_secs(num * 86400),
        _ => {
            return Err(CacheError::Config(format!(
                "不支持的单位: {}。支持的单位: ms, s, m, h, d",
                unit
            )));
        }
    };

    Ok(duration)
}

/// 时长的 serde 支持：接受字符串（`"10m"`）或整数（毫秒）
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Millis(u64),
        Text(String),
    }

    impl RawDuration {
        fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
            match self {
                RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
                RawDuration::Text(text) => super::parse_duration(&text).map_err(E::custom),
            }
        }
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.into_duration()
    }

    pub mod option {
        use super::RawDuration;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<RawDuration>::deserialize(deserializer)?
                .map(RawDuration::into_duration)
                .transpose()
        }
    }
}
