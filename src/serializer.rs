//! 序列化抽象
//!
//! 缓存条目在写入存储层之前通过 `Serializer` 编码为字符串。

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// 序列化接口
pub trait Serializer: Send + Sync {
    /// 序列化为字符串
    fn serialize<V: Serialize>(&self, value: &V) -> Result<String, CacheError>;

    /// 从字符串反序列化
    fn deserialize<V: DeserializeOwned>(&self, raw: &str) -> Result<V, CacheError>;
}

/// JSON 序列化实现
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<V: Serialize>(&self, value: &V) -> Result<String, CacheError> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize<V: DeserializeOwned>(&self, raw: &str) -> Result<V, CacheError> {
        Ok(serde_json::from_str(raw)?)
    }
}
