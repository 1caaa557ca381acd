//! 统一配置管理
//!
//! 提供 CPU 模型与翻译选项共用的配置 Trait。

use serde::Serialize;

/// 统一配置 Trait
///
/// # 示例
///
/// ```rust,ignore
/// use vm_core::config::{Config, ConfigError};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct BlockLimits {
///     pub max_insns: u32,
/// }
///
/// impl Config for BlockLimits {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.max_insns == 0 {
///             return Err(ConfigError::Invalid("max_insns must be > 0".to_string()));
///         }
///         Ok(())
///     }
///
///     fn defaults() -> Self {
///         Self { max_insns: 512 }
///     }
///
///     fn merge(&self, other: &Self) -> Result<Self, ConfigError> {
///         Ok(other.clone())
///     }
/// }
/// ```
pub trait Config: Serialize + serde::de::DeserializeOwned {
    /// 验证配置的有效性
    ///
    /// # 错误
    ///
    /// 如果配置无效，返回 `ConfigError::Invalid`
    fn validate(&self) -> Result<(), ConfigError>;

    /// 获取默认配置
    fn defaults() -> Self;

    /// 合并两个配置，`other` 优先级更高
    fn merge(&self, other: &Self) -> Result<Self, ConfigError>
    where
        Self: Sized;

    /// 从 TOML 字符串加载配置并校验
    fn from_toml(toml: &str) -> Result<Self, ConfigError>
    where
        Self: Sized,
    {
        let config: Self =
            toml::from_str(toml).map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 字符串加载配置并校验
    fn from_json(json: &str) -> Result<Self, ConfigError>
    where
        Self: Sized,
    {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::Parse(format!("JSON parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 将配置序列化为 TOML
    fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(format!("TOML serialize error: {}", e)))
    }

    /// 将配置序列化为 JSON
    fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(format!("JSON serialize error: {}", e)))
    }
}

/// 配置错误类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// 无效的配置
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// 配置合并冲突
    #[error("Configuration merge conflict: {0}")]
    MergeConflict(String),

    /// 解析错误
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// 序列化错误
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Limits {
        max_insns: u32,
        page_size: u64,
    }

    impl Config for Limits {
        fn validate(&self) -> Result<(), ConfigError> {
            if self.max_insns == 0 {
                return Err(ConfigError::Invalid("max_insns must be > 0".to_string()));
            }
            if !self.page_size.is_power_of_two() {
                return Err(ConfigError::Invalid("page_size must be a power of two".to_string()));
            }
            Ok(())
        }

        fn defaults() -> Self {
            Self {
                max_insns: 512,
                page_size: 4096,
            }
        }

        fn merge(&self, other: &Self) -> Result<Self, ConfigError> {
            Ok(other.clone())
        }
    }

    #[test]
    fn test_from_toml_validates() {
        let ok = Limits::from_toml("max_insns = 16\npage_size = 1024\n");
        assert_eq!(
            ok,
            Ok(Limits {
                max_insns: 16,
                page_size: 1024
            })
        );

        let bad = Limits::from_toml("max_insns = 0\npage_size = 1024\n");
        assert!(matches!(bad, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = Limits::defaults();
        let json = config.to_json().unwrap();
        assert_eq!(Limits::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(Limits::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
