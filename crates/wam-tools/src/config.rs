//! TOML 配置查询
//!
//! WAM 的标定数据（零位、传动比、限值）放在 TOML 文件里，按
//! `"wam.low_level.home"` 这样的点分路径取值。路径不存在或类型不对
//! 都是带路径的硬错误，标定数据打错字不能悄悄用默认值顶上。

use std::fs;
use std::path::Path;

use thiserror::Error;
use toml::Value;
use tracing::debug;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config key not found: '{path}'")]
    MissingKey { path: String },

    #[error("config key '{path}' has wrong type (expected {expected})")]
    WrongType { path: String, expected: &'static str },
}

/// 已解析的 TOML 配置
pub struct Config {
    root: Value,
}

impl Config {
    /// 从文件加载
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        Self::from_str(&fs::read_to_string(path)?)
    }

    /// 从字符串解析
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            root: text.parse::<Value>()?,
        })
    }

    fn lookup(&self, path: &str) -> Result<&Value, ConfigError> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current
                .as_table()
                .and_then(|t| t.get(segment))
                .ok_or_else(|| ConfigError::MissingKey {
                    path: path.to_string(),
                })?;
        }
        Ok(current)
    }

    /// 按点分路径取浮点值；整数值自动提升
    pub fn lookup_f64(&self, path: &str) -> Result<f64, ConfigError> {
        let value = self.lookup(path)?;
        value
            .as_float()
            .or_else(|| value.as_integer().map(|i| i as f64))
            .ok_or_else(|| ConfigError::WrongType {
                path: path.to_string(),
                expected: "float",
            })
    }

    /// 按点分路径取整数值
    pub fn lookup_i64(&self, path: &str) -> Result<i64, ConfigError> {
        self.lookup(path)?
            .as_integer()
            .ok_or_else(|| ConfigError::WrongType {
                path: path.to_string(),
                expected: "integer",
            })
    }

    /// 按点分路径取字符串
    pub fn lookup_str(&self, path: &str) -> Result<&str, ConfigError> {
        self.lookup(path)?
            .as_str()
            .ok_or_else(|| ConfigError::WrongType {
                path: path.to_string(),
                expected: "string",
            })
    }

    /// 按点分路径取整数数组（节点 ID 列表）
    pub fn lookup_i64_array(&self, path: &str) -> Result<Vec<i64>, ConfigError> {
        let array = self
            .lookup(path)?
            .as_array()
            .ok_or_else(|| ConfigError::WrongType {
                path: path.to_string(),
                expected: "array of integers",
            })?;
        array
            .iter()
            .map(|v| {
                v.as_integer().ok_or_else(|| ConfigError::WrongType {
                    path: path.to_string(),
                    expected: "array of integers",
                })
            })
            .collect()
    }

    /// 按点分路径取浮点数组（标定向量）
    pub fn lookup_f64_array(&self, path: &str) -> Result<Vec<f64>, ConfigError> {
        let array = self
            .lookup(path)?
            .as_array()
            .ok_or_else(|| ConfigError::WrongType {
                path: path.to_string(),
                expected: "array of floats",
            })?;
        array
            .iter()
            .map(|v| {
                v.as_float()
                    .or_else(|| v.as_integer().map(|i| i as f64))
                    .ok_or_else(|| ConfigError::WrongType {
                        path: path.to_string(),
                        expected: "array of floats",
                    })
            })
            .collect()
    }
}
