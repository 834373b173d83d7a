//! 统一配置中心
//!
//! 加载顺序（后者覆盖前者）：
//! - 内置默认值
//! - `CHAT_CONFIG_FILE` 指定的配置文件（按扩展名识别 TOML/YAML/JSON）
//! - `CHAT_` 前缀的环境变量，嵌套字段用 `__` 分隔，例如 `CHAT_SERVER__PORT`
//! - 兼容旧部署的 `PORT` 环境变量，只覆盖监听端口

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG_FILE";
pub const ENV_PREFIX: &str = "CHAT_";
pub const LEGACY_PORT_ENV: &str = "PORT";

/// 全局应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5555,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 持久化文件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: String,
    /// 先写临时文件再重命名覆盖
    pub atomic_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "chat_data.json".into(),
            atomic_writes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` 语法；设置了 `RUST_LOG` 时以其为准
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl AppConfig {
    /// 按优先级从默认值、配置文件和环境变量加载，并校验。
    pub fn load() -> Result<Self, ConfigError> {
        let config: AppConfig = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 组装各层配置来源，不做提取。
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment = figment.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                figment = figment.merge(Json::file(path));
            } else {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["config_file"])
                    .split("__"),
            )
            .merge(
                Env::raw()
                    .only(&[LEGACY_PORT_ENV])
                    .map(|_| "server.port".into()),
            )
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "host cannot be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerPort(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::InvalidStorageConfig(
                "storage path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("Invalid server port: {0}")]
    InvalidServerPort(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid storage configuration: {0}")]
    InvalidStorageConfig(String),
}
