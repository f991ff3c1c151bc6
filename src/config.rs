//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub biometric: BiometricConfig,
}

/// 密钥保险库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// 软件密钥库目录（每个别名一个条目文件）
    pub keystore_dir: String,
    /// 主密钥所在的环境变量名
    pub master_key_env: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

/// 生物识别配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricConfig {
    /// 是否启用生物识别门（禁用时调用方直接使用保险库会话）
    pub enabled: bool,
    /// 单次认证超时（秒）
    pub auth_timeout_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            keystore_dir: "./keystore".to_string(),
            master_key_env: "IRONKEY_MASTER_KEY".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            enable_file_logging: false,
            log_file_path: None,
        }
    }
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth_timeout_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            logging: LoggingConfig::default(),
            biometric: BiometricConfig::default(),
        }
    }
}

impl Config {
    /// 从TOML配置文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 从环境变量加载（.env 文件优先加载，已存在的环境变量不覆盖）
    ///
    /// 支持的变量：
    /// - `IRONKEY_KEYSTORE_DIR` - 密钥库目录
    /// - `IRONKEY_MASTER_KEY_ENV` - 主密钥环境变量名
    /// - `IRONKEY_LOG_LEVEL` / `IRONKEY_LOG_FORMAT` - 日志级别与格式
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(dir) = std::env::var("IRONKEY_KEYSTORE_DIR") {
            config.vault.keystore_dir = dir;
        }
        if let Ok(env_name) = std::env::var("IRONKEY_MASTER_KEY_ENV") {
            config.vault.master_key_env = env_name;
        }
        if let Ok(level) = std::env::var("IRONKEY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("IRONKEY_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vault.master_key_env, "IRONKEY_MASTER_KEY");
        assert_eq!(config.logging.level, "info");
        assert!(config.biometric.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [vault]
            keystore_dir = "/data/keystore"
            master_key_env = "MY_MASTER_KEY"

            [logging]
            level = "debug"
            format = "json"
            enable_file_logging = false

            [biometric]
            enabled = false
            auth_timeout_secs = 10
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.vault.keystore_dir, "/data/keystore");
        assert_eq!(config.logging.format, "json");
        assert!(!config.biometric.enabled);
        assert_eq!(config.biometric.auth_timeout_secs, 10);
    }
}
