use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Encoding;
use crate::utils::DumpFormat;
use crate::{ProxyError, Result};

/// 代理的全部配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upstream: UpstreamConfig,
    /// 请求头/请求体在字节与文本之间转换时的编码
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 每个连接只读取一次，最多这么多字节
    pub read_buffer_size: usize,
    /// 把每次交换打印到 stdout: "off" | "compact" | "verbose"
    pub debug_dump: DumpFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
            read_buffer_size: 1024,
            debug_dump: DumpFormat::Off,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 存储后端名称，目前只有 "json"
    pub kind: String,
    pub dir: PathBuf,
    pub raw_dir: PathBuf,
    /// 保存时同时写入原始请求 `{raw_dir}/{identifier}.http`
    pub record_raw: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "json".to_string(),
            dir: PathBuf::from("./data/json"),
            raw_dir: PathBuf::from("./data/raw"),
            record_raw: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// 0 表示不设超时
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "proxyrec.toml";

    const STORAGE_DIR_ENV: &'static str = "PROXYREC_STORAGE_DIR";
    const RAW_DIR_ENV: &'static str = "PROXYREC_RAW_DIR";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ProxyConfig> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录及其父目录
    /// 2. 用户配置目录 ~/.config/proxyrec/
    pub fn find_config() -> Option<PathBuf> {
        Self::find_in_ancestors().or_else(Self::find_in_user_dir)
    }

    fn find_in_ancestors() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    fn find_in_user_dir() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("proxyrec").join(Self::CONFIG_FILE);
        config_path.exists().then_some(config_path)
    }

    /// 加载最终配置：显式路径 > 自动查找 > 默认值，然后应用环境变量覆盖
    ///
    /// An explicit path that cannot be read is an error; a discovered file that
    /// fails to parse is an error too, only a missing file falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<ProxyConfig> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(Self::find_config) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_path(path)?
            }
            None => ProxyConfig::default(),
        };

        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// `lookup` 抽象了环境变量读取，便于测试
    pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(Self::STORAGE_DIR_ENV).filter(|v| !v.is_empty()) {
            config.storage.dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(Self::RAW_DIR_ENV).filter(|v| !v.is_empty()) {
            config.storage.raw_dir = PathBuf::from(dir);
        }
    }
}
