//! 宿主配置文件
//!
//! TOML 格式，保存输出桥的三个开关：
//!
//! ```toml
//! [jack]
//! autostart = 1
//! autoconnect = 1
//! autorestart = 0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::{self, CONF_AUTOCONNECT, CONF_AUTORESTART, CONF_AUTOSTART};

/// 配置文件错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// `[jack]` 段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JackSettings {
    pub autostart: i32,
    pub autoconnect: i32,
    pub autorestart: i32,
}

impl Default for JackSettings {
    fn default() -> Self {
        let default_of = |key: &str| host::setting_default(key).unwrap_or(false) as i32;
        Self {
            autostart: default_of(CONF_AUTOSTART),
            autoconnect: default_of(CONF_AUTOCONNECT),
            autorestart: default_of(CONF_AUTORESTART),
        }
    }
}

/// 宿主持久化配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub jack: JackSettings,
}

impl HostConfig {
    /// 默认路径：`$XDG_CONFIG_HOME/jack-output/config.toml`，回退到 `~/.config`
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("jack-output").join("config.toml"))
    }

    /// 读取配置，文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(io_err)
    }

    /// 按 `jack.*` 键读取
    pub fn get(&self, key: &str) -> Option<i32> {
        match key {
            CONF_AUTOSTART => Some(self.jack.autostart),
            CONF_AUTOCONNECT => Some(self.jack.autoconnect),
            CONF_AUTORESTART => Some(self.jack.autorestart),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: i32) -> Result<(), ConfigError> {
        let slot = match key {
            CONF_AUTOSTART => &mut self.jack.autostart,
            CONF_AUTOCONNECT => &mut self.jack.autoconnect,
            CONF_AUTORESTART => &mut self.jack.autorestart,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        *slot = value;
        Ok(())
    }
}
