//! 演示宿主播放器
//!
//! 解码文件、提供 stream / 音量 / 配置，供 CLI 驱动输出插件

pub mod config;
pub mod streamer;

pub use config::{ConfigError, HostConfig};
pub use streamer::Streamer;
