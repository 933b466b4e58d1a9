//! JACK Output Library
//!
//! 实时音频输出桥：把播放器的交织样本流拆分到每声道一个 JACK 端口。
//!
//! - `output`: 输出插件（连接管理、process 回调、格式协商）
//! - `server`: 音频服务器抽象，`jack` feature 提供真实后端
//! - `host`: 输出桥对宿主播放器的要求
//! - `player`: 演示宿主（解码 → streamer）

pub mod audio;
pub mod decode;
pub mod error;
pub mod host;
pub mod output;
pub mod player;
pub mod server;

pub use error::{BridgeError, ConnectionError, Result};
