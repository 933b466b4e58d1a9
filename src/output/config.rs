//! 输出桥配置

use std::time::Duration;

use crate::audio::WaveFormat;

/// 默认 client 名
pub const DEFAULT_CLIENT_NAME: &str = "jack-output";

/// 输出桥配置
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// 在服务器上注册的 client 名
    pub client_name: String,
    /// 输出端口名前缀，后接 1-based 序号
    pub port_prefix: String,
    /// 初始格式（声道数决定端口数）
    pub format: WaveFormat,
    /// 服务器关闭后重连前的等待
    pub restart_delay: Duration,
    /// 断开前后给服务器留出的时间
    pub disconnect_grace: Duration,
    /// scratch buffer 的最小帧数
    /// 服务器报告的 period 更大时以服务器为准
    pub min_scratch_frames: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            port_prefix: "playback_".to_string(),
            format: WaveFormat::default(),
            restart_delay: Duration::from_secs(1),
            disconnect_grace: Duration::from_secs(1),
            min_scratch_frames: 8192,
        }
    }
}

impl BridgeConfig {
    /// 第 `index` 个声道（0-based）的端口短名
    pub fn port_name(&self, index: usize) -> String {
        format!("{}{}", self.port_prefix, index + 1)
    }
}
