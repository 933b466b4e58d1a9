//! 输出插件
//!
//! 宿主播放器看到的接口：生命周期、transport、格式设置。
//! 所有方法都在控制线程调用。

use std::sync::Arc;

use log::debug;

use crate::audio::{TransferStats, WaveFormat};
use crate::error::{BridgeError, Result};
use crate::host::Host;
use crate::server::AudioServer;

use super::client::{ClientState, PlaybackState};
use super::config::BridgeConfig;
use super::connection::ConnectionManager;
use super::negotiator::FormatNegotiator;

/// 插件标识
pub const PLUGIN_ID: &str = "jack";
pub const PLUGIN_NAME: &str = "JACK output plugin";
pub const PLUGIN_DESCRIPTION: &str = "plays sound via JACK API";

pub struct OutputPlugin {
    manager: Arc<ConnectionManager>,
    negotiator: FormatNegotiator,
}

impl OutputPlugin {
    /// 宿主可以直接控制音量
    pub const HAS_VOLUME: bool = true;

    /// 创建插件（尚未连接）
    ///
    /// 配置的格式必须是 32-bit float 且至少一个声道
    pub fn new(server: Arc<dyn AudioServer>, host: Arc<dyn Host>, config: BridgeConfig) -> Result<Self> {
        if !config.format.is_supported() {
            return Err(BridgeError::Config(format!(
                "output format must be 32-bit float with at least one channel, got {} ch {} bit (float: {})",
                config.format.channels, config.format.bits_per_sample, config.format.is_float
            )));
        }

        let client = Arc::new(ClientState::new(config.client_name.clone(), config.format));
        let manager = ConnectionManager::new(
            client,
            server,
            host,
            Arc::new(TransferStats::new()),
            config,
        );
        let negotiator = FormatNegotiator::new(Arc::clone(&manager));
        Ok(Self {
            manager,
            negotiator,
        })
    }

    /// 插件声明的默认格式
    pub fn default_format() -> WaveFormat {
        WaveFormat::default()
    }

    pub fn init(&self) -> Result<()> {
        self.manager.connect()?;
        Ok(())
    }

    pub fn shutdown(&self) -> Result<()> {
        let result = self.manager.disconnect();
        self.manager.wait_restart();
        result?;
        Ok(())
    }

    /// 开始播放，未连接时先连接
    ///
    /// 连接失败时状态不变
    pub fn play(&self) -> Result<()> {
        if !self.manager.is_connected() {
            self.manager.connect()?;
        }
        self.client().set_playback_state(PlaybackState::Playing);
        debug!("play");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.manager.stop_playback();
        debug!("stop");
        Ok(())
    }

    /// 暂停；已停止时保持停止
    pub fn pause(&self) -> Result<()> {
        if self.state() == PlaybackState::Stopped {
            return Ok(());
        }
        self.client().set_playback_state(PlaybackState::Paused);
        debug!("pause");
        Ok(())
    }

    pub fn unpause(&self) -> Result<()> {
        self.play()
    }

    pub fn state(&self) -> PlaybackState {
        self.client().playback_state()
    }

    pub fn set_format(&self, requested: &WaveFormat) -> Result<()> {
        self.negotiator.request_format(requested)
    }

    pub fn format(&self) -> WaveFormat {
        self.negotiator.current()
    }

    pub fn client(&self) -> &Arc<ClientState> {
        self.manager.client()
    }

    pub fn stats(&self) -> &Arc<TransferStats> {
        self.manager.stats()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }
}
