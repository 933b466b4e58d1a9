//! 格式协商
//!
//! 只支持改变声道数。其他字段（采样率、位深、字节序）由服务器与 streamer 决定，
//! 请求中的值被接受但不生效。

use std::sync::Arc;

use log::{debug, info};

use crate::audio::WaveFormat;
use crate::error::{BridgeError, Result};

use super::connection::ConnectionManager;

pub struct FormatNegotiator {
    manager: Arc<ConnectionManager>,
}

impl FormatNegotiator {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// 当前格式
    pub fn current(&self) -> WaveFormat {
        self.manager.client().format()
    }

    /// 请求新格式
    ///
    /// 声道数不变时不做任何事；否则停止播放、断开、以新声道数重新连接。
    /// 重连失败时 client 保持断开状态。
    pub fn request_format(&self, requested: &WaveFormat) -> Result<()> {
        let current = self.current();

        if requested.channels == current.channels {
            if *requested != current {
                debug!(
                    "Ignoring unsupported format fields: requested {:?}, keeping {:?}",
                    requested, current
                );
            }
            return Ok(());
        }

        if requested.channels == 0 {
            return Err(BridgeError::Config(
                "channel count must be at least 1".to_string(),
            ));
        }

        info!(
            "Channel count {} -> {}, rebuilding connection",
            current.channels, requested.channels
        );

        self.manager.stop_playback();
        self.manager
            .disconnect_stopped()
            .map_err(|e| BridgeError::Config(format!("could not tear down connection: {}", e)))?;

        self.manager.client().set_channels(requested.channels);

        self.manager.connect().map_err(|e| {
            BridgeError::Config(format!(
                "could not reconnect with {} channels: {}",
                requested.channels, e
            ))
        })
    }
}
