//! 实时传输引擎
//!
//! 服务器每个 period 调用一次 `process_period`：
//! 1. 从 streamer 拉取一个 period 的交织字节
//! 2. 解交织到各声道 buffer，同时乘以增益
//! 3. 不足的部分填静音
//!
//! **绝对禁止：**
//! - 锁
//! - 分配（scratch buffer 在连接时预分配）
//! - I/O 与日志

use std::sync::Arc;

use crate::audio::{memory, TransferStats, WaveFormat};
use crate::host::{Host, StreamRead};
use crate::server::{OutputBuffers, ProcessHandler, ProcessStatus};

use super::client::{ClientState, PlaybackState};

/// 每个连接一个，随 process 回调一起交给服务器
pub struct TransferEngine {
    client: Arc<ClientState>,
    host: Arc<dyn Host>,
    stats: Arc<TransferStats>,

    /// 连接时的格式快照（断开期间才会变化）
    format: WaveFormat,
    /// 交织字节的暂存区
    scratch: Vec<u8>,
    /// scratch 能容纳的最大帧数
    max_frames: usize,
    memory_locked: bool,
}

impl TransferEngine {
    /// 创建引擎并预分配 scratch buffer
    ///
    /// `max_frames` 为单个 period 的最大帧数，超出部分会被截断为静音
    pub fn new(
        client: Arc<ClientState>,
        host: Arc<dyn Host>,
        stats: Arc<TransferStats>,
        format: WaveFormat,
        max_frames: usize,
    ) -> Self {
        let scratch = vec![0u8; format.period_bytes(max_frames)];
        let memory_locked = memory::lock_slice(&scratch);

        Self {
            client,
            host,
            stats,
            format,
            scratch,
            max_frames,
            memory_locked,
        }
    }

    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// 处理一个 period
    #[inline]
    pub fn process_period(&mut self, frames: usize, outputs: &mut dyn OutputBuffers) -> ProcessStatus {
        if !self.client.is_connected() {
            return ProcessStatus::NotReady;
        }

        self.stats.on_period();

        if self.client.playback_state() == PlaybackState::Playing {
            self.transfer(frames, outputs);
        } else {
            write_silence(frames, outputs);
            self.stats.record_silence();
        }

        ProcessStatus::Continue
    }

    #[inline]
    fn transfer(&mut self, frames: usize, outputs: &mut dyn OutputBuffers) {
        let wanted = frames.min(self.max_frames);
        let bytes = self.format.period_bytes(wanted);

        let read = match self.host.stream_read(&mut self.scratch[..bytes]) {
            StreamRead::Bytes(n) => n.min(bytes),
            StreamRead::NoData => {
                self.client.stall();
                self.stats.record_stall();
                self.stats.record_silence();
                write_silence(frames, outputs);
                return;
            }
        };

        let frames_read = self.format.frames_in(read);
        let channels = self.format.channels as usize;
        let gain = self.host.volume_amplitude();
        let scratch = &self.scratch[..read];

        for ch in 0..outputs.channel_count().min(channels) {
            let dst = outputs.channel(ch, frames);
            let filled = frames_read.min(dst.len());

            for (i, sample) in dst[..filled].iter_mut().enumerate() {
                *sample = self.format.sample_at(scratch, i * channels + ch) * gain;
            }
            dst[filled..].fill(0.0);
        }

        // 端口多于格式声道时（不应发生）多余端口保持静音
        for ch in channels..outputs.channel_count() {
            outputs.channel(ch, frames).fill(0.0);
        }

        if frames_read < frames {
            self.stats.record_short_read();
        }
        self.stats.add_frames_delivered(frames_read as u64);
    }
}

impl ProcessHandler for TransferEngine {
    fn process(&mut self, frames: usize, outputs: &mut dyn OutputBuffers) -> ProcessStatus {
        self.process_period(frames, outputs)
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        if self.memory_locked {
            memory::unlock_slice(&self.scratch);
        }
    }
}

/// 所有声道整段填零
#[inline]
fn write_silence(frames: usize, outputs: &mut dyn OutputBuffers) {
    for ch in 0..outputs.channel_count() {
        outputs.channel(ch, frames).fill(0.0);
    }
}
