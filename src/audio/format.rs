//! 音频格式
//!
//! 上游 streamer 输出交织的 32-bit float 样本，字节序由 `is_big_endian` 决定。
//! 服务器端口使用本机 f32，每声道一个独立 buffer。

/// 扬声器位（与 WAVEFORMATEXTENSIBLE 的 channel mask 顺序一致）
pub const SPEAKER_FRONT_LEFT: u32 = 0x1;
pub const SPEAKER_FRONT_RIGHT: u32 = 0x2;
pub const SPEAKER_FRONT_CENTER: u32 = 0x4;
pub const SPEAKER_LOW_FREQUENCY: u32 = 0x8;
pub const SPEAKER_BACK_LEFT: u32 = 0x10;
pub const SPEAKER_BACK_RIGHT: u32 = 0x20;

/// 按声道数生成默认 channel mask（依次占用低位）
pub fn default_channel_mask(channels: u16) -> u32 {
    if channels >= 32 {
        u32::MAX
    } else {
        (1u32 << channels) - 1
    }
}

/// 波形格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub is_float: bool,
    pub channel_mask: u32,
    pub is_big_endian: bool,
}

impl Default for WaveFormat {
    /// 默认输出格式：立体声，32-bit float，little-endian
    ///
    /// 采样率在连接时由服务器覆盖
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 32,
            is_float: true,
            channel_mask: SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT,
            is_big_endian: false,
        }
    }
}

impl WaveFormat {
    /// 替换声道数，同时重置 channel mask
    pub fn with_channels(self, channels: u16) -> Self {
        Self {
            channels,
            channel_mask: default_channel_mask(channels),
            ..self
        }
    }

    /// 传输引擎能处理的格式：至少一个声道的 32-bit float
    pub fn is_supported(&self) -> bool {
        self.channels > 0 && self.bits_per_sample == 32 && self.is_float
    }

    /// 每样本的字节数
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// 每帧的字节数
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// `frames` 帧所需的字节数
    #[inline]
    pub fn period_bytes(&self, frames: usize) -> usize {
        frames * self.bytes_per_frame()
    }

    /// `bytes` 字节中包含的完整帧数（不足一帧的尾部被丢弃）
    #[inline]
    pub fn frames_in(&self, bytes: usize) -> usize {
        match self.bytes_per_frame() {
            0 => 0,
            n => bytes / n,
        }
    }

    /// 从交织字节缓冲区中解出第 `index` 个 f32 样本
    ///
    /// 调用方保证 `index` 在已读取的范围内
    #[inline(always)]
    pub fn sample_at(&self, bytes: &[u8], index: usize) -> f32 {
        let offset = index * 4;
        let raw = [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ];
        if self.is_big_endian {
            f32::from_be_bytes(raw)
        } else {
            f32::from_le_bytes(raw)
        }
    }
}
