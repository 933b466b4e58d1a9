//! 音频基础模块
//!
//! 包含：
//! - Format: 波形格式与样本解码
//! - Ring Buffer: Lock-free 数据传递
//! - Memory: mlock 辅助
//! - Stats: 传输统计

pub mod format;
pub mod memory;
pub mod ring_buffer;
pub mod stats;

pub use format::WaveFormat;
pub use ring_buffer::RingBuffer;
pub use stats::{StatsReport, TransferStats};
