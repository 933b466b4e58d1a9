//! Streamer：解码线程 → ring buffer → process 回调
//!
//! 解码线程把交织 f32（little-endian 字节）写入 lock-free ring buffer，
//! 输出桥在实时线程通过 `Host::stream_read` 按整帧读取。
//!
//! 消费者侧只有原子操作，可以在实时线程调用。

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::audio::RingBuffer;
use crate::decode::{AudioDecoder, AudioInfo, DecodeError};
use crate::host::{Host, StreamRead};

use super::config::HostConfig;

/// Ring buffer 大小（字节）：48kHz 立体声 f32 约 2.7 秒
const RING_BYTES: usize = 1 << 20;

/// ring buffer 满时解码线程的等待
const FULL_WAIT: Duration = Duration::from_millis(5);

/// 解码线程共享状态
struct DecoderState {
    running: AtomicBool,
    eof_reached: AtomicBool,
    bytes_decoded: AtomicU64,
}

impl DecoderState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            eof_reached: AtomicBool::new(false),
            bytes_decoded: AtomicU64::new(0),
        }
    }

    /// 不会再有新数据
    #[inline]
    fn finished(&self) -> bool {
        !self.running.load(Ordering::Acquire) || self.eof_reached.load(Ordering::Acquire)
    }
}

/// 演示宿主
pub struct Streamer {
    ring: Arc<RingBuffer<u8>>,
    state: Arc<DecoderState>,
    /// 每帧字节数（输出声道数 × 4）
    frame_bytes: AtomicUsize,
    /// stream_reset 请求，由消费者执行丢弃
    flush_requested: AtomicBool,
    /// 线性增益（f32 bits）
    volume: AtomicU32,

    config: Mutex<HostConfig>,
    decoder_thread: Mutex<Option<JoinHandle<()>>>,
    info: Mutex<Option<AudioInfo>>,
}

impl Streamer {
    pub fn new(config: HostConfig) -> Arc<Self> {
        let ring = Arc::new(RingBuffer::new(RING_BYTES));
        if !ring.lock_memory() {
            debug!("Ring buffer memory not locked");
        }

        Arc::new(Self {
            ring,
            state: Arc::new(DecoderState::new()),
            frame_bytes: AtomicUsize::new(8),
            flush_requested: AtomicBool::new(false),
            volume: AtomicU32::new(1.0f32.to_bits()),
            config: Mutex::new(config),
            decoder_thread: Mutex::new(None),
            info: Mutex::new(None),
        })
    }

    /// 打开文件并启动解码线程
    ///
    /// 源声道被映射到 `out_channels` 个输出声道：多余的源声道丢弃，缺少的输出静音。
    /// 只能在输出未处于 Playing 状态时调用（会清空 ring buffer）。
    pub fn load<P: AsRef<Path>>(&self, path: P, out_channels: u16) -> Result<AudioInfo, DecodeError> {
        self.stop();

        let path = path.as_ref();
        info!("Loading: {}", path.display());

        let decoder = AudioDecoder::open(path)?;
        let info = decoder.info().clone();
        info!(
            "Format: {} | Codec: {} | {}Hz {}ch {}bit | Duration: {:.1}s",
            info.format,
            info.codec,
            info.sample_rate,
            info.channels,
            info.bit_depth.unwrap_or(0),
            info.duration_secs.unwrap_or(0.0)
        );
        if info.channels != out_channels {
            warn!(
                "Mapping {} source channels onto {} outputs",
                info.channels, out_channels
            );
        }

        self.ring.clear();
        self.flush_requested.store(false, Ordering::Release);
        self.frame_bytes
            .store(out_channels.max(1) as usize * 4, Ordering::Release);
        self.state.eof_reached.store(false, Ordering::Release);
        self.state.bytes_decoded.store(0, Ordering::Release);
        self.state.running.store(true, Ordering::Release);

        let ring = Arc::clone(&self.ring);
        let state = Arc::clone(&self.state);
        let src_channels = info.channels as usize;
        let out_channels = out_channels as usize;

        let spawned = thread::Builder::new()
            .name("decoder".to_string())
            .spawn(move || decoder_thread_main(decoder, ring, state, src_channels, out_channels));

        match spawned {
            Ok(handle) => *self.decoder_thread.lock() = Some(handle),
            Err(e) => {
                self.state.running.store(false, Ordering::Release);
                return Err(DecodeError::FileOpen(e));
            }
        }

        *self.info.lock() = Some(info.clone());
        Ok(info)
    }

    /// 停止解码线程
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Release);
        let handle = self.decoder_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Decoder thread panicked");
            }
        }
    }

    pub fn info(&self) -> Option<AudioInfo> {
        self.info.lock().clone()
    }

    pub fn set_volume(&self, amplitude: f32) {
        let amplitude = amplitude.clamp(0.0, 1.0);
        self.volume.store(amplitude.to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// 解码结束且缓冲已耗尽
    pub fn is_finished(&self) -> bool {
        self.state.finished() && self.ring.available() < self.frame_bytes.load(Ordering::Acquire)
    }

    /// 缓冲区填充比例
    pub fn fill_ratio(&self) -> f64 {
        self.ring.fill_ratio()
    }

    pub fn bytes_decoded(&self) -> u64 {
        self.state.bytes_decoded.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> HostConfig {
        self.config.lock().clone()
    }

    pub fn set_config(&self, config: HostConfig) {
        *self.config.lock() = config;
    }
}

impl Host for Streamer {
    #[inline]
    fn stream_read(&self, buf: &mut [u8]) -> StreamRead {
        if self.flush_requested.swap(false, Ordering::AcqRel) {
            self.ring.discard(self.ring.available());
        }

        // 只交付整帧，保持声道对齐
        let frame = self.frame_bytes.load(Ordering::Acquire);
        let whole = self.ring.available().min(buf.len()) / frame * frame;
        if whole == 0 {
            return if self.state.finished() {
                StreamRead::NoData
            } else {
                // 解码跟不上：本 period 静音，保持播放
                StreamRead::Bytes(0)
            };
        }

        StreamRead::Bytes(self.ring.read(&mut buf[..whole]))
    }

    fn volume_amplitude(&self) -> f32 {
        self.volume()
    }

    /// 放弃当前曲目：停止解码，剩余缓冲在下一次读取时丢弃
    fn stream_reset(&self, flush: bool) {
        self.state.running.store(false, Ordering::Release);
        if flush {
            self.flush_requested.store(true, Ordering::Release);
        }
        debug!("Stream reset (flush: {})", flush);
    }

    fn config_int(&self, key: &str, default: i32) -> i32 {
        self.config.lock().get(key).unwrap_or(default)
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 解码线程主函数
fn decoder_thread_main(
    mut decoder: AudioDecoder,
    ring: Arc<RingBuffer<u8>>,
    state: Arc<DecoderState>,
    src_channels: usize,
    out_channels: usize,
) {
    // 待写入 ring buffer 的字节，写满时保留到下一轮
    let mut pending: Vec<u8> = Vec::with_capacity(8192 * out_channels * 4);
    let mut offset = 0;

    debug!("Decoder thread started");

    while state.running.load(Ordering::Acquire) {
        if offset < pending.len() {
            let written = ring.write(&pending[offset..]);
            offset += written;
            state
                .bytes_decoded
                .fetch_add(written as u64, Ordering::Relaxed);
            if written == 0 {
                thread::sleep(FULL_WAIT);
            }
            continue;
        }

        match decoder.decode_next() {
            Ok(samples) if samples.is_empty() => {
                state.eof_reached.store(true, Ordering::Release);
                info!("Decoder reached end of file");
                break;
            }
            Ok(samples) => {
                pending.clear();
                offset = 0;
                encode_frames(samples, src_channels, out_channels, &mut pending);
            }
            Err(e) => {
                error!("Decode error: {}", e);
                state.eof_reached.store(true, Ordering::Release);
                break;
            }
        }
    }

    debug!("Decoder thread finished");
}

/// 交织 f32 → little-endian 字节，同时把源声道映射到输出声道
fn encode_frames(samples: &[f32], src_channels: usize, out_channels: usize, out: &mut Vec<u8>) {
    if src_channels == 0 {
        return;
    }

    for frame in samples.chunks_exact(src_channels) {
        for ch in 0..out_channels {
            let sample = frame.get(ch).copied().unwrap_or(0.0);
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}
