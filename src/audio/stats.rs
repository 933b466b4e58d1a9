//! 传输统计
//!
//! 在 process 回调中更新，全部为 Relaxed 原子操作，适合实时线程

use std::sync::atomic::{AtomicU64, Ordering};

/// 传输统计收集器
///
/// 所有操作都是 lock-free 的
#[derive(Default)]
pub struct TransferStats {
    periods: AtomicU64,
    silent_periods: AtomicU64,
    stalls: AtomicU64,
    short_reads: AtomicU64,
    frames_delivered: AtomicU64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个 period 开始时调用
    #[inline]
    pub fn on_period(&self) {
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    /// 输出了整段静音（未播放或 stall）
    #[inline]
    pub fn record_silence(&self) {
        self.silent_periods.fetch_add(1, Ordering::Relaxed);
    }

    /// streamer 返回 "无数据"
    #[inline]
    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    /// streamer 返回的帧数少于请求
    #[inline]
    pub fn record_short_read(&self) {
        self.short_reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_frames_delivered(&self, frames: u64) {
        self.frames_delivered.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    pub fn silent_periods(&self) -> u64 {
        self.silent_periods.load(Ordering::Relaxed)
    }

    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    pub fn short_reads(&self) -> u64 {
        self.short_reads.load(Ordering::Relaxed)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    /// 生成报告
    pub fn report(&self, sample_rate: u32) -> StatsReport {
        StatsReport {
            periods: self.periods(),
            silent_periods: self.silent_periods(),
            stalls: self.stalls(),
            short_reads: self.short_reads(),
            frames_delivered: self.frames_delivered(),
            sample_rate,
        }
    }

    /// 重置统计
    pub fn reset(&self) {
        self.periods.store(0, Ordering::Relaxed);
        self.silent_periods.store(0, Ordering::Relaxed);
        self.stalls.store(0, Ordering::Relaxed);
        self.short_reads.store(0, Ordering::Relaxed);
        self.frames_delivered.store(0, Ordering::Relaxed);
    }
}

/// 统计报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub periods: u64,
    pub silent_periods: u64,
    pub stalls: u64,
    pub short_reads: u64,
    pub frames_delivered: u64,
    pub sample_rate: u32,
}

impl StatsReport {
    /// 已输出的音频时长（秒）
    pub fn delivered_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames_delivered as f64 / self.sample_rate as f64
        }
    }
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transfer Statistics")?;
        writeln!(f, "===================")?;
        writeln!(f, "Periods: {}", self.periods)?;
        writeln!(f, "  Silent: {}", self.silent_periods)?;
        writeln!(f, "  Short reads: {}", self.short_reads)?;
        writeln!(f, "Stream stalls: {}", self.stalls)?;
        writeln!(
            f,
            "Frames delivered: {} ({:.1}s @ {}Hz)",
            self.frames_delivered,
            self.delivered_secs(),
            self.sample_rate
        )?;
        Ok(())
    }
}
