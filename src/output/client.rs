//! Client 共享状态
//!
//! 每个插件实例一个，通过 `Arc` 传给连接管理、格式协商和 process 回调。
//!
//! 实时回调只读取 `connected` 和 `playback_state` 两个原子量。
//! 格式与端口列表只在断开期间修改，由控制线程持有的锁保护。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::audio::WaveFormat;
use crate::host::{self, Host};

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlaybackState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// 从宿主配置读取的开关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientFlags {
    pub autostart: bool,
    pub autoconnect: bool,
    pub autorestart: bool,
}

impl Default for ClientFlags {
    fn default() -> Self {
        Self {
            autostart: host::setting_default(host::CONF_AUTOSTART).unwrap_or(true),
            autoconnect: host::setting_default(host::CONF_AUTOCONNECT).unwrap_or(true),
            autorestart: host::setting_default(host::CONF_AUTORESTART).unwrap_or(false),
        }
    }
}

impl ClientFlags {
    /// 从宿主的持久化配置读取
    pub fn load(host: &dyn Host) -> Self {
        let defaults = Self::default();
        Self {
            autostart: host.config_bool(host::CONF_AUTOSTART, defaults.autostart),
            autoconnect: host.config_bool(host::CONF_AUTOCONNECT, defaults.autoconnect),
            autorestart: host.config_bool(host::CONF_AUTORESTART, defaults.autorestart),
        }
    }
}

/// Client 共享状态
pub struct ClientState {
    name: String,

    /// 实时线程每个 period 读取，独占 cache line
    connected: CachePadded<AtomicBool>,
    playback_state: CachePadded<AtomicU8>,

    /// 已在服务器上激活
    active: AtomicBool,
    autostart: AtomicBool,
    autoconnect: AtomicBool,
    autorestart: AtomicBool,
    /// 最近一次连接是否由本实例启动了服务器
    server_started: AtomicBool,

    format: Mutex<WaveFormat>,
    /// 服务器采样率，采样率回调随时更新
    sample_rate: AtomicU32,

    ports: Mutex<Vec<String>>,
}

impl ClientState {
    pub fn new(name: impl Into<String>, format: WaveFormat) -> Self {
        let flags = ClientFlags::default();
        Self {
            name: name.into(),
            connected: CachePadded::new(AtomicBool::new(false)),
            playback_state: CachePadded::new(AtomicU8::new(PlaybackState::Stopped as u8)),
            active: AtomicBool::new(false),
            autostart: AtomicBool::new(flags.autostart),
            autoconnect: AtomicBool::new(flags.autoconnect),
            autorestart: AtomicBool::new(flags.autorestart),
            server_started: AtomicBool::new(false),
            sample_rate: AtomicU32::new(format.sample_rate),
            format: Mutex::new(format),
            ports: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- 实时线程可见 ----

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// 原子地把 connected 从 true 改为 false
    ///
    /// 返回是否由本次调用完成了切换（并发的关闭路径中只有一个会成功）
    pub(crate) fn take_connected(&self) -> bool {
        self.connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn playback_state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.playback_state.load(Ordering::Acquire))
    }

    pub fn set_playback_state(&self, state: PlaybackState) {
        self.playback_state.store(state as u8, Ordering::Release);
    }

    /// 实时线程在 stream 无数据时调用：Playing → Stopped
    ///
    /// 用 CAS 避免覆盖控制线程同时写入的新状态
    #[inline]
    pub(crate) fn stall(&self) -> bool {
        self.playback_state
            .compare_exchange(
                PlaybackState::Playing as u8,
                PlaybackState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    // ---- 控制线程 ----

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn flags(&self) -> ClientFlags {
        ClientFlags {
            autostart: self.autostart.load(Ordering::Acquire),
            autoconnect: self.autoconnect.load(Ordering::Acquire),
            autorestart: self.autorestart.load(Ordering::Acquire),
        }
    }

    pub(crate) fn set_flags(&self, flags: ClientFlags) {
        self.autostart.store(flags.autostart, Ordering::Release);
        self.autoconnect.store(flags.autoconnect, Ordering::Release);
        self.autorestart.store(flags.autorestart, Ordering::Release);
    }

    pub fn server_started(&self) -> bool {
        self.server_started.load(Ordering::Acquire)
    }

    pub(crate) fn set_server_started(&self, started: bool) {
        self.server_started.store(started, Ordering::Release);
    }

    /// 当前格式（采样率取服务器最新值）
    pub fn format(&self) -> WaveFormat {
        WaveFormat {
            sample_rate: self.sample_rate(),
            ..*self.format.lock()
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub(crate) fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Release);
        self.format.lock().sample_rate = rate;
    }

    /// 修改声道数，只能在断开期间调用
    pub(crate) fn set_channels(&self, channels: u16) {
        debug_assert!(!self.is_connected(), "channel count changed while connected");
        let mut format = self.format.lock();
        *format = format.with_channels(channels);
    }

    /// 已注册的输出端口（完整名称，按声道顺序）
    pub fn ports(&self) -> Vec<String> {
        self.ports.lock().clone()
    }

    pub(crate) fn set_ports(&self, ports: Vec<String>) {
        *self.ports.lock() = ports;
    }

    pub(crate) fn clear_ports(&self) {
        self.ports.lock().clear();
    }
}
