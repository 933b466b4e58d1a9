//! 音频服务器抽象
//!
//! 输出桥的核心逻辑只依赖这里的 trait：
//! - `AudioServer`: 打开一个 client 连接
//! - `ServerClient`: 单个连接的生命周期（回调、端口、激活、连线、关闭）
//! - `ProcessHandler`: 周期性 process 回调，由服务器的实时线程调用
//! - `OutputBuffers`: 一个 period 内各声道的输出 buffer
//!
//! JACK 实现位于 `jack` 模块（feature `jack`）。

#[cfg(feature = "jack")]
pub mod jack;
#[cfg(test)]
pub(crate) mod mock;

use thiserror::Error;

/// 后端报告的失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ServerError(pub String);

/// 端口连线失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortConnectError {
    /// 同样的连线已存在（不算错误）
    #[error("ports are already connected")]
    AlreadyConnected,
    #[error("{0}")]
    Failed(String),
}

/// process 回调的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// 本 period 已处理
    Continue,
    /// 未连接，本 period 未写入任何 buffer
    NotReady,
}

/// 一个 period 内各声道的输出 buffer
pub trait OutputBuffers {
    /// 声道（输出端口）数
    fn channel_count(&self) -> usize;

    /// 第 `index` 个声道的输出 buffer，长度为 `frames` 与 period 长度中较小者
    fn channel(&mut self, index: usize, frames: usize) -> &mut [f32];
}

/// 周期性 process 回调
///
/// **绝对禁止：**
/// - 锁
/// - 分配
/// - I/O
pub trait ProcessHandler: Send {
    fn process(&mut self, frames: usize, outputs: &mut dyn OutputBuffers) -> ProcessStatus;
}

/// 采样率变化回调（服务器线程调用）
pub type SampleRateCallback = Box<dyn FnMut(u32) + Send + Sync>;

/// 服务器关闭回调（服务器线程异步调用，至多一次）
pub type ShutdownCallback = Box<dyn FnOnce(&str) + Send + Sync>;

/// 音频服务器
pub trait AudioServer: Send + Sync {
    /// 以 `name` 打开一个 client
    ///
    /// `start_server` 为 false 时，服务器未运行则直接失败
    fn open(&self, name: &str, start_server: bool) -> Result<Box<dyn ServerClient>, ServerError>;
}

/// 已打开的服务器连接
///
/// 回调在 `activate` 之前安装；激活后 process 回调随时可能被调用
pub trait ServerClient: Send {
    /// 本次 open 是否启动了服务器
    fn server_started(&self) -> bool;

    /// 服务器当前采样率
    fn sample_rate(&self) -> u32;

    /// 服务器当前 period 长度（帧）
    fn buffer_size(&self) -> usize;

    fn set_process_handler(&mut self, handler: Box<dyn ProcessHandler>) -> Result<(), ServerError>;

    fn set_sample_rate_callback(&mut self, callback: SampleRateCallback) -> Result<(), ServerError>;

    fn set_shutdown_callback(&mut self, callback: ShutdownCallback) -> Result<(), ServerError>;

    /// 注册一个输出端口，返回完整端口名（`client:port`）
    fn register_output_port(&mut self, name: &str) -> Result<String, ServerError>;

    fn activate(&mut self) -> Result<(), ServerError>;

    /// 物理播放端口（硬件输出），按服务器顺序
    fn physical_playback_ports(&self) -> Vec<String>;

    fn connect_ports(&self, source: &str, destination: &str) -> Result<(), PortConnectError>;

    /// 停用并关闭连接，释放端口
    fn close(self: Box<Self>) -> Result<(), ServerError>;
}
