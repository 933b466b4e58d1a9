//! 错误类型
//!
//! - `ConnectionError`: 与音频服务器建立/拆除连接时的失败，返回前已回滚到干净的断开状态
//! - `BridgeError`: 控制线程操作（play/set_format/...）的统一错误
//!
//! 实时回调从不返回错误，最多把自身状态降级为 Stopped

use thiserror::Error;

/// 服务器连接错误
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// 服务器不可达（或拒绝创建 client）
    #[error("could not connect to audio server: {0}")]
    Open(String),

    /// 回调安装失败
    #[error("could not set {0} callback")]
    Callback(&'static str),

    /// 端口注册失败（1-based 端口号）
    #[error("could not register port number {index}: {reason}")]
    PortRegistration { index: usize, reason: String },

    /// client 激活失败
    #[error("could not activate client: {0}")]
    Activation(String),

    /// 服务器上没有物理播放端口
    #[error("could not find any playback ports to connect to")]
    NoPhysicalPorts,

    /// 端口连线失败
    #[error("could not create connection from {from} to {to}: {reason}")]
    PortConnection {
        from: String,
        to: String,
        reason: String,
    },

    /// 传输引擎无法处理的格式（非 32-bit float 或 0 声道）
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// 关闭连接失败
    #[error("could not disconnect from audio server: {0}")]
    Close(String),
}

/// 控制线程错误
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// 重配置失败或请求非法
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 控制线程操作的 Result
pub type Result<T> = std::result::Result<T, BridgeError>;
