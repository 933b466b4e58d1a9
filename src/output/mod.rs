//! 输出桥
//!
//! 包含：
//! - Client: 插件实例的共享状态（连接标志、格式、播放状态、端口）
//! - Transfer: 实时 process 回调，解交织 + 增益
//! - Connection: 连接的建立、拆除与自动重连
//! - Negotiator: 声道数变化时重建连接
//! - Plugin: 宿主看到的生命周期与 transport 接口

pub mod client;
pub mod config;
pub mod connection;
pub mod negotiator;
pub mod plugin;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientFlags, ClientState, PlaybackState};
pub use config::BridgeConfig;
pub use connection::ConnectionManager;
pub use negotiator::FormatNegotiator;
pub use plugin::OutputPlugin;
pub use transfer::TransferEngine;
