//! 服务器连接管理
//!
//! 连接建立顺序：
//! 1. 读取宿主配置（autostart / autoconnect / autorestart）
//! 2. 打开 client，采用服务器采样率
//! 3. 安装 process / 采样率 / shutdown 回调
//! 4. 每声道注册一个输出端口 `playback_<N>`
//! 5. 激活
//! 6. 可选：连线到物理播放端口
//!
//! 任一步失败都会关闭连接，回到干净的断开状态后再返回错误。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::audio::TransferStats;
use crate::error::ConnectionError;
use crate::host::Host;
use crate::server::{AudioServer, PortConnectError, ServerClient};

use super::client::{ClientFlags, ClientState, PlaybackState};
use super::config::BridgeConfig;
use super::transfer::TransferEngine;

/// 服务器连接管理器
pub struct ConnectionManager {
    this: Weak<ConnectionManager>,

    client: Arc<ClientState>,
    server: Arc<dyn AudioServer>,
    host: Arc<dyn Host>,
    stats: Arc<TransferStats>,
    config: BridgeConfig,

    /// 当前连接，只在控制线程访问
    connection: Mutex<Option<Box<dyn ServerClient>>>,
    /// 自动重连线程
    restart: Mutex<Option<JoinHandle<()>>>,
    /// 每次 disconnect 递增，使之前排队的重连失效
    restart_epoch: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        client: Arc<ClientState>,
        server: Arc<dyn AudioServer>,
        host: Arc<dyn Host>,
        stats: Arc<TransferStats>,
        config: BridgeConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            client,
            server,
            host,
            stats,
            config,
            connection: Mutex::new(None),
            restart: Mutex::new(None),
            restart_epoch: AtomicU64::new(0),
        })
    }

    pub fn client(&self) -> &Arc<ClientState> {
        &self.client
    }

    pub fn stats(&self) -> &Arc<TransferStats> {
        &self.stats
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// 建立连接
    ///
    /// 已连接时直接返回 Ok
    pub fn connect(&self) -> Result<(), ConnectionError> {
        let mut slot = self.connection.lock();
        self.connect_locked(&mut slot)
    }

    fn connect_locked(&self, slot: &mut Option<Box<dyn ServerClient>>) -> Result<(), ConnectionError> {
        if slot.is_some() && self.client.is_connected() {
            return Ok(());
        }

        // 服务器关闭后遗留的连接
        if let Some(stale) = slot.take() {
            self.release(stale);
        }

        let format = self.client.format();
        if !format.is_supported() {
            return Err(ConnectionError::UnsupportedFormat(format!(
                "{} ch, {} bit, float: {}",
                format.channels, format.bits_per_sample, format.is_float
            )));
        }

        let flags = ClientFlags::load(self.host.as_ref());
        self.client.set_flags(flags);

        let mut conn = self
            .server
            .open(self.client.name(), flags.autostart)
            .map_err(|e| {
                error!("Could not connect to audio server: {}", e);
                ConnectionError::Open(e.to_string())
            })?;

        match self.setup(conn.as_mut(), flags) {
            Ok(()) => {
                *slot = Some(conn);
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.release(conn);
                Err(e)
            }
        }
    }

    fn setup(&self, conn: &mut dyn ServerClient, flags: ClientFlags) -> Result<(), ConnectionError> {
        self.client.set_sample_rate(conn.sample_rate());

        let started = conn.server_started();
        self.client.set_server_started(started);
        if started {
            info!("Started audio server");
        }

        let format = self.client.format();
        let max_frames = conn.buffer_size().max(self.config.min_scratch_frames);
        let engine = TransferEngine::new(
            Arc::clone(&self.client),
            Arc::clone(&self.host),
            Arc::clone(&self.stats),
            format,
            max_frames,
        );

        conn.set_process_handler(Box::new(engine)).map_err(|e| {
            debug!("process callback: {}", e);
            ConnectionError::Callback("process")
        })?;

        let client = Arc::clone(&self.client);
        conn.set_sample_rate_callback(Box::new(move |rate| {
            if client.is_connected() {
                client.set_sample_rate(rate);
            }
        }))
        .map_err(|e| {
            debug!("sample rate callback: {}", e);
            ConnectionError::Callback("sample rate")
        })?;

        let this = self.this.clone();
        conn.set_shutdown_callback(Box::new(move |reason| {
            if let Some(manager) = this.upgrade() {
                manager.on_server_shutdown(reason);
            }
        }))
        .map_err(|e| {
            debug!("shutdown callback: {}", e);
            ConnectionError::Callback("shutdown")
        })?;

        let channels = format.channels as usize;
        let mut ports = Vec::with_capacity(channels);
        for i in 0..channels {
            let port = conn
                .register_output_port(&self.config.port_name(i))
                .map_err(|e| ConnectionError::PortRegistration {
                    index: i + 1,
                    reason: e.to_string(),
                })?;
            ports.push(port);
        }
        self.client.set_ports(ports.clone());

        // process 回调从激活起就可能运行
        self.client.set_connected(true);
        conn.activate()
            .map_err(|e| ConnectionError::Activation(e.to_string()))?;
        self.client.set_active(true);

        if flags.autoconnect {
            self.autoconnect(conn, &ports)?;
        }

        info!(
            "Connected as '{}': {} ch @ {} Hz, period {} frames",
            self.client.name(),
            channels,
            self.client.sample_rate(),
            conn.buffer_size()
        );
        Ok(())
    }

    /// 输出端口 i → 物理播放端口 i
    fn autoconnect(&self, conn: &dyn ServerClient, ports: &[String]) -> Result<(), ConnectionError> {
        let physical = conn.physical_playback_ports();
        if physical.is_empty() {
            return Err(ConnectionError::NoPhysicalPorts);
        }
        if physical.len() < ports.len() {
            warn!(
                "Only {} playback ports for {} channels, leaving the rest unconnected",
                physical.len(),
                ports.len()
            );
        }

        for (from, to) in ports.iter().zip(physical.iter()) {
            match conn.connect_ports(from, to) {
                Ok(()) => debug!("{} -> {}", from, to),
                Err(PortConnectError::AlreadyConnected) => debug!("{} -> {} (existing)", from, to),
                Err(PortConnectError::Failed(reason)) => {
                    return Err(ConnectionError::PortConnection {
                        from: from.clone(),
                        to: to.clone(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// 关闭连接并清理状态（失败只记录日志）
    fn release(&self, conn: Box<dyn ServerClient>) {
        self.client.set_connected(false);
        self.client.set_active(false);
        self.client.clear_ports();
        if let Err(e) = conn.close() {
            warn!("Could not close audio server connection: {}", e);
        }
    }

    /// 断开连接
    ///
    /// 没有连接时直接返回 Ok
    pub fn disconnect(&self) -> Result<(), ConnectionError> {
        self.teardown(true)
    }

    /// 断开连接，调用方已经停止了播放
    pub(crate) fn disconnect_stopped(&self) -> Result<(), ConnectionError> {
        self.teardown(false)
    }

    fn teardown(&self, stop: bool) -> Result<(), ConnectionError> {
        self.client.set_connected(false);
        self.restart_epoch.fetch_add(1, Ordering::AcqRel);

        let conn = self.connection.lock().take();
        let Some(conn) = conn else {
            self.client.set_active(false);
            self.client.clear_ports();
            return Ok(());
        };

        let started = self.client.server_started();

        // 服务器不是我们启动的：先停播放，给服务器时间处理
        if !started {
            if stop {
                self.stop_playback();
            }
            thread::sleep(self.config.disconnect_grace);
        }

        self.client.clear_ports();
        self.client.set_active(false);
        let result = conn.close().map_err(|e| {
            error!("Could not disconnect from audio server: {}", e);
            ConnectionError::Close(e.to_string())
        });

        // 给服务器时间从后端断开
        if started {
            thread::sleep(self.config.disconnect_grace);
        }

        info!("Disconnected from audio server");
        result
    }

    /// 停止播放并让 streamer 丢弃缓冲
    pub fn stop_playback(&self) {
        self.client.set_playback_state(PlaybackState::Stopped);
        self.host.stream_reset(true);
    }

    /// 服务器关闭通知（服务器线程调用）
    ///
    /// 不触碰连接槽；重连在独立线程进行
    pub fn on_server_shutdown(&self, reason: &str) {
        let epoch = self.restart_epoch.load(Ordering::Acquire);
        if !self.client.take_connected() {
            return;
        }
        self.client.set_active(false);

        if !self.client.flags().autorestart {
            warn!("Audio server shut down unexpectedly ({}), stopping playback", reason);
            self.host.stream_reset(true);
            return;
        }

        warn!("Audio server shut down unexpectedly ({}), restarting...", reason);
        let this = self.this.clone();
        let spawned = thread::Builder::new()
            .name("jack-restart".into())
            .spawn(move || {
                if let Some(manager) = this.upgrade() {
                    manager.restart(epoch);
                }
            });

        match spawned {
            Ok(handle) => *self.restart.lock() = Some(handle),
            Err(e) => {
                error!("Could not spawn restart thread: {}", e);
                self.host.stream_reset(true);
            }
        }
    }

    /// 单次重连
    ///
    /// 先等待：旧连接要在服务器的 shutdown 回调返回之后才能关闭
    fn restart(&self, epoch: u64) {
        thread::sleep(self.config.restart_delay);

        // 在连接锁内检查，disconnect 递增 epoch 后不会再连上
        let mut slot = self.connection.lock();
        if self.restart_epoch.load(Ordering::Acquire) != epoch {
            info!("Restart cancelled");
            return;
        }

        if let Some(dead) = slot.take() {
            self.release(dead);
        }

        match self.connect_locked(&mut slot) {
            Ok(()) => info!("Reconnected to audio server"),
            Err(e) => {
                error!("Restart failed: {}", e);
                self.host.stream_reset(true);
            }
        }
    }

    /// 等待进行中的重连结束
    pub fn wait_restart(&self) {
        let handle = self.restart.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Restart thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CONF_AUTOCONNECT, CONF_AUTORESTART, CONF_AUTOSTART};
    use crate::output::testing::{test_config, Fixture};
    use crate::server::ProcessStatus;
    use std::time::{Duration, Instant};

    #[test]
    fn test_connect_registers_ports_and_autoconnects() {
        let fx = Fixture::new(2);
        fx.manager.connect().unwrap();

        let client = fx.client();
        assert!(client.is_connected());
        assert!(client.is_active());
        assert_eq!(client.ports(), vec!["test:playback_1", "test:playback_2"]);
        assert_eq!(client.sample_rate(), 48000);
        assert!(!client.server_started());

        let state = fx.server.state();
        assert_eq!(state.open_requests, vec![("test".to_string(), true)]);
        assert!(state.is_active());
        assert_eq!(state.active_ports().len(), 2);
        assert_eq!(
            state.connections,
            vec![
                ("test:playback_1".to_string(), "system:playback_1".to_string()),
                ("test:playback_2".to_string(), "system:playback_2".to_string()),
            ]
        );
    }

    #[test]
    fn test_connect_when_connected_is_noop() {
        let fx = Fixture::new(2);
        fx.manager.connect().unwrap();
        fx.manager.connect().unwrap();

        let state = fx.server.state();
        assert_eq!(state.opens, 1);
        assert_eq!(state.registered.len(), 2);
    }

    #[test]
    fn test_open_without_autostart_fails_when_server_down() {
        let fx = Fixture::new(2);
        fx.host.set_config(CONF_AUTOSTART, 0);
        fx.server.state().server_running = false;

        let err = fx.manager.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::Open(_)));
        assert!(!fx.client().is_connected());
        assert_eq!(fx.server.state().open_requests, vec![("test".to_string(), false)]);
    }

    #[test]
    fn test_autostart_records_server_started() {
        let fx = Fixture::new(2);
        fx.server.state().server_running = false;

        fx.manager.connect().unwrap();
        assert!(fx.client().server_started());
        // autostart 配置本身不被覆盖
        assert!(fx.client().flags().autostart);
    }

    #[test]
    fn test_unsupported_format_is_refused_before_open() {
        let mut config = test_config(2);
        config.format.bits_per_sample = 16;
        config.format.is_float = false;
        let fx = Fixture::with_config(config);

        let err = fx.manager.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::UnsupportedFormat(_)));
        assert!(!fx.client().is_connected());

        let state = fx.server.state();
        assert_eq!(state.opens, 0);
        assert!(state.registered.is_empty());
    }

    #[test]
    fn test_port_registration_failure_rolls_back() {
        let fx = Fixture::new(2);
        fx.server.state().fail_port = Some(1);

        let err = fx.manager.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::PortRegistration { index: 2, .. }));

        let client = fx.client();
        assert!(!client.is_connected());
        assert!(!client.is_active());
        assert!(client.ports().is_empty());

        let state = fx.server.state();
        assert_eq!(state.closes, 1);
        assert!(!state.is_active());
    }

    #[test]
    fn test_callback_failure_rolls_back() {
        for kind in ["process", "sample rate", "shutdown"] {
            let fx = Fixture::new(2);
            fx.server.state().fail_callback = Some(kind);

            match fx.manager.connect() {
                Err(ConnectionError::Callback(failed)) => assert_eq!(failed, kind),
                other => panic!("unexpected result: {:?}", other),
            }
            assert_eq!(fx.server.state().closes, 1);
            assert!(fx.server.state().registered.is_empty());
        }
    }

    #[test]
    fn test_activation_failure_rolls_back() {
        let fx = Fixture::new(2);
        fx.server.state().fail_activate = true;

        let err = fx.manager.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::Activation(_)));
        assert!(!fx.client().is_connected());
        assert_eq!(fx.server.state().closes, 1);
    }

    #[test]
    fn test_autoconnect_tolerates_existing_connection() {
        let fx = Fixture::new(2);
        fx.server.state().already_connected.push((
            "test:playback_1".to_string(),
            "system:playback_1".to_string(),
        ));

        fx.manager.connect().unwrap();
        assert_eq!(fx.server.state().connections.len(), 1);
    }

    #[test]
    fn test_autoconnect_failure_rolls_back() {
        let fx = Fixture::new(2);
        fx.server.state().fail_connect = true;

        let err = fx.manager.connect().unwrap_err();
        match err {
            ConnectionError::PortConnection { from, to, .. } => {
                assert_eq!(from, "test:playback_1");
                assert_eq!(to, "system:playback_1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!fx.client().is_connected());
        assert!(!fx.server.state().is_active());
    }

    #[test]
    fn test_no_physical_ports_is_an_error() {
        let fx = Fixture::new(2);
        fx.server.state().physical_ports.clear();

        let err = fx.manager.connect().unwrap_err();
        assert!(matches!(err, ConnectionError::NoPhysicalPorts));
        assert_eq!(fx.server.state().closes, 1);
    }

    #[test]
    fn test_fewer_physical_ports_than_channels() {
        let fx = Fixture::new(4);
        fx.manager.connect().unwrap();

        assert_eq!(fx.client().ports().len(), 4);
        assert_eq!(fx.server.state().connections.len(), 2);
    }

    #[test]
    fn test_autoconnect_disabled() {
        let fx = Fixture::new(2);
        fx.host.set_config(CONF_AUTOCONNECT, 0);
        fx.server.state().physical_ports.clear();

        fx.manager.connect().unwrap();
        assert!(fx.server.state().connections.is_empty());
    }

    #[test]
    fn test_every_port_written_every_period() {
        let fx = Fixture::new(3);
        fx.manager.connect().unwrap();

        let out = fx.server.run_period(64).unwrap();
        assert_eq!(out.status, ProcessStatus::Continue);
        assert_eq!(out.channels.len(), 3);
        assert!(out.channels.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sample_rate_callback_updates_format() {
        let fx = Fixture::new(2);
        fx.manager.connect().unwrap();

        fx.server.change_sample_rate(96000);
        assert_eq!(fx.client().sample_rate(), 96000);
        assert_eq!(fx.client().format().sample_rate, 96000);
    }

    #[test]
    fn test_shutdown_without_autorestart_resets_stream() {
        let fx = Fixture::new(2);
        fx.manager.connect().unwrap();

        fx.server.trigger_shutdown("killed");
        fx.manager.wait_restart();

        assert!(!fx.client().is_connected());
        assert_eq!(fx.host.resets(), 1);
        assert_eq!(fx.server.state().opens, 1);
    }

    #[test]
    fn test_shutdown_with_autorestart_reconnects_once() {
        let mut config = test_config(2);
        config.restart_delay = Duration::from_millis(100);
        let fx = Fixture::with_config(config);
        fx.host.set_config(CONF_AUTORESTART, 1);
        fx.manager.connect().unwrap();

        let shutdown_at = Instant::now();
        fx.server.trigger_shutdown("killed");

        // 回调返回时旧连接还没被关闭
        assert_eq!(fx.server.state().closes, 0);
        assert!(!fx.client().is_connected());

        fx.manager.wait_restart();
        assert!(shutdown_at.elapsed() >= fx.manager.config().restart_delay);

        assert!(fx.client().is_connected());
        assert_eq!(fx.host.resets(), 0);

        let state = fx.server.state();
        assert_eq!(state.opens, 2);
        assert_eq!(state.closes, 1);
        assert!(state.is_active());
    }

    #[test]
    fn test_repeated_shutdown_notification_is_ignored() {
        let fx = Fixture::new(2);
        fx.manager.connect().unwrap();

        fx.manager.on_server_shutdown("first");
        fx.manager.on_server_shutdown("second");
        assert_eq!(fx.host.resets(), 1);
    }

    #[test]
    fn test_disconnect_cancels_pending_restart() {
        let mut config = test_config(2);
        config.restart_delay = Duration::from_millis(50);
        let fx = Fixture::with_config(config);
        fx.host.set_config(CONF_AUTORESTART, 1);
        fx.manager.connect().unwrap();

        fx.server.trigger_shutdown("killed");
        fx.manager.disconnect().unwrap();
        fx.manager.wait_restart();

        assert!(!fx.client().is_connected());
        assert_eq!(fx.server.state().opens, 1);
    }

    #[test]
    fn test_disconnect_stops_playback_when_server_not_ours() {
        let fx = Fixture::new(2);
        fx.manager.connect().unwrap();
        fx.client().set_playback_state(PlaybackState::Playing);

        fx.manager.disconnect().unwrap();

        let client = fx.client();
        assert!(!client.is_connected());
        assert!(!client.is_active());
        assert!(client.ports().is_empty());
        assert_eq!(client.playback_state(), PlaybackState::Stopped);
        assert_eq!(fx.host.resets(), 1);
        assert!(!fx.server.state().is_active());
    }

    #[test]
    fn test_disconnect_keeps_playback_state_when_server_ours() {
        let fx = Fixture::new(2);
        fx.server.state().server_running = false;
        fx.manager.connect().unwrap();
        fx.client().set_playback_state(PlaybackState::Playing);

        fx.manager.disconnect().unwrap();
        assert_eq!(fx.host.resets(), 0);
        assert_eq!(fx.server.state().closes, 1);
    }

    #[test]
    fn test_disconnect_without_connection_is_ok() {
        let fx = Fixture::new(2);
        fx.manager.disconnect().unwrap();
        fx.manager.disconnect().unwrap();
        assert_eq!(fx.server.state().closes, 0);
        assert_eq!(fx.host.resets(), 0);
    }
}
