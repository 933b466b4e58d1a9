//! 测试用宿主与装配辅助

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::{TransferStats, WaveFormat};
use crate::host::{Host, StreamRead};
use crate::server::mock::MockServer;

use super::{BridgeConfig, ClientState, ConnectionManager};

/// 内存宿主：配置表 + 字节队列 + reset 计数
pub(crate) struct TestHost {
    config: Mutex<HashMap<String, i32>>,
    data: Mutex<VecDeque<u8>>,
    gain: Mutex<f32>,
    resets: AtomicUsize,
}

impl TestHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(HashMap::new()),
            data: Mutex::new(VecDeque::new()),
            gain: Mutex::new(1.0),
            resets: AtomicUsize::new(0),
        })
    }

    pub fn set_config(&self, key: &str, value: i32) {
        self.config.lock().insert(key.to_string(), value);
    }

    pub fn set_gain(&self, gain: f32) {
        *self.gain.lock() = gain;
    }

    /// 追加 little-endian f32 样本
    pub fn push_samples(&self, samples: &[f32]) {
        let mut data = self.data.lock();
        for sample in samples {
            data.extend(sample.to_le_bytes());
        }
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Host for TestHost {
    fn stream_read(&self, buf: &mut [u8]) -> StreamRead {
        let mut data = self.data.lock();
        if data.is_empty() {
            return StreamRead::NoData;
        }
        let n = buf.len().min(data.len());
        for (dst, src) in buf.iter_mut().zip(data.drain(..n)) {
            *dst = src;
        }
        StreamRead::Bytes(n)
    }

    fn volume_amplitude(&self) -> f32 {
        *self.gain.lock()
    }

    fn stream_reset(&self, _flush: bool) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.data.lock().clear();
    }

    fn config_int(&self, key: &str, default: i32) -> i32 {
        self.config.lock().get(key).copied().unwrap_or(default)
    }
}

/// 测试用配置：短延迟
pub(crate) fn test_config(channels: u16) -> BridgeConfig {
    BridgeConfig {
        client_name: "test".to_string(),
        format: WaveFormat::default().with_channels(channels),
        restart_delay: Duration::from_millis(10),
        disconnect_grace: Duration::ZERO,
        ..BridgeConfig::default()
    }
}

/// mock 服务器 + 宿主 + 连接管理器
pub(crate) struct Fixture {
    pub server: MockServer,
    pub host: Arc<TestHost>,
    pub manager: Arc<ConnectionManager>,
}

impl Fixture {
    pub fn new(channels: u16) -> Self {
        Self::with_config(test_config(channels))
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let server = MockServer::new();
        let host = TestHost::new();
        let client = Arc::new(ClientState::new(config.client_name.clone(), config.format));
        let manager = ConnectionManager::new(
            client,
            Arc::new(server.clone()),
            host.clone(),
            Arc::new(TransferStats::new()),
            config,
        );
        Self {
            server,
            host,
            manager,
        }
    }

    pub fn client(&self) -> &Arc<ClientState> {
        self.manager.client()
    }
}
