//! 测试用的内存音频服务器
//!
//! 记录 open/close/端口注册/连线，并由测试线程同步驱动 period。

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::{
    AudioServer, OutputBuffers, PortConnectError, ProcessHandler, ProcessStatus,
    SampleRateCallback, ServerClient, ServerError, ShutdownCallback,
};

/// 服务器行为与记录
pub(crate) struct MockState {
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub server_running: bool,
    pub physical_ports: Vec<String>,
    pub already_connected: Vec<(String, String)>,

    pub fail_open: bool,
    pub fail_callback: Option<&'static str>,
    /// 第 N 个（0-based）端口注册失败
    pub fail_port: Option<usize>,
    pub fail_activate: bool,
    pub fail_connect: bool,

    pub opens: usize,
    pub open_requests: Vec<(String, bool)>,
    pub closes: usize,
    pub registered: Vec<String>,
    pub connections: Vec<(String, String)>,

    generation: u64,
    active: Option<ActiveClient>,
}

struct ActiveClient {
    generation: u64,
    handler: Box<dyn ProcessHandler>,
    ports: Vec<String>,
    sample_rate_cb: Option<SampleRateCallback>,
    shutdown_cb: Option<ShutdownCallback>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 256,
            server_running: true,
            physical_ports: vec![
                "system:playback_1".to_string(),
                "system:playback_2".to_string(),
            ],
            already_connected: Vec::new(),
            fail_open: false,
            fail_callback: None,
            fail_port: None,
            fail_activate: false,
            fail_connect: false,
            opens: 0,
            open_requests: Vec::new(),
            closes: 0,
            registered: Vec::new(),
            connections: Vec::new(),
            generation: 0,
            active: None,
        }
    }
}

impl MockState {
    /// 是否有已激活的 client
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// 已激活 client 的端口
    pub fn active_ports(&self) -> Vec<String> {
        self.active
            .as_ref()
            .map(|a| a.ports.clone())
            .unwrap_or_default()
    }
}

/// 一个 period 的输出
#[derive(Debug)]
pub(crate) struct PeriodOutput {
    pub status: ProcessStatus,
    pub channels: Vec<Vec<f32>>,
}

struct MockBuffers<'a>(&'a mut [Vec<f32>]);

impl OutputBuffers for MockBuffers<'_> {
    fn channel_count(&self) -> usize {
        self.0.len()
    }

    fn channel(&mut self, index: usize, frames: usize) -> &mut [f32] {
        let buf = &mut self.0[index];
        let n = frames.min(buf.len());
        &mut buf[..n]
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    /// 驱动一个 period
    ///
    /// 输出 buffer 预填 NaN，用于检测未写入的样本。没有激活的 client 时返回 None
    pub fn run_period(&self, frames: usize) -> Option<PeriodOutput> {
        let mut state = self.state.lock();
        let active = state.active.as_mut()?;

        let mut channels = vec![vec![f32::NAN; frames]; active.ports.len()];
        let status = active
            .handler
            .process(frames, &mut MockBuffers(&mut channels));

        Some(PeriodOutput { status, channels })
    }

    /// 服务器采样率变化
    pub fn change_sample_rate(&self, rate: u32) {
        let mut state = self.state.lock();
        state.sample_rate = rate;
        if let Some(cb) = state.active.as_mut().and_then(|a| a.sample_rate_cb.as_mut()) {
            cb(rate);
        }
    }

    /// 服务器关闭：client 被踢出，随后在当前线程调用 shutdown 回调
    pub fn trigger_shutdown(&self, reason: &str) {
        let callback = {
            let mut state = self.state.lock();
            state
                .active
                .take()
                .and_then(|mut active| active.shutdown_cb.take())
        };

        if let Some(cb) = callback {
            cb(reason);
        }
    }
}

impl AudioServer for MockServer {
    fn open(&self, name: &str, start_server: bool) -> Result<Box<dyn ServerClient>, ServerError> {
        let mut state = self.state.lock();
        state.opens += 1;
        state.open_requests.push((name.to_string(), start_server));

        if state.fail_open {
            return Err(ServerError("connection refused".into()));
        }

        let mut server_started = false;
        if !state.server_running {
            if !start_server {
                return Err(ServerError("server is not running".into()));
            }
            state.server_running = true;
            server_started = true;
        }

        state.generation += 1;

        Ok(Box::new(MockClient {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            generation: state.generation,
            server_started,
            handler: None,
            sample_rate_cb: None,
            shutdown_cb: None,
            ports: Vec::new(),
        }))
    }
}

struct MockClient {
    state: Arc<Mutex<MockState>>,
    name: String,
    generation: u64,
    server_started: bool,
    handler: Option<Box<dyn ProcessHandler>>,
    sample_rate_cb: Option<SampleRateCallback>,
    shutdown_cb: Option<ShutdownCallback>,
    ports: Vec<String>,
}

impl MockClient {
    fn check_callback(&self, kind: &'static str) -> Result<(), ServerError> {
        if self.state.lock().fail_callback == Some(kind) {
            Err(ServerError(format!("{} callback rejected", kind)))
        } else {
            Ok(())
        }
    }
}

impl ServerClient for MockClient {
    fn server_started(&self) -> bool {
        self.server_started
    }

    fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.state.lock().buffer_size
    }

    fn set_process_handler(&mut self, handler: Box<dyn ProcessHandler>) -> Result<(), ServerError> {
        self.check_callback("process")?;
        self.handler = Some(handler);
        Ok(())
    }

    fn set_sample_rate_callback(&mut self, callback: SampleRateCallback) -> Result<(), ServerError> {
        self.check_callback("sample rate")?;
        self.sample_rate_cb = Some(callback);
        Ok(())
    }

    fn set_shutdown_callback(&mut self, callback: ShutdownCallback) -> Result<(), ServerError> {
        self.check_callback("shutdown")?;
        self.shutdown_cb = Some(callback);
        Ok(())
    }

    fn register_output_port(&mut self, name: &str) -> Result<String, ServerError> {
        let mut state = self.state.lock();
        if state.fail_port == Some(self.ports.len()) {
            return Err(ServerError(format!("port {} rejected", name)));
        }

        let full_name = format!("{}:{}", self.name, name);
        state.registered.push(full_name.clone());
        self.ports.push(full_name.clone());
        Ok(full_name)
    }

    fn activate(&mut self) -> Result<(), ServerError> {
        let mut state = self.state.lock();
        if state.fail_activate {
            return Err(ServerError("activation refused".into()));
        }

        let handler = self
            .handler
            .take()
            .ok_or_else(|| ServerError("no process handler".into()))?;

        state.active = Some(ActiveClient {
            generation: self.generation,
            handler,
            ports: self.ports.clone(),
            sample_rate_cb: self.sample_rate_cb.take(),
            shutdown_cb: self.shutdown_cb.take(),
        });
        Ok(())
    }

    fn physical_playback_ports(&self) -> Vec<String> {
        self.state.lock().physical_ports.clone()
    }

    fn connect_ports(&self, source: &str, destination: &str) -> Result<(), PortConnectError> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(PortConnectError::Failed("graph refused".into()));
        }

        let pair = (source.to_string(), destination.to_string());
        if state.already_connected.contains(&pair) {
            return Err(PortConnectError::AlreadyConnected);
        }
        state.connections.push(pair);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), ServerError> {
        let mut state = self.state.lock();
        state.closes += 1;
        if state
            .active
            .as_ref()
            .is_some_and(|a| a.generation == self.generation)
        {
            state.active = None;
        }
        Ok(())
    }
}
