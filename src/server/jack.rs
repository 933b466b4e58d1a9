//! JACK 后端
//!
//! 把 `AudioServer` / `ServerClient` 映射到 libjack：
//! - open → `jack_client_open`（可选 NoStartServer）
//! - process handler 与输出端口在 activate 时一起移入 JACK 的实时线程
//! - 采样率与 shutdown 回调通过 `NotificationHandler` 转发

use ::jack::{
    AsyncClient, AudioOut, Client, ClientOptions, ClientStatus, Control, Frames,
    NotificationHandler, Port, PortFlags, ProcessScope,
};
use log::debug;

use super::{
    AudioServer, OutputBuffers, PortConnectError, ProcessHandler, ProcessStatus,
    SampleRateCallback, ServerClient, ServerError, ShutdownCallback,
};

/// 本机 JACK 服务器
#[derive(Debug, Default, Clone, Copy)]
pub struct JackServer;

impl JackServer {
    pub fn new() -> Self {
        Self
    }
}

impl AudioServer for JackServer {
    fn open(&self, name: &str, start_server: bool) -> Result<Box<dyn ServerClient>, ServerError> {
        let options = if start_server {
            ClientOptions::empty()
        } else {
            ClientOptions::NO_START_SERVER
        };

        let (client, status) = Client::new(name, options).map_err(server_error)?;
        debug!("jack_client_open: {:?}", status);

        Ok(Box::new(JackClient {
            state: Connection::Inactive(client),
            server_started: status.contains(ClientStatus::SERVER_STARTED),
            handler: None,
            notifications: Notifications::default(),
            ports: Vec::new(),
        }))
    }
}

fn server_error(e: ::jack::Error) -> ServerError {
    ServerError(e.to_string())
}

enum Connection {
    Inactive(Client),
    Active(AsyncClient<Notifications, Process>),
    /// 激活失败后 client 已被消耗
    Closed,
}

struct JackClient {
    state: Connection,
    server_started: bool,
    handler: Option<Box<dyn ProcessHandler>>,
    notifications: Notifications,
    ports: Vec<Port<AudioOut>>,
}

impl JackClient {
    fn client(&self) -> Option<&Client> {
        match &self.state {
            Connection::Inactive(client) => Some(client),
            Connection::Active(active) => Some(active.as_client()),
            Connection::Closed => None,
        }
    }

    fn require_client(&self) -> Result<&Client, ServerError> {
        self.client()
            .ok_or_else(|| ServerError("client is closed".to_string()))
    }
}

impl ServerClient for JackClient {
    fn server_started(&self) -> bool {
        self.server_started
    }

    fn sample_rate(&self) -> u32 {
        self.client().map(|c| c.sample_rate() as u32).unwrap_or(0)
    }

    fn buffer_size(&self) -> usize {
        self.client().map(|c| c.buffer_size() as usize).unwrap_or(0)
    }

    fn set_process_handler(&mut self, handler: Box<dyn ProcessHandler>) -> Result<(), ServerError> {
        self.handler = Some(handler);
        Ok(())
    }

    fn set_sample_rate_callback(&mut self, callback: SampleRateCallback) -> Result<(), ServerError> {
        self.notifications.sample_rate = Some(callback);
        Ok(())
    }

    fn set_shutdown_callback(&mut self, callback: ShutdownCallback) -> Result<(), ServerError> {
        self.notifications.shutdown = Some(callback);
        Ok(())
    }

    fn register_output_port(&mut self, name: &str) -> Result<String, ServerError> {
        let port = self
            .require_client()?
            .register_port(name, AudioOut::default())
            .map_err(server_error)?;
        let full_name = port.name().map_err(server_error)?;
        self.ports.push(port);
        Ok(full_name)
    }

    fn activate(&mut self) -> Result<(), ServerError> {
        let handler = self
            .handler
            .take()
            .ok_or_else(|| ServerError("no process handler installed".to_string()))?;

        let client = match std::mem::replace(&mut self.state, Connection::Closed) {
            Connection::Inactive(client) => client,
            other => {
                self.state = other;
                return Err(ServerError("client is not inactive".to_string()));
            }
        };

        let process = Process {
            handler,
            ports: std::mem::take(&mut self.ports),
        };
        let notifications = std::mem::take(&mut self.notifications);

        let active = client
            .activate_async(notifications, process)
            .map_err(server_error)?;
        self.state = Connection::Active(active);
        Ok(())
    }

    fn physical_playback_ports(&self) -> Vec<String> {
        self.client()
            .map(|c| c.ports(None, None, PortFlags::IS_PHYSICAL | PortFlags::IS_INPUT))
            .unwrap_or_default()
    }

    fn connect_ports(&self, source: &str, destination: &str) -> Result<(), PortConnectError> {
        let client = self
            .client()
            .ok_or_else(|| PortConnectError::Failed("client is closed".to_string()))?;

        match client.connect_ports_by_name(source, destination) {
            Ok(()) => Ok(()),
            Err(::jack::Error::PortAlreadyConnected(_, _)) => Err(PortConnectError::AlreadyConnected),
            Err(e) => Err(PortConnectError::Failed(e.to_string())),
        }
    }

    fn close(self: Box<Self>) -> Result<(), ServerError> {
        match self.state {
            Connection::Active(active) => {
                // deactivate 之后 client 随 drop 关闭
                let (_client, _notifications, _process) = active.deactivate().map_err(server_error)?;
                Ok(())
            }
            Connection::Inactive(client) => {
                drop(client);
                Ok(())
            }
            Connection::Closed => Ok(()),
        }
    }
}

/// 实时线程：端口 + 传输引擎
struct Process {
    handler: Box<dyn ProcessHandler>,
    ports: Vec<Port<AudioOut>>,
}

struct JackBuffers<'a> {
    ports: &'a mut [Port<AudioOut>],
    scope: &'a ProcessScope,
}

impl OutputBuffers for JackBuffers<'_> {
    fn channel_count(&self) -> usize {
        self.ports.len()
    }

    fn channel(&mut self, index: usize, frames: usize) -> &mut [f32] {
        let buf = self.ports[index].as_mut_slice(self.scope);
        let n = frames.min(buf.len());
        &mut buf[..n]
    }
}

impl ::jack::ProcessHandler for Process {
    fn process(&mut self, _: &Client, ps: &ProcessScope) -> Control {
        let frames = ps.n_frames() as usize;
        let status = self.handler.process(
            frames,
            &mut JackBuffers {
                ports: &mut self.ports,
                scope: ps,
            },
        );

        // 未就绪：端口 buffer 内容未定义，必须清零
        if status == ProcessStatus::NotReady {
            for port in self.ports.iter_mut() {
                port.as_mut_slice(ps).fill(0.0);
            }
        }
        Control::Continue
    }
}

#[derive(Default)]
struct Notifications {
    sample_rate: Option<SampleRateCallback>,
    shutdown: Option<ShutdownCallback>,
}

impl NotificationHandler for Notifications {
    unsafe fn shutdown(&mut self, _status: ClientStatus, reason: &str) {
        if let Some(callback) = self.shutdown.take() {
            callback(reason);
        }
    }

    fn sample_rate(&mut self, _: &Client, srate: Frames) -> Control {
        if let Some(callback) = self.sample_rate.as_mut() {
            callback(srate);
        }
        Control::Continue
    }
}
