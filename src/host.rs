//! 宿主播放器接口
//!
//! 输出桥只通过 `Host` 与播放器交互：
//! - `stream_read` 在 process 回调（实时线程）中调用，实现方不得阻塞
//! - 其余方法只在控制线程调用

/// 配置键：服务器未运行时自动启动
pub const CONF_AUTOSTART: &str = "jack.autostart";
/// 配置键：自动连接物理播放端口
pub const CONF_AUTOCONNECT: &str = "jack.autoconnect";
/// 配置键：服务器关闭后自动重连
pub const CONF_AUTORESTART: &str = "jack.autorestart";

/// 一次 stream 读取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRead {
    /// 读到的字节数（可能少于请求，可能为 0）
    Bytes(usize),
    /// streamer 当前没有可用数据
    NoData,
}

/// 宿主播放器
pub trait Host: Send + Sync {
    /// 读取交织样本到 `buf`，最多 `buf.len()` 字节
    fn stream_read(&self, buf: &mut [u8]) -> StreamRead;

    /// 当前线性增益
    fn volume_amplitude(&self) -> f32;

    /// 放弃当前播放位置
    fn stream_reset(&self, flush: bool);

    /// 读取持久化的整数配置（布尔值以 0/1 存储）
    fn config_int(&self, key: &str, default: i32) -> i32;

    /// 读取持久化的布尔配置
    fn config_bool(&self, key: &str, default: bool) -> bool {
        self.config_int(key, default as i32) != 0
    }
}

/// 设置项描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub key: &'static str,
    pub label: &'static str,
    pub default: bool,
}

/// 设置界面描述：三个独立的复选框，由宿主持久化
pub const SETTINGS: [Setting; 3] = [
    Setting {
        key: CONF_AUTOSTART,
        label: "Start JACK server automatically, if not already running",
        default: true,
    },
    Setting {
        key: CONF_AUTOCONNECT,
        label: "Automatically connect to system playback ports",
        default: true,
    },
    Setting {
        key: CONF_AUTORESTART,
        label: "Automatically restart JACK server if shut down",
        default: false,
    },
];

/// 查找设置项的默认值
pub fn setting_default(key: &str) -> Option<bool> {
    SETTINGS.iter().find(|s| s.key == key).map(|s| s.default)
}

/// 以宿主设置对话框的文本格式输出设置描述
pub fn settings_dialog() -> String {
    SETTINGS
        .iter()
        .map(|s| {
            format!(
                "property \"{}\" checkbox {} {};\n",
                s.label, s.key, s.default as i32
            )
        })
        .collect()
}
