//! jack-output - 把解码后的音频送进 JACK
//!
//! 演示宿主：解码文件 → streamer → 输出插件 → JACK 端口

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use jack_output::audio::WaveFormat;
use jack_output::decode::AudioDecoder;
use jack_output::host::{self, CONF_AUTOCONNECT, CONF_AUTORESTART, CONF_AUTOSTART};
use jack_output::output::{BridgeConfig, OutputPlugin, PlaybackState};
use jack_output::player::{HostConfig, Streamer};
use jack_output::server::jack::JackServer;

/// jack-output - play audio files through a JACK server
#[derive(Parser)]
#[command(name = "jack-output")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $XDG_CONFIG_HOME/jack-output/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a file and exit
    Play {
        /// Audio file to play
        file: PathBuf,

        /// Linear volume (0.0 - 1.0)
        #[arg(long, default_value = "1.0")]
        volume: f32,

        /// Number of output ports (default: channel count of the file)
        #[arg(long)]
        channels: Option<u16>,

        /// Do not start the JACK server if it is not running
        #[arg(long)]
        no_autostart: bool,

        /// Do not connect to the system playback ports
        #[arg(long)]
        no_autoconnect: bool,

        /// Reconnect if the JACK server shuts down
        #[arg(long)]
        autorestart: bool,
    },

    /// Show or change the persisted settings
    Settings {
        /// Set a value, e.g. jack.autorestart=1
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config_path = cli.config.clone().or_else(HostConfig::default_path);

    match cli.command {
        Commands::Play {
            ref file,
            volume,
            channels,
            no_autostart,
            no_autoconnect,
            autorestart,
        } => {
            let mut config = load_config(config_path.as_deref())?;
            // 命令行开关只对本次运行生效
            if no_autostart {
                config.set(CONF_AUTOSTART, 0)?;
            }
            if no_autoconnect {
                config.set(CONF_AUTOCONNECT, 0)?;
            }
            if autorestart {
                config.set(CONF_AUTORESTART, 1)?;
            }
            play(file, config, volume, channels)?;
        }
        Commands::Settings { ref set } => {
            settings(config_path.as_deref(), set)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HostConfig> {
    match path {
        Some(path) => HostConfig::load(path).with_context(|| format!("load config {}", path.display())),
        None => Ok(HostConfig::default()),
    }
}

/// 显示 / 修改设置
fn settings(path: Option<&Path>, assignments: &[String]) -> anyhow::Result<()> {
    let mut config = load_config(path)?;

    if !assignments.is_empty() {
        let path = path.context("no config path available (set --config or $HOME)")?;
        for assignment in assignments {
            let (key, value) = assignment
                .split_once('=')
                .with_context(|| format!("expected KEY=VALUE, got '{}'", assignment))?;
            let value: i32 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid value for {}", key))?;
            config.set(key.trim(), value)?;
        }
        config.save(path)?;
        println!("Saved {}", path.display());
    }

    print!("{}", host::settings_dialog());
    println!();
    for setting in host::SETTINGS.iter() {
        let value = config.get(setting.key).unwrap_or(setting.default as i32);
        println!("{:<18} = {}   ({})", setting.key, value, setting.label);
    }

    Ok(())
}

/// 播放单个文件
fn play(file: &Path, config: HostConfig, volume: f32, channels: Option<u16>) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    // 先探测声道数，连接时直接注册正确数量的端口
    let source = AudioDecoder::open(file)?.info().clone();
    let channels = channels.unwrap_or(source.channels).max(1);

    let streamer = Streamer::new(config);
    streamer.set_volume(volume);

    let bridge = BridgeConfig {
        format: WaveFormat::default().with_channels(channels),
        ..BridgeConfig::default()
    };
    let plugin = OutputPlugin::new(Arc::new(JackServer::new()), streamer.clone(), bridge)?;

    println!("jack-output - Loading: {}", file.display());
    plugin.init()?;
    plugin.set_format(&WaveFormat::default().with_channels(channels))?;

    let format = plugin.format();
    if source.sample_rate != format.sample_rate {
        log::warn!(
            "File is {}Hz but JACK runs at {}Hz; playing without resampling",
            source.sample_rate,
            format.sample_rate
        );
    }
    println!(
        "Output: {} ports @ {}Hz | {}",
        channels,
        format.sample_rate,
        plugin.client().ports().join(", ")
    );

    streamer.load(file, channels)?;

    // 预缓冲
    while streamer.fill_ratio() < 0.25 && !streamer.is_finished() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    plugin.play()?;
    println!("Playing. Press Ctrl+C to stop.\n");

    loop {
        if !running.load(Ordering::SeqCst) {
            println!("\nPlayback interrupted.");
            break;
        }

        // streamer 耗尽后 process 回调会把状态降为 Stopped
        let stalled = plugin.state() != PlaybackState::Playing || !plugin.client().is_connected();
        if streamer.is_finished() && stalled {
            println!();
            break;
        }

        let stats = plugin.stats().report(plugin.format().sample_rate);
        print!(
            "\r{:>7.1}s | buffer {:>3.0}% | {}",
            stats.delivered_secs(),
            streamer.fill_ratio() * 100.0,
            if plugin.client().is_connected() { "connected" } else { "disconnected" }
        );
        io::stdout().flush()?;
        std::thread::sleep(Duration::from_millis(100));
    }

    plugin.stop()?;
    plugin.shutdown()?;
    streamer.stop();

    println!("{}", plugin.stats().report(plugin.format().sample_rate));
    Ok(())
}
