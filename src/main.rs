use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info, warn};

use audio_cascade::audio::{DeviceKey, Direction, KeyboardShortcut};
use audio_cascade::config::{Config, ConfigLoader};
use audio_cascade::controller::CascadeController;
use audio_cascade::logging::{self, LoggingConfig};
use audio_cascade::priority::{DeviceList, DeviceRegistry, MoveDirection};
use audio_cascade::service::{
    CascadeService, SignalHandler, notify_running_daemon, pid_file_path, running_daemon_pid,
};
use audio_cascade::switching::KeyChord;
use audio_cascade::system::{AudioSystemInterface, DirectoryStore, StandardFileSystem, SystemClock};

type PlatformAudio = Box<dyn AudioSystemInterface + Send>;
type Store = DirectoryStore<StandardFileSystem>;

#[derive(Parser)]
#[command(name = "audio-cascade")]
#[command(about = "Keeps the highest-priority available audio devices selected on macOS")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write log records as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the switching daemon (default)
    Daemon,
    /// Show both priority lists merged with the current hardware
    ListDevices,
    /// Show current default devices
    ShowDefault,
    /// Validate configuration file
    CheckConfig,
    /// Switch to a device now, as a manual choice
    Switch {
        #[arg(short, long)]
        uid: String,
        /// Use the input list instead of output
        #[arg(short, long)]
        input: bool,
    },
    /// Move a device one place up or down its list
    #[command(group(ArgGroup::new("direction").required(true).args(["up", "down"])))]
    Move {
        #[arg(short, long)]
        uid: String,
        #[arg(short, long)]
        input: bool,
        #[arg(long)]
        up: bool,
        #[arg(long)]
        down: bool,
    },
    /// Enable or disable a device
    Toggle {
        #[arg(short, long)]
        uid: String,
        #[arg(short, long)]
        input: bool,
    },
    /// Give a device an explicit rank (1 = most preferred)
    SetPriority {
        #[arg(short, long)]
        uid: String,
        #[arg(short, long)]
        input: bool,
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        priority: u32,
    },
    /// Renumber both lists 1..N in their current order
    ResetPriorities,
    /// Forget every disconnected device
    ClearDisconnected,
    /// Bind a key chord such as cmd+shift+a to a device
    #[command(group(ArgGroup::new("binding").required(true).args(["chord", "clear"])))]
    BindShortcut {
        #[arg(short, long)]
        uid: String,
        #[arg(long)]
        chord: Option<String>,
        /// Remove the device's chord
        #[arg(long)]
        clear: bool,
    },
    /// Act as if a key chord was pressed
    TriggerShortcut {
        #[arg(long)]
        chord: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = match &cli.config {
        Some(path) => ConfigLoader::new_production(path.clone()),
        None => ConfigLoader::new_with_default_path()?,
    };
    let config = config_loader.load_config()?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        logging::parse_level(&config.general.log_level)
    };
    let is_daemon = matches!(cli.command, None | Some(Commands::Daemon));
    let (_guard, log_dir) = logging::initialize_logging(LoggingConfig {
        level,
        file_output: is_daemon,
        json_format: cli.json_logs,
        ..LoggingConfig::default()
    })?;
    if let Some(dir) = log_dir {
        info!("Logging to {}", dir.display());
        if let Err(e) = logging::cleanup_old_logs(&dir, 7) {
            warn!("Failed to clean up old logs: {:#}", e);
        }
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(config_loader, config).await,
        Commands::ListDevices => list_devices(&config),
        Commands::ShowDefault => show_default_devices(),
        Commands::CheckConfig => check_config(&config_loader, &config),
        Commands::Switch { uid, input } => switch_device(&config, &key(uid, input)),
        Commands::Move {
            uid, input, up, ..
        } => {
            let movement = if up {
                MoveDirection::Up
            } else {
                MoveDirection::Down
            };
            let device = key(uid, input);
            edit(&config, |registry| registry.editor().move_device(&device, movement))
        }
        Commands::Toggle { uid, input } => {
            let device = key(uid, input);
            edit(&config, |registry| registry.editor().toggle_enabled(&device).is_some())
        }
        Commands::SetPriority {
            uid,
            input,
            priority,
        } => {
            let device = key(uid, input);
            edit(&config, |registry| {
                registry.editor().update_device_priority(&device, priority)
            })
        }
        Commands::ResetPriorities => edit(&config, |registry| registry.editor().reset_all_priorities()),
        Commands::ClearDisconnected => edit(&config, |registry| {
            registry.editor().clear_disconnected_devices()
        }),
        Commands::BindShortcut { uid, chord, .. } => {
            let shortcut = chord
                .map(|c| c.parse::<KeyboardShortcut>())
                .transpose()
                .context("Invalid chord")?;
            edit(&config, move |registry| registry.editor().assign_shortcut(&uid, shortcut))
        }
        Commands::TriggerShortcut { chord } => trigger_shortcut(&config, &chord),
    }
}

fn key(uid: String, input: bool) -> DeviceKey {
    let direction = if input {
        Direction::Input
    } else {
        Direction::Output
    };
    DeviceKey::new(direction, uid)
}

#[cfg(target_os = "macos")]
fn platform_audio() -> Result<PlatformAudio> {
    Ok(Box::new(audio_cascade::audio::CoreAudioSystem::new()?))
}

#[cfg(not(target_os = "macos"))]
fn platform_audio() -> Result<PlatformAudio> {
    Err(anyhow::anyhow!("Audio device control requires macOS CoreAudio"))
}

fn open_store(config: &Config) -> Result<Store> {
    Ok(DirectoryStore::new_production(config.data_dir()?))
}

fn build_controller(config: &Config) -> Result<CascadeController<PlatformAudio, Store, SystemClock>> {
    Ok(CascadeController::new(
        platform_audio()?,
        open_store(config)?,
        SystemClock,
        config,
    ))
}

async fn run_daemon(config_loader: ConfigLoader<StandardFileSystem>, config: Config) -> Result<()> {
    info!("Starting daemon mode");

    let pid_file = pid_file_path(&config.data_dir()?);
    let controller = build_controller(&config)?;
    let mut service = CascadeService::new(controller, config_loader, config).with_pid_file(pid_file);

    let signals = SignalHandler::new(service.handle());
    tokio::spawn(async move {
        if let Err(e) = signals.listen_for_signals().await {
            tracing::error!("Signal handler error: {:#}", e);
        }
    });

    println!("Audio cascade daemon started");
    println!("  Press Ctrl+C to stop");

    service.run().await?;

    println!("Daemon stopped");
    Ok(())
}

/// Apply an edit to the persisted lists, then let a running daemon know
fn edit(config: &Config, apply: impl FnOnce(&mut DeviceRegistry<Store>) -> bool) -> Result<()> {
    let mut registry = DeviceRegistry::load(open_store(config)?, config.general.new_device_placement);

    if !apply(&mut registry) {
        println!("Nothing changed");
        return Ok(());
    }

    print_list(registry.input());
    print_list(registry.output());

    let pid_file = pid_file_path(&config.data_dir()?);
    if notify_running_daemon(&pid_file)? {
        println!("Running daemon notified");
    }
    Ok(())
}

fn list_devices(config: &Config) -> Result<()> {
    let mut controller = build_controller(config)?;
    if controller.refresh().is_none() {
        println!("Could not enumerate devices; showing saved lists");
    }
    controller.sync_active();

    for direction in Direction::ALL {
        let active = controller.current_device(direction).map(str::to_string);
        println!("{} devices:", direction);
        let list = controller.registry().list(direction);
        if list.is_empty() {
            println!("  (none)");
        }
        for device in list {
            let marker = if active.as_deref() == Some(device.uid.as_str()) {
                "*"
            } else {
                " "
            };
            println!(" {} {}  [{}]", marker, device, device.uid);
        }
    }
    Ok(())
}

fn print_list(list: &DeviceList) {
    println!("{} devices:", list.direction());
    for device in list {
        println!("   {}  [{}]", device, device.uid);
    }
}

fn show_default_devices() -> Result<()> {
    let audio = platform_audio()?;
    let devices = audio.enumerate_devices().unwrap_or_default();

    println!("Current default devices:");
    for direction in Direction::ALL {
        let label = match audio.get_default_device(direction) {
            Ok(Some(uid)) => devices
                .iter()
                .find(|d| d.uid == uid)
                .map(|d| d.to_string())
                .unwrap_or(uid),
            Ok(None) => "None".to_string(),
            Err(e) => format!("unavailable ({:#})", e),
        };
        println!("  {:<6} {}", format!("{}:", direction), label);
    }
    Ok(())
}

fn check_config(config_loader: &ConfigLoader<StandardFileSystem>, config: &Config) -> Result<()> {
    println!("Configuration validation:");
    println!(
        "  ✓ Configuration file parsed successfully: {}",
        config_loader.get_config_path().display()
    );
    println!(
        "  ✓ Check interval: {:?}",
        config.general.check_interval()
    );
    if config.general.check_interval_ms < audio_cascade::config::types::MIN_CHECK_INTERVAL_MS {
        println!(
            "  ! check_interval_ms {} is below the minimum and will be raised",
            config.general.check_interval_ms
        );
    }
    println!(
        "  ✓ Manual override cooldown: {:?}",
        config.general.manual_override_cooldown()
    );
    println!(
        "  ✓ New device placement: {:?}",
        config.general.new_device_placement
    );
    println!("  ✓ Data directory: {}", config.data_dir()?.display());
    Ok(())
}

fn switch_device(config: &Config, device: &DeviceKey) -> Result<()> {
    let mut controller = build_controller(config)?;
    controller.refresh();

    if controller.set_default_device(device) {
        println!("✓ Switched {} to {}", device.direction, device.uid);
        warn_if_daemon_running(config);
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Could not switch to {}: unknown, disabled, disconnected or refused",
            device
        ))
    }
}

fn trigger_shortcut(config: &Config, chord: &str) -> Result<()> {
    let chord: KeyChord = chord.parse().context("Invalid chord")?;
    let mut controller = build_controller(config)?;
    controller.refresh();

    if controller.handle_key_chord(&chord) {
        println!("✓ Shortcut {} handled", chord);
        warn_if_daemon_running(config);
    } else {
        println!("Shortcut {} is not bound to an available device", chord);
    }
    Ok(())
}

/// The override cooldown lives in the daemon, which does not see switches
/// made from here
fn warn_if_daemon_running(config: &Config) {
    let running = config
        .data_dir()
        .and_then(|dir| running_daemon_pid(&pid_file_path(&dir)));
    match running {
        Ok(Some(pid)) => println!(
            "! The running daemon (pid {}) may switch back on its next check; \
             use `move` or `set-priority` to keep this device",
            pid
        ),
        Ok(None) => {}
        Err(e) => warn!("Could not check for a running daemon: {:#}", e),
    }
}
