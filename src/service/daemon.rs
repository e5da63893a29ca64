use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigLoader};
use crate::controller::{CascadeController, UserIntent};
use crate::switching::KeyChord;
use crate::system::{AudioSystemInterface, Clock, FileSystemInterface, PersistenceStore};

pub const PID_FILE_NAME: &str = "audio-cascade.pid";

/// Work items for the service loop. Everything that touches controller
/// state arrives here so it runs on the loop's single context.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMessage {
    TopologyChanged,
    DeferredEvaluation,
    Intent(UserIntent),
    KeyChord(KeyChord),
    Reload,
    Shutdown,
}

/// Cloneable entry point into a running service
#[derive(Clone)]
pub struct ServiceHandle {
    sender: mpsc::UnboundedSender<ServiceMessage>,
}

impl ServiceHandle {
    pub fn send(&self, message: ServiceMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| anyhow::anyhow!("Service loop has stopped"))
    }

    pub fn intent(&self, intent: UserIntent) -> Result<()> {
        self.send(ServiceMessage::Intent(intent))
    }

    pub fn key_chord(&self, chord: KeyChord) -> Result<()> {
        self.send(ServiceMessage::KeyChord(chord))
    }

    pub fn reload(&self) -> Result<()> {
        self.send(ServiceMessage::Reload)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(ServiceMessage::Shutdown)
    }
}

/// The daemon's main loop: owns the controller and serializes timer ticks,
/// hardware notifications, user intents and signals onto one task.
pub struct CascadeService<A, S, C, F>
where
    A: AudioSystemInterface,
    S: PersistenceStore,
    C: Clock,
    F: FileSystemInterface,
{
    controller: CascadeController<A, S, C>,
    config_loader: ConfigLoader<F>,
    config: Config,
    sender: mpsc::UnboundedSender<ServiceMessage>,
    receiver: mpsc::UnboundedReceiver<ServiceMessage>,
    pid_file: Option<PathBuf>,
}

impl<A, S, C, F> CascadeService<A, S, C, F>
where
    A: AudioSystemInterface,
    S: PersistenceStore,
    C: Clock,
    F: FileSystemInterface,
{
    pub fn new(
        controller: CascadeController<A, S, C>,
        config_loader: ConfigLoader<F>,
        config: Config,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            controller,
            config_loader,
            config,
            sender,
            receiver,
            pid_file: None,
        }
    }

    /// Record the daemon's pid here while running so CLI edits can signal it
    pub fn with_pid_file(mut self, path: PathBuf) -> Self {
        self.pid_file = Some(path);
        self
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn controller(&self) -> &CascadeController<A, S, C> {
        &self.controller
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until a `Shutdown` message arrives
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting audio cascade service");

        let topology = self.sender.clone();
        self.controller
            .watch_topology(Box::new(move || {
                if topology.send(ServiceMessage::TopologyChanged).is_err() {
                    debug!("Topology change after service stopped");
                }
            }))
            .context("Failed to register device change listener")?;

        let _pid_lock = match &self.pid_file {
            Some(path) => Some(PidFile::acquire(path)?),
            None => None,
        };

        self.controller.start();

        let mut ticker = self.ticker();
        info!(
            "Service started, evaluating every {:?}",
            self.config.general.check_interval()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.controller.evaluate();
                }
                message = self.receiver.recv() => {
                    let Some(message) = message else {
                        warn!("Service channel closed");
                        break;
                    };
                    match message {
                        ServiceMessage::Shutdown => {
                            info!("Shutdown requested, stopping service");
                            break;
                        }
                        ServiceMessage::Reload => {
                            let previous_interval = self.config.general.check_interval();
                            self.reload();
                            if self.config.general.check_interval() != previous_interval {
                                ticker = self.ticker();
                            }
                        }
                        other => self.handle_message(other),
                    }
                }
            }
        }

        info!("Service shutdown completed");
        Ok(())
    }

    fn ticker(&self) -> tokio::time::Interval {
        // start() has just evaluated, so the first tick is one period out
        let period = self.config.general.check_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn handle_message(&mut self, message: ServiceMessage) {
        debug!("Service message: {:?}", message);
        match message {
            ServiceMessage::TopologyChanged => self.on_topology_changed(),
            ServiceMessage::DeferredEvaluation => {
                self.controller.evaluate();
            }
            ServiceMessage::Intent(intent) => {
                self.controller.apply_intent(intent);
            }
            ServiceMessage::KeyChord(chord) => {
                if !self.controller.handle_key_chord(&chord) {
                    debug!("Chord {} not bound to an available device", chord);
                }
            }
            ServiceMessage::Reload | ServiceMessage::Shutdown => {}
        }
    }

    fn on_topology_changed(&mut self) {
        let Some(outcome) = self.controller.refresh() else {
            return;
        };

        if outcome.requires_immediate_evaluation() || !outcome.disconnected.is_empty() {
            self.controller.evaluate();
        } else if outcome.requires_deferred_evaluation() {
            // Reconnect bursts settle before we pick; duplicates are harmless
            let sender = self.sender.clone();
            let debounce = self.config.general.reconnect_debounce();
            tokio::spawn(async move {
                sleep(debounce).await;
                let _ = sender.send(ServiceMessage::DeferredEvaluation);
            });
        }
    }

    fn reload(&mut self) {
        info!("Reloading configuration and device lists");
        match self.config_loader.reload_config() {
            Ok(config) => self.config = config,
            Err(e) => error!("Failed to reload configuration, keeping current: {:#}", e),
        }
        self.controller.reload(&self.config);
    }
}

pub fn pid_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(PID_FILE_NAME)
}

/// The running daemon's claim on its pid file. The exclusive `flock` lives
/// as long as this value, so a lock held on the file proves the recorded
/// pid belongs to a live daemon and not to a process that reused it.
pub struct PidFile {
    path: PathBuf,
    _file: File,
}

impl PidFile {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open pid file {}", path.display()))?;

        if !try_lock(&file, libc::LOCK_EX)? {
            return Err(anyhow::anyhow!(
                "Another audio-cascade daemon is already running ({})",
                path.display()
            ));
        }

        file.set_len(0)
            .and_then(|()| file.write_all(std::process::id().to_string().as_bytes()))
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;

        debug!("Holding pid file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Removed while still locked; the lock goes with the descriptor
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove pid file {}: {}", self.path.display(), e);
        }
    }
}

/// Non-blocking `flock`. `Ok(false)` means another descriptor holds a
/// conflicting lock.
fn try_lock(file: &File, operation: libc::c_int) -> Result<bool> {
    if unsafe { libc::flock(file.as_raw_fd(), operation | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }

    let error = std::io::Error::last_os_error();
    if error.kind() == std::io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(error).context("flock failed")
    }
}

fn parse_pid(contents: &str) -> Result<libc::pid_t> {
    let pid: libc::pid_t = contents.trim().parse().context("Not a process id")?;
    // 0 and negative values address process groups in kill(2)
    if pid <= 0 {
        return Err(anyhow::anyhow!("Refusing non-positive pid {}", pid));
    }
    Ok(pid)
}

/// Pid of the daemon currently holding `pid_file`. A file nobody holds
/// the lock on is left over from a daemon that died and yields `None`.
pub fn running_daemon_pid(pid_file: &Path) -> Result<Option<libc::pid_t>> {
    let mut file = match File::open(pid_file) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {}", pid_file.display()));
        }
    };

    if try_lock(&file, libc::LOCK_SH)? {
        debug!("Stale pid file {}, no daemon holds it", pid_file.display());
        return Ok(None);
    }

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .with_context(|| format!("Failed to read {}", pid_file.display()))?;
    let pid = parse_pid(&contents)
        .with_context(|| format!("Invalid pid in {}", pid_file.display()))?;
    Ok(Some(pid))
}

/// Ask a running daemon to reload its lists. Returns false when no live
/// daemon holds the pid file.
pub fn notify_running_daemon(pid_file: &Path) -> Result<bool> {
    let Some(pid) = running_daemon_pid(pid_file)? else {
        return Ok(false);
    };

    if unsafe { libc::kill(pid, libc::SIGHUP) } != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to signal daemon (pid {})", pid));
    }

    info!("Asked running daemon (pid {}) to reload", pid);
    Ok(true)
}
