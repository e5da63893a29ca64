pub mod daemon;
pub mod signals;

pub use daemon::{
    CascadeService, PidFile, ServiceHandle, ServiceMessage, notify_running_daemon, pid_file_path,
    running_daemon_pid,
};
pub use signals::SignalHandler;
