pub mod audio;
pub mod config;
pub mod controller;
pub mod logging;
pub mod notifications;
pub mod priority;
pub mod service;
pub mod switching;
pub mod system;

pub use config::Config;
pub use controller::{CascadeController, CascadeEvent, UserIntent};
pub use service::{CascadeService, ServiceHandle, ServiceMessage};
