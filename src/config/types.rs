use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fastest allowed evaluation tick
pub const MIN_CHECK_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub check_interval_ms: u64,
    pub manual_override_cooldown_ms: u64,
    pub reconnect_debounce_ms: u64,
    pub new_device_placement: NewDevicePlacement,
    pub log_level: String,
}

/// Where a device seen for the first time lands in its list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewDevicePlacement {
    /// After every known device; plugging something in never switches to it
    /// unless nothing better is available.
    #[default]
    Bottom,
    /// At rank 1, pushing every known device down one rank.
    Top,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub show_device_availability: bool, // Device connect/disconnect notifications
    pub show_switching_actions: bool,   // Device switching notifications
    pub show_shortcut_triggers: bool,   // Shortcut switch confirmations
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the saved device lists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            manual_override_cooldown_ms: 3000,
            reconnect_debounce_ms: 500,
            new_device_placement: NewDevicePlacement::Bottom,
            log_level: "info".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            show_device_availability: false, // Default: no device availability notifications
            show_switching_actions: true,    // Default: show switching notifications
            show_shortcut_triggers: true,
        }
    }
}

impl GeneralConfig {
    /// Evaluation tick, never faster than [`MIN_CHECK_INTERVAL_MS`]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(MIN_CHECK_INTERVAL_MS))
    }

    pub fn manual_override_cooldown(&self) -> Duration {
        Duration::from_millis(self.manual_override_cooldown_ms)
    }

    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect_debounce_ms)
    }
}

impl Config {
    /// Directory for the persisted device lists, honouring the override
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::system::DirectoryStore::default_data_dir(),
        }
    }
}
