use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::audio::{DeviceSnapshot, Direction};

/// Trait for audio hardware operations - abstracts CoreAudio for testability
pub trait AudioSystemInterface {
    /// Enumerate every endpoint the hardware currently reports
    fn enumerate_devices(&self) -> Result<Vec<DeviceSnapshot>>;

    /// UID of the system default device for a direction, if any
    fn get_default_device(&self, direction: Direction) -> Result<Option<String>>;

    /// Make the device with this UID the system default for a direction
    fn set_default_device(&self, direction: Direction, uid: &str) -> Result<()>;

    /// Register a callback for topology notifications.
    /// The callback may be invoked on an arbitrary thread.
    fn add_device_change_listener(&self, callback: Box<dyn Fn() + Send + Sync>) -> Result<()>;
}

impl<T: AudioSystemInterface + ?Sized> AudioSystemInterface for Box<T> {
    fn enumerate_devices(&self) -> Result<Vec<DeviceSnapshot>> {
        (**self).enumerate_devices()
    }

    fn get_default_device(&self, direction: Direction) -> Result<Option<String>> {
        (**self).get_default_device(direction)
    }

    fn set_default_device(&self, direction: Direction, uid: &str) -> Result<()> {
        (**self).set_default_device(direction, uid)
    }

    fn add_device_change_listener(&self, callback: Box<dyn Fn() + Send + Sync>) -> Result<()> {
        (**self).add_device_change_listener(callback)
    }
}

/// Key/value byte store used to persist the ranked device lists
pub trait PersistenceStore {
    /// Bytes stored under `key`, `None` if nothing was ever stored
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Source of wall-clock time for cooldowns and `last_seen` stamps
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Trait for file system operations - abstracts std::fs for testability
pub trait FileSystemInterface {
    /// Read the entire contents of a file
    fn read_file(&self, path: &Path) -> Result<String>;

    /// Write content to a file, replacing it
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check if a file exists
    fn file_exists(&self, path: &Path) -> bool;

    /// Create a directory and its parents
    fn create_dir(&self, path: &Path) -> Result<()>;
}
