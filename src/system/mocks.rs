use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::audio::{DeviceSnapshot, Direction};
use crate::system::traits::{AudioSystemInterface, Clock, FileSystemInterface, PersistenceStore};

type CallbackFn = Box<dyn Fn() + Send + Sync>;

/// Mock audio system for testing - provides controllable device behavior
#[derive(Clone)]
pub struct MockAudioSystem {
    pub devices: Arc<Mutex<Vec<DeviceSnapshot>>>,
    pub default_output: Arc<Mutex<Option<String>>>,
    pub default_input: Arc<Mutex<Option<String>>>,
    pub device_change_callbacks: Arc<Mutex<Vec<CallbackFn>>>,
    pub set_device_calls: Arc<Mutex<Vec<(Direction, String)>>>,
    pub should_fail_enumeration: Arc<Mutex<bool>>,
    pub should_fail_default_query: Arc<Mutex<bool>>,
    pub should_fail_set_device: Arc<Mutex<bool>>,
}

impl MockAudioSystem {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(Mutex::new(Vec::new())),
            default_output: Arc::new(Mutex::new(None)),
            default_input: Arc::new(Mutex::new(None)),
            device_change_callbacks: Arc::new(Mutex::new(Vec::new())),
            set_device_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_enumeration: Arc::new(Mutex::new(false)),
            should_fail_default_query: Arc::new(Mutex::new(false)),
            should_fail_set_device: Arc::new(Mutex::new(false)),
        }
    }

    /// Plug a device in and notify listeners
    pub fn add_device(&self, device: DeviceSnapshot) {
        self.devices.lock().unwrap().push(device);
        self.trigger_device_change();
    }

    /// Unplug a device and notify listeners. A removed default is cleared,
    /// like the hardware picking nothing until someone chooses.
    pub fn remove_device(&self, uid: &str) {
        self.devices.lock().unwrap().retain(|d| d.uid != uid);
        for default in [&self.default_input, &self.default_output] {
            let mut default = default.lock().unwrap();
            if default.as_deref() == Some(uid) {
                *default = None;
            }
        }
        self.trigger_device_change();
    }

    /// Set the hardware default directly, as if changed outside the app
    pub fn set_mock_default(&self, direction: Direction, uid: Option<&str>) {
        *self.default_slot(direction).lock().unwrap() = uid.map(str::to_string);
    }

    pub fn mock_default(&self, direction: Direction) -> Option<String> {
        self.default_slot(direction).lock().unwrap().clone()
    }

    fn default_slot(&self, direction: Direction) -> &Arc<Mutex<Option<String>>> {
        match direction {
            Direction::Input => &self.default_input,
            Direction::Output => &self.default_output,
        }
    }

    /// Trigger all registered device change callbacks
    pub fn trigger_device_change(&self) {
        let callbacks = self.device_change_callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            callback();
        }
    }

    /// Get all set device calls that were made
    pub fn get_set_device_calls(&self) -> Vec<(Direction, String)> {
        self.set_device_calls.lock().unwrap().clone()
    }

    /// Clear the history of set device calls
    pub fn clear_set_device_calls(&self) {
        self.set_device_calls.lock().unwrap().clear();
    }

    /// Configure the mock to fail enumeration
    pub fn set_enumeration_failure(&self, should_fail: bool) {
        *self.should_fail_enumeration.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail default device queries
    pub fn set_default_query_failure(&self, should_fail: bool) {
        *self.should_fail_default_query.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail device setting
    pub fn set_device_setting_failure(&self, should_fail: bool) {
        *self.should_fail_set_device.lock().unwrap() = should_fail;
    }

    /// Get count of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.device_change_callbacks.lock().unwrap().len()
    }
}

impl AudioSystemInterface for MockAudioSystem {
    fn enumerate_devices(&self) -> Result<Vec<DeviceSnapshot>> {
        if *self.should_fail_enumeration.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock enumeration failure"));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    fn get_default_device(&self, direction: Direction) -> Result<Option<String>> {
        if *self.should_fail_default_query.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock default query failure"));
        }
        Ok(self.mock_default(direction))
    }

    fn set_default_device(&self, direction: Direction, uid: &str) -> Result<()> {
        self.set_device_calls
            .lock()
            .unwrap()
            .push((direction, uid.to_string()));

        if *self.should_fail_set_device.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock set device failure"));
        }

        let present = self
            .devices
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.uid == uid && d.supports(direction));
        if !present {
            return Err(anyhow::anyhow!("{} device '{}' not found", direction, uid));
        }

        self.set_mock_default(direction, Some(uid));
        Ok(())
    }

    fn add_device_change_listener(&self, callback: Box<dyn Fn() + Send + Sync>) -> Result<()> {
        self.device_change_callbacks.lock().unwrap().push(callback);
        Ok(())
    }
}

impl Default for MockAudioSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory persistence store for testing
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub set_calls: Arc<Mutex<Vec<String>>>,
    pub should_fail_get: Arc<Mutex<bool>>,
    pub should_fail_set: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw bytes under a key
    pub fn insert(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(key).cloned()
    }

    /// Number of writes made to a key
    pub fn write_count(&self, key: &str) -> usize {
        self.set_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }

    pub fn set_get_failure(&self, should_fail: bool) {
        *self.should_fail_get.lock().unwrap() = should_fail;
    }

    pub fn set_set_failure(&self, should_fail: bool) {
        *self.should_fail_set.lock().unwrap() = should_fail;
    }
}

impl PersistenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if *self.should_fail_get.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock store read failure"));
        }
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set_calls.lock().unwrap().push(key.to_string());
        if *self.should_fail_set.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock store write failure"));
        }
        self.insert(key, value);
        Ok(())
    }
}

/// Manually advanced clock for testing cooldowns
#[derive(Clone)]
pub struct MockClock {
    pub now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    pub fn advance_ms(&self, milliseconds: i64) {
        self.advance(Duration::milliseconds(milliseconds));
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock file system for testing - provides controllable file operations
#[derive(Clone)]
pub struct MockFileSystem {
    pub files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pub read_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub write_calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub directory_creation_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    pub should_fail_create_dir: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_calls: Arc::new(Mutex::new(Vec::new())),
            write_calls: Arc::new(Mutex::new(Vec::new())),
            directory_creation_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_read: Arc::new(Mutex::new(false)),
            should_fail_write: Arc::new(Mutex::new(false)),
            should_fail_create_dir: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a file to the mock file system
    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: String) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content);
    }

    /// Remove a file from the mock file system
    pub fn remove_file<P: AsRef<Path>>(&self, path: P) {
        self.files.lock().unwrap().remove(path.as_ref());
    }

    /// Current content of a file, if present
    pub fn file_content<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    /// Get all read calls that were made
    pub fn get_read_calls(&self) -> Vec<PathBuf> {
        self.read_calls.lock().unwrap().clone()
    }

    /// Get all write calls that were made
    pub fn get_write_calls(&self) -> Vec<(PathBuf, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    /// Get all directory creation calls that were made
    pub fn get_directory_creation_calls(&self) -> Vec<PathBuf> {
        self.directory_creation_calls.lock().unwrap().clone()
    }

    /// Clear all call histories
    pub fn clear_call_history(&self) {
        self.read_calls.lock().unwrap().clear();
        self.write_calls.lock().unwrap().clear();
        self.directory_creation_calls.lock().unwrap().clear();
    }

    /// Configure the mock to fail read operations
    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail write operations
    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail directory creation
    pub fn set_create_dir_failure(&self, should_fail: bool) {
        *self.should_fail_create_dir.lock().unwrap() = should_fail;
    }
}

impl FileSystemInterface for MockFileSystem {
    fn read_file(&self, path: &Path) -> Result<String> {
        self.read_calls.lock().unwrap().push(path.to_path_buf());

        if *self.should_fail_read.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock write failure"));
        }

        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.directory_creation_calls
            .lock()
            .unwrap()
            .push(path.to_path_buf());

        if *self.should_fail_create_dir.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock create directory failure"));
        }

        Ok(())
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}
