use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::system::FileSystemInterface;

use super::types::{Config, MIN_CHECK_INTERVAL_MS};

/// Configuration loader that uses dependency injection for file system operations
pub struct ConfigLoader<F: FileSystemInterface> {
    file_system: F,
    config_path: PathBuf,
}

impl<F: FileSystemInterface> ConfigLoader<F> {
    pub fn new(file_system: F, config_path: PathBuf) -> Self {
        Self {
            file_system,
            config_path,
        }
    }

    /// Read and parse the config file, writing out the defaults on first run
    pub fn load_config(&self) -> Result<Config> {
        let path = self.config_path.as_path();
        if !self.file_system.file_exists(path) {
            info!("No config at {}, using defaults", path.display());
            return Ok(self.write_defaults());
        }

        let text = self
            .file_system
            .read_file(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        warn_on_adjusted_values(&config);
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let path = self.config_path.as_path();
        if let Some(dir) = path.parent() {
            self.file_system
                .create_dir(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
        self.file_system
            .write_file(path, &text)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Re-read the file after SIGHUP
    pub fn reload_config(&self) -> Result<Config> {
        debug!("Reloading config from {}", self.config_path.display());
        self.load_config()
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config_exists(&self) -> bool {
        self.file_system.file_exists(&self.config_path)
    }

    fn write_defaults(&self) -> Config {
        let config = Config::default();
        match self.save_config(&config) {
            Ok(()) => info!("Wrote default config to {}", self.config_path.display()),
            // An unwritable location still runs with defaults
            Err(e) => warn!(
                "Could not write default config to {}: {:#}",
                self.config_path.display(),
                e
            ),
        }
        config
    }
}

fn warn_on_adjusted_values(config: &Config) {
    let general = &config.general;
    if general.check_interval_ms < MIN_CHECK_INTERVAL_MS {
        warn!(
            "check_interval_ms = {} is below {}, using {:?}",
            general.check_interval_ms,
            MIN_CHECK_INTERVAL_MS,
            general.check_interval()
        );
    }
    if general.log_level.parse::<tracing::Level>().is_err() {
        warn!("Unknown log_level '{}', using info", general.log_level);
    }
}

impl ConfigLoader<crate::system::StandardFileSystem> {
    pub fn new_production(config_path: PathBuf) -> Self {
        Self::new(crate::system::StandardFileSystem, config_path)
    }

    /// Create a production config loader with the default path
    pub fn new_with_default_path() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self::new_production(config_path))
    }

    /// Get the default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".config/audio-cascade/config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewDevicePlacement;
    use crate::system::MockFileSystem;
    use std::path::PathBuf;

    #[test]
    fn test_load_nonexistent_config_creates_default() {
        let mock_fs = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        let loader = ConfigLoader::new(mock_fs.clone(), config_path.clone());

        let config = loader.load_config().unwrap();

        assert_eq!(config, Config::default());
        assert!(mock_fs.file_content(&config_path).is_some());
    }

    #[test]
    fn test_unwritable_default_still_loads() {
        let mock_fs = MockFileSystem::new();
        mock_fs.set_create_dir_failure(true);
        let loader = ConfigLoader::new(mock_fs, PathBuf::from("/readonly/config.toml"));

        let config = loader.load_config().unwrap();
        assert_eq!(config.general.check_interval_ms, 1000);
    }

    #[test]
    fn test_load_existing_config() {
        let mock_fs = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");

        let config_content = r#"
[general]
check_interval_ms = 2000
manual_override_cooldown_ms = 5000
new_device_placement = "top"
log_level = "debug"

[notifications]
show_device_availability = true
show_switching_actions = false

[storage]
data_dir = "/tmp/cascade"
"#;
        mock_fs.add_file(&config_path, config_content.to_string());

        let loader = ConfigLoader::new(mock_fs, config_path);
        let config = loader.load_config().unwrap();

        assert_eq!(config.general.check_interval_ms, 2000);
        assert_eq!(config.general.manual_override_cooldown_ms, 5000);
        assert_eq!(config.general.reconnect_debounce_ms, 500);
        assert_eq!(config.general.new_device_placement, NewDevicePlacement::Top);
        assert_eq!(config.general.log_level, "debug");
        assert!(config.notifications.show_device_availability);
        assert!(!config.notifications.show_switching_actions);
        assert!(config.notifications.show_shortcut_triggers);
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/cascade")));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mock_fs = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        mock_fs.add_file(&config_path, "[general\ncheck_interval_ms = ".to_string());

        let loader = ConfigLoader::new(mock_fs, config_path);
        assert!(loader.load_config().is_err());
    }

    #[test]
    fn test_save_config() {
        let mock_fs = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        let loader = ConfigLoader::new(mock_fs.clone(), config_path.clone());

        loader.save_config(&Config::default()).unwrap();

        let write_calls = mock_fs.get_write_calls();
        assert_eq!(write_calls.len(), 1);
        assert_eq!(write_calls[0].0, config_path);

        let dir_calls = mock_fs.get_directory_creation_calls();
        assert_eq!(dir_calls, vec![PathBuf::from("/test")]);
    }
}
