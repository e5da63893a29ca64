use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::system::traits::{Clock, FileSystemInterface, PersistenceStore};

/// Production implementation of FileSystemInterface using std::fs
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFileSystem;

impl FileSystemInterface for StandardFileSystem {
    fn read_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))
    }

    /// Write to a sibling temp file and rename it over `path`, so readers
    /// see either the old content or the new, never a truncated file.
    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        temp.write_all(content.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        temp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace file: {}", path.display()))?;
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))
    }
}

/// Persistence store keeping one `<key>.json` file per key inside a directory
pub struct DirectoryStore<F: FileSystemInterface> {
    file_system: F,
    dir: PathBuf,
}

impl<F: FileSystemInterface> DirectoryStore<F> {
    pub fn new(file_system: F, dir: PathBuf) -> Self {
        Self { file_system, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl<F: FileSystemInterface> PersistenceStore for DirectoryStore<F> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !self.file_system.file_exists(&path) {
            debug!("No stored value for '{}' at {}", key, path.display());
            return Ok(None);
        }

        let content = self.file_system.read_file(&path)?;
        Ok(Some(content.into_bytes()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let content = std::str::from_utf8(value)
            .with_context(|| format!("Value for '{}' is not valid UTF-8", key))?;

        self.file_system.create_dir(&self.dir)?;
        self.file_system.write_file(&self.path_for(key), content)
    }
}

impl DirectoryStore<StandardFileSystem> {
    pub fn new_production(dir: PathBuf) -> Self {
        Self::new(StandardFileSystem, dir)
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".local/share/audio-cascade"))
    }
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
