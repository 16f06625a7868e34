//! Application configuration, loaded from a JSON file and flushed back on
//! every change (write-through, matching the original system's discipline of
//! never letting in-memory and on-disk config drift apart).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run_previously: bool,
    pub scans_output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            run_previously: false,
            scans_output_dir: PathBuf::from("./scans"),
        }
    }
}

/// A config bound to the file it was loaded from, so `set_*` helpers can
/// flush without the caller needing to remember the path.
pub struct ConfigHandle {
    pub config: Config,
    path: PathBuf,
}

impl ConfigHandle {
    /// Load `path`, creating it with defaults if it doesn't exist yet.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let config = Config::default();
            let handle = ConfigHandle { config, path };
            handle.flush()?;
            return Ok(handle);
        }

        let text = std::fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(ConfigHandle { config, path })
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(&self.path, text).with_context(|| format!("writing config {}", self.path.display()))?;
        Ok(())
    }

    pub fn set_run_previously(&mut self, value: bool) -> anyhow::Result<()> {
        self.config.run_previously = value;
        self.flush()
    }

    pub fn set_scans_output_dir(&mut self, dir: PathBuf) -> anyhow::Result<()> {
        self.config.scans_output_dir = dir;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_default_config_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let handle = ConfigHandle::load(&path).unwrap();
        assert!(!handle.config.run_previously);
        assert!(path.exists());
    }

    #[test]
    fn set_run_previously_flushes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut handle = ConfigHandle::load(&path).unwrap();
        handle.set_run_previously(true).unwrap();

        let reloaded = ConfigHandle::load(&path).unwrap();
        assert!(reloaded.config.run_previously);
    }
}
