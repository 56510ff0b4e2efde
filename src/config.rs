use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// User preferences persisted to `prefs.toml`.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
  pub theme_name: Option<String>,
  /// Last playlist loaded successfully.
  pub playlist_url: Option<String>,
  /// Percent, `0..=100`.
  pub volume: Option<u8>,
  pub muted: bool,
  pub sidebar_visible: Option<bool>,
  pub display_mode: Option<String>,
}

pub fn prefs_path() -> Option<PathBuf> {
  ProjectDirs::from("", "", "tvp").map(|dirs| dirs.config_dir().join("prefs.toml"))
}

impl Config {
  pub fn load() -> Self {
    prefs_path().map(|path| Self::load_from(&path)).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Self {
    if let Ok(content) = std::fs::read_to_string(path) {
      match toml::from_str(&content) {
        Ok(config) => return config,
        Err(e) => warn!(path = %path.display(), err = %e, "ignoring unreadable prefs"),
      }
    }
    Self::default()
  }

  pub fn save_to(&self, path: &Path) {
    if let Some(dir) = path.parent()
      && std::fs::create_dir_all(dir).is_ok()
      && let Ok(content) = toml::to_string(self)
      && let Err(e) = std::fs::write(path, content)
    {
      warn!(path = %path.display(), err = %e, "failed to save prefs");
    }
  }

  pub fn sidebar_visible(&self) -> bool {
    self.sidebar_visible.unwrap_or(true)
  }
}
