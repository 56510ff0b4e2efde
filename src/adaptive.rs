//! Adaptive-streaming engine abstraction.
//!
//! An engine resolves an adaptive manifest into something the playback
//! surface can render and keeps feeding it. Sessions report progress and
//! failures as [`AdaptiveEvent`]s; the owner decides how to react.

use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::surface::MediaHandle;

/// Session tuning, read from `constants.ron`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AdaptiveConfig {
  /// When false the engine reports itself unsupported.
  pub enabled: bool,
  pub manifest_loading_timeout_ms: u64,
  /// Manifest fetch retries per load, and in-place recoveries per session.
  pub manifest_loading_max_retry: u32,
  pub level_loading_timeout_ms: u64,
  /// Upper bound on the chosen variant's bandwidth (bits/s). `None` picks the best.
  #[serde(default)]
  pub max_bitrate: Option<u64>,
}

impl AdaptiveConfig {
  pub fn manifest_timeout(&self) -> Duration {
    Duration::from_millis(self.manifest_loading_timeout_ms)
  }

  pub fn level_timeout(&self) -> Duration {
    Duration::from_millis(self.level_loading_timeout_ms)
  }
}

/// Error class reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveErrorKind {
  /// Transport failure; recoverable by reloading.
  Network,
  /// Decode failure; recoverable by re-attaching the rendition.
  Media,
  /// Anything else, including exhausted recovery.
  Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptiveError {
  pub kind: AdaptiveErrorKind,
  /// Non-fatal errors are handled inside the engine.
  pub fatal: bool,
  /// Sub-classification, e.g. `manifestLoadTimeOut`.
  pub details: String,
}

impl AdaptiveError {
  pub fn fatal(kind: AdaptiveErrorKind, details: impl Into<String>) -> Self {
    Self { kind, fatal: true, details: details.into() }
  }

  #[cfg(test)]
  pub fn non_fatal(kind: AdaptiveErrorKind, details: impl Into<String>) -> Self {
    Self { kind, fatal: false, details: details.into() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
  pub url: String,
  pub bandwidth: u64,
  pub resolution: Option<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptiveEvent {
  /// Manifest resolved; `levels` lists the renditions, best first.
  ManifestParsed { levels: Vec<Level> },
  Error(AdaptiveError),
}

pub trait AdaptiveSession: Send {
  fn load_source(&mut self, url: &str);
  fn attach_media(&mut self, media: MediaHandle);
  fn subscribe(&mut self) -> mpsc::UnboundedReceiver<AdaptiveEvent>;
  /// Restart loading after a network failure.
  fn start_load(&mut self);
  /// Re-attach the current rendition after a decode failure.
  fn recover_media_error(&mut self);
  /// Stop all work and detach from the media. The session is unusable afterwards.
  fn destroy(&mut self);
}

pub trait AdaptiveEngine: Send {
  fn is_supported(&self) -> bool;
  fn create(&self, config: &AdaptiveConfig) -> Box<dyn AdaptiveSession>;
}
