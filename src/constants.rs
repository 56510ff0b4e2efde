//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available.
//! No runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

use crate::adaptive::AdaptiveConfig;

/// One fallback hop for playlist fetching when the direct request fails.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum ProxyRoute {
  /// `base?param=<url-encoded playlist url>`
  Query { base: String, param: String },
  /// `<prefix><playlist url>` verbatim.
  Prefix(String),
}

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub default_playlist_url: String,

  // Channel directory
  pub channel_cap: usize,

  // Playback
  pub auto_advance_ms: u64,
  pub error_dismiss_secs: u64,
  pub notice_dismiss_secs: u64,
  pub default_volume: u8,

  // Playlist fetch
  pub fetch_timeout_secs: u64,
  pub fetch_proxies: Vec<ProxyRoute>,

  // mpv
  pub mpv_connect_attempts: u32,
  pub mpv_connect_interval_ms: u64,

  // HLS engine
  pub adaptive: AdaptiveConfig,
}

impl Constants {
  pub fn auto_advance_delay(&self) -> Duration {
    Duration::from_millis(self.auto_advance_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
