use thiserror::Error;

/// Failures surfaced by the playlist and playback core.
///
/// Fetch, format and empty-playlist errors leave any previously loaded
/// directory intact; `InvalidSelection` leaves the selection unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
  #[error("Failed to fetch playlist from {url}: {reason}")]
  PlaylistFetchFailed { url: String, reason: String },

  #[error("Invalid M3U playlist format")]
  PlaylistFormatInvalid,

  #[error("No valid channels found in playlist")]
  PlaylistEmpty,

  #[error("Invalid channel selected (index {index}, {len} channels)")]
  InvalidSelection { index: i64, len: usize },

  #[error("Failed to load \"{channel}\". Stream may be offline or require different player.")]
  PlaybackFailed { channel: String },
}
