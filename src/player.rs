use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::adaptive::{AdaptiveConfig, AdaptiveEngine, AdaptiveErrorKind};
use crate::directory::{ChannelDirectory, ChannelRow};
use crate::error::PlayerError;
use crate::playlist::{Channel, parse_playlist};
use crate::selector::{PlaybackMode, PlaybackState, SelectorNotice, StreamSelector};
use crate::surface::PlaybackSurface;

/// What happened during a [`Player::poll`], for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerNotice {
  Loading,
  Loaded,
  Recovering(AdaptiveErrorKind),
  Failed(PlayerError),
  /// Auto-advance activated this index of the filtered view.
  Advanced(usize),
}

impl From<SelectorNotice> for PlayerNotice {
  fn from(notice: SelectorNotice) -> Self {
    match notice {
      SelectorNotice::Loading => PlayerNotice::Loading,
      SelectorNotice::Loaded => PlayerNotice::Loaded,
      SelectorNotice::Recovering(kind) => PlayerNotice::Recovering(kind),
      SelectorNotice::Failed(err) => PlayerNotice::Failed(err),
    }
  }
}

/// Application state: the channel directory and the stream selector.
pub struct Player {
  directory: ChannelDirectory,
  selector: StreamSelector,
  channel_cap: usize,
}

impl Player {
  pub fn new(
    surface: Box<dyn PlaybackSurface>,
    engine: Box<dyn AdaptiveEngine>,
    config: AdaptiveConfig,
    advance_delay: Duration,
    channel_cap: usize,
  ) -> Self {
    Self {
      directory: ChannelDirectory::new(),
      selector: StreamSelector::new(surface, engine, config, advance_delay),
      channel_cap,
    }
  }

  pub fn directory(&self) -> &ChannelDirectory {
    &self.directory
  }

  /// Parse and load playlist text. On error the current channels stay.
  pub fn load_playlist(&mut self, text: &str) -> Result<usize, PlayerError> {
    let channels = parse_playlist(text, self.channel_cap)?;
    let count = channels.len();
    // The old selection is meaningless against the new list.
    self.selector.cancel_advance();
    self.directory.load(channels);
    info!(count, "playlist loaded");
    Ok(count)
  }

  pub fn search(&mut self, query: &str) {
    self.directory.search(query);
    debug!(query, matches = self.directory.filtered_len(), "search");
  }

  pub fn rows(&self) -> Vec<ChannelRow> {
    self.directory.rows()
  }

  pub fn current(&self) -> Option<&Channel> {
    self.selector.current()
  }

  /// Select an entry of the filtered view and start playing it.
  pub fn select(&mut self, index: i64) -> Result<PlaybackMode, PlayerError> {
    let channel = self.directory.select(index)?.clone();
    Ok(self.selector.activate(&channel))
  }

  pub fn next_channel(&mut self) -> Option<PlaybackMode> {
    let next = self.directory.next_index()?;
    self.select(next as i64).ok()
  }

  pub fn previous_channel(&mut self) -> Option<PlaybackMode> {
    let previous = self.directory.previous_index()?;
    self.select(previous as i64).ok()
  }

  pub fn toggle_pause(&mut self) {
    if self.selector.current().is_some() {
      self.selector.toggle_pause();
    }
  }

  pub fn paused(&self) -> bool {
    self.selector.surface().paused()
  }

  pub fn muted(&self) -> bool {
    self.selector.surface().muted()
  }

  pub fn set_muted(&mut self, muted: bool) {
    if self.muted() != muted {
      self.selector.set_muted(muted);
    }
  }

  pub fn toggle_mute(&mut self) {
    let muted = !self.muted();
    self.selector.set_muted(muted);
  }

  /// Volume as a percentage, `0..=100`.
  pub fn volume(&self) -> u8 {
    (self.selector.surface().volume() * 100.0).round() as u8
  }

  pub fn set_volume(&mut self, percent: u8) {
    let percent = percent.min(100);
    if percent != self.volume() {
      self.selector.set_volume(f32::from(percent) / 100.0);
    }
  }

  pub fn state(&self) -> PlaybackState {
    self.selector.state()
  }

  pub fn mode(&self) -> Option<PlaybackMode> {
    self.selector.mode()
  }

  /// Drain playback events and fire a due auto-advance.
  pub fn poll(&mut self, now: Instant) -> Vec<PlayerNotice> {
    let mut notices: Vec<PlayerNotice> = self.selector.poll(now).into_iter().map(PlayerNotice::from).collect();

    if let Some(activation) = self.selector.take_due_advance(now) {
      match self.directory.next_index() {
        Some(next) => {
          info!(activation, next, "auto-advancing to next channel");
          if self.select(next as i64).is_ok() {
            notices.push(PlayerNotice::Advanced(next));
          }
        }
        None => info!(activation, "no channel to advance to"),
      }
    }

    notices
  }

  pub fn stop(&mut self) {
    self.selector.stop();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adaptive::fake::FakeEngine;
  use crate::surface::SurfaceEvent;
  use crate::surface::fake::{CallLog, FakeEvents, FakeSurface, entries, new_log};
  use std::sync::Arc;

  const DELAY: Duration = Duration::from_secs(3);

  const PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="one" group-title="SG",One
http://h/one/live.mp4
#EXTINF:-1 group-title="MY",Two
http://h/two/live.mp4
#EXTINF:-1 group-title="SG",Three
http://h/three/live.mp4
"#;

  fn player() -> (Player, CallLog, FakeEvents) {
    let log = new_log();
    let surface = FakeSurface::new(Arc::clone(&log), false);
    let events = surface.events.clone();
    let engine = FakeEngine::new(Arc::clone(&log), false);
    let config = crate::constants::constants().adaptive.clone();
    let mut player = Player::new(Box::new(surface), Box::new(engine), config, DELAY, 100);
    player.load_playlist(PLAYLIST).unwrap();
    (player, log, events)
  }

  fn fail_current(player: &mut Player, events: &FakeEvents, now: Instant) -> Vec<PlayerNotice> {
    events.emit(SurfaceEvent::Error("boom".to_string()));
    player.poll(now)
  }

  // --- load_playlist ---

  #[test]
  fn load_counts_channels() {
    let (player, _, _) = player();
    assert_eq!(player.directory().len(), 3);
    assert_eq!(player.rows()[1].country, "MY");
  }

  #[test]
  fn failed_load_keeps_directory() {
    let (mut player, _, _) = player();
    assert_eq!(player.load_playlist("not a playlist"), Err(PlayerError::PlaylistFormatInvalid));
    assert_eq!(player.load_playlist("#EXTM3U\n"), Err(PlayerError::PlaylistEmpty));
    assert_eq!(player.directory().len(), 3);
  }

  #[test]
  fn load_respects_cap() {
    let log = new_log();
    let surface = FakeSurface::new(Arc::clone(&log), false);
    let engine = FakeEngine::new(log, false);
    let config = crate::constants::constants().adaptive.clone();
    let mut player = Player::new(Box::new(surface), Box::new(engine), config, DELAY, 2);
    assert_eq!(player.load_playlist(PLAYLIST), Ok(2));
  }

  // --- select / navigation ---

  #[test]
  fn select_activates_filtered_entry() {
    let (mut player, log, _) = player();
    player.search("sg");
    assert_eq!(player.select(1), Ok(PlaybackMode::DirectElement));
    assert_eq!(player.current().map(|c| c.name.as_str()), Some("Three"));
    assert!(entries(&log).contains(&"surface.set_source http://h/three/live.mp4".to_string()));
  }

  #[test]
  fn invalid_select_keeps_state() {
    let (mut player, _, _) = player();
    player.select(0).unwrap();
    assert_eq!(player.select(-1), Err(PlayerError::InvalidSelection { index: -1, len: 3 }));
    assert_eq!(player.select(3), Err(PlayerError::InvalidSelection { index: 3, len: 3 }));
    assert_eq!(player.directory().selected(), Some(0));
  }

  #[test]
  fn next_and_previous_stop_at_ends() {
    let (mut player, _, _) = player();
    assert_eq!(player.next_channel(), None);
    player.select(0).unwrap();
    assert_eq!(player.previous_channel(), None);
    player.next_channel();
    player.next_channel();
    assert_eq!(player.directory().selected(), Some(2));
    assert_eq!(player.next_channel(), None);
    player.previous_channel();
    assert_eq!(player.directory().selected(), Some(1));
  }

  // --- volume / mute ---

  #[test]
  fn volume_is_clamped_and_idempotent() {
    let (mut player, log, _) = player();
    player.set_volume(40);
    player.set_volume(40);
    player.set_volume(250);
    assert_eq!(player.volume(), 100);
    let calls: Vec<_> = entries(&log).into_iter().filter(|c| c.starts_with("surface.set_volume")).collect();
    assert_eq!(calls, vec!["surface.set_volume 0.40", "surface.set_volume 1.00"]);
  }

  #[test]
  fn mute_toggles() {
    let (mut player, _, _) = player();
    player.toggle_mute();
    assert!(player.muted());
    player.set_muted(true);
    player.toggle_mute();
    assert!(!player.muted());
  }

  #[test]
  fn pause_without_channel_is_ignored() {
    let (mut player, log, _) = player();
    player.toggle_pause();
    assert!(entries(&log).is_empty());
  }

  // --- auto-advance ---

  #[test]
  fn failure_advances_to_next_after_delay() {
    let (mut player, _, events) = player();
    player.select(0).unwrap();
    let start = Instant::now();
    let notices = fail_current(&mut player, &events, start);
    assert!(matches!(notices.as_slice(), [PlayerNotice::Failed(PlayerError::PlaybackFailed { channel })] if channel == "One"));
    assert!(player.poll(start + Duration::from_secs(1)).is_empty());
    assert_eq!(player.poll(start + DELAY), vec![PlayerNotice::Advanced(1)]);
    assert_eq!(player.current().map(|c| c.name.as_str()), Some("Two"));
    assert_eq!(player.state(), PlaybackState::Loading);
  }

  #[test]
  fn failure_on_last_channel_stays_failed() {
    let (mut player, _, events) = player();
    player.select(2).unwrap();
    let start = Instant::now();
    fail_current(&mut player, &events, start);
    assert!(player.poll(start + DELAY).is_empty());
    assert_eq!(player.state(), PlaybackState::Failed);
    assert_eq!(player.directory().selected(), Some(2));
  }

  #[test]
  fn manual_select_cancels_pending_advance() {
    let (mut player, _, events) = player();
    player.select(0).unwrap();
    let start = Instant::now();
    fail_current(&mut player, &events, start);
    player.select(2).unwrap();
    assert!(player.poll(start + DELAY).is_empty());
    assert_eq!(player.current().map(|c| c.name.as_str()), Some("Three"));
  }

  #[test]
  fn advance_follows_current_view() {
    let (mut player, _, events) = player();
    player.search("sg");
    player.select(0).unwrap();
    let start = Instant::now();
    fail_current(&mut player, &events, start);
    assert_eq!(player.poll(start + DELAY), vec![PlayerNotice::Advanced(1)]);
    assert_eq!(player.current().map(|c| c.name.as_str()), Some("Three"));
  }
}
