use anyhow::Result;
use image::DynamicImage;
use ratatui::widgets::ListState;
use reqwest::Client;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::constants;
use crate::display::DisplayMode;
use crate::error::PlayerError;
use crate::fetch::{fetch_logo, fetch_playlist};
use crate::player::{Player, PlayerNotice};
use crate::theme::{THEMES, theme_index};

// --- Types ---

pub type PlaylistResult = (String, Result<String, PlayerError>);
pub type LogoResult = (String, Result<DynamicImage>);

pub const PLAYLIST_LOADING: &str = "Loading playlist... Please wait";
pub const PLAYLIST_FAILED: &str = "Failed to load playlist. Please check the URL and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Channel list and playback keys.
  Browse,
  /// Typing into the channel search box.
  Search,
  /// Typing a playlist URL to load.
  PlaylistUrl,
}

/// Single-line text field with a char-indexed cursor.
#[derive(Debug, Default, Clone)]
pub struct TextInput {
  pub text: String,
  /// Cursor position in chars, not bytes.
  pub cursor: usize,
  /// Horizontal scroll offset in display columns.
  pub scroll: usize,
}

impl TextInput {
  pub fn with_text(text: &str) -> Self {
    Self { text: text.to_string(), cursor: text.chars().count(), scroll: 0 }
  }

  pub fn clear(&mut self) {
    self.text.clear();
    self.cursor = 0;
    self.scroll = 0;
  }

  pub fn char_count(&self) -> usize {
    self.text.chars().count()
  }
}

/// Channel logo state for the now-playing panel.
#[derive(Default)]
pub struct LogoCache {
  /// Decoded logo, keyed by URL.
  pub image: Option<(String, DynamicImage)>,
  /// Logo resized for the last panel size.
  pub resized: Option<(String, u16, u16, DynamicImage)>,
  /// URL whose fetch failed; the initial is shown instead.
  pub failed: Option<String>,
}

/// In-flight async task receivers.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) playlist_rx: Option<oneshot::Receiver<PlaylistResult>>,
  pub(crate) logo_rx: Option<oneshot::Receiver<LogoResult>>,
}

pub struct App {
  pub player: Player,
  pub mode: AppMode,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  /// Cursor in the channel list; playback follows it only on Enter.
  pub list_state: ListState,
  pub search: TextInput,
  pub playlist_input: TextInput,
  /// URL of the playlist currently loaded.
  pub playlist_url: Option<String>,
  pub sidebar_visible: bool,
  pub last_error: Option<String>,
  /// In-progress work, shown ahead of errors.
  pub status_message: Option<String>,
  /// Informational message, shown with an info icon and auto-dismissed.
  pub info_message: Option<String>,
  pub should_quit: bool,
  pub logo: LogoCache,
  /// App start instant, drives the loading spinner.
  pub started_at: Instant,
  pub(crate) tasks: AsyncTasks,
  http: Client,
  prefs_path: Option<PathBuf>,
  error_time: Option<Instant>,
  info_time: Option<Instant>,
}

impl App {
  pub fn new(
    mut player: Player,
    http: Client,
    config: &Config,
    display_mode: DisplayMode,
    prefs_path: Option<PathBuf>,
  ) -> Self {
    let c = constants();
    player.set_volume(config.volume.unwrap_or(c.default_volume));
    player.set_muted(config.muted);

    let default_url = config.playlist_url.clone().unwrap_or_else(|| c.default_playlist_url.clone());

    Self {
      player,
      mode: AppMode::Browse,
      theme_index: theme_index(config.theme_name.as_deref()),
      display_mode,
      list_state: ListState::default(),
      search: TextInput::default(),
      playlist_input: TextInput::with_text(&default_url),
      playlist_url: None,
      sidebar_visible: config.sidebar_visible(),
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      logo: LogoCache::default(),
      started_at: Instant::now(),
      tasks: AsyncTasks::default(),
      http,
      prefs_path,
      error_time: None,
      info_time: None,
    }
  }

  pub fn theme(&self) -> &'static crate::theme::Theme {
    // Safety: theme_index comes from theme_index() or modular arithmetic in next_theme().
    &THEMES[self.theme_index]
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  pub fn set_info(&mut self, msg: String) {
    self.info_message = Some(msg);
    self.info_time = Some(Instant::now());
  }

  /// Drop errors and info messages that have been shown long enough.
  pub fn expire_messages(&mut self, now: Instant) {
    let c = constants();
    if let Some(t) = self.error_time
      && now.duration_since(t) >= Duration::from_secs(c.error_dismiss_secs)
    {
      self.clear_error();
    }
    if let Some(t) = self.info_time
      && now.duration_since(t) >= Duration::from_secs(c.notice_dismiss_secs)
    {
      self.info_message = None;
      self.info_time = None;
    }
  }

  pub fn save_config(&self) {
    let Some(path) = &self.prefs_path else { return };
    let config = Config {
      theme_name: Some(self.theme().name.to_string()),
      playlist_url: self.playlist_url.clone(),
      volume: Some(self.player.volume()),
      muted: self.player.muted(),
      sidebar_visible: Some(self.sidebar_visible),
      display_mode: Some(self.display_mode.key().to_string()),
    };
    config.save_to(path);
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    self.save_config();
  }

  pub fn toggle_display_mode(&mut self) {
    self.display_mode = self.display_mode.toggle();
    self.logo.resized = None;
    self.save_config();
  }

  pub fn toggle_sidebar(&mut self) {
    self.sidebar_visible = !self.sidebar_visible;
    self.save_config();
  }

  // --- Playlist ---

  pub fn trigger_playlist_load(&mut self) {
    let url = self.playlist_input.text.trim().to_string();
    if url.is_empty() {
      self.set_error("Enter a playlist URL.".to_string());
      return;
    }
    self.clear_error();
    self.info_message = None;
    self.status_message = Some(PLAYLIST_LOADING.to_string());
    info!(url = %url, "loading playlist");

    let client = self.http.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = fetch_playlist(&client, &url).await;
      let _ = tx.send((url, result));
    });
    // A newer request replaces the older one; its result is dropped.
    self.tasks.playlist_rx = Some(rx);
  }

  fn on_playlist_loaded(&mut self, url: String, result: Result<String, PlayerError>) {
    self.status_message = None;
    match result.and_then(|text| self.player.load_playlist(&text)) {
      Ok(count) => {
        self.playlist_url = Some(url);
        self.list_state.select((count > 0).then_some(0));
        self.set_info(format!("Successfully loaded {} channels!", count));
        self.save_config();
      }
      Err(e) => {
        warn!(url = %url, err = %e, "playlist load failed");
        self.set_error(PLAYLIST_FAILED.to_string());
      }
    }
  }

  // --- Channels ---

  /// Re-run the search and keep the list cursor inside the new view.
  pub fn apply_search(&mut self) {
    let query = self.search.text.clone();
    self.player.search(&query);
    let len = self.player.directory().filtered_len();
    if len == 0 {
      self.list_state.select(None);
    } else {
      let sel = self.list_state.selected().unwrap_or(0);
      self.list_state.select(Some(sel.min(len - 1)));
    }
  }

  pub fn clear_search(&mut self) {
    self.search.clear();
    self.apply_search();
  }

  pub fn move_cursor(&mut self, down: bool) {
    let count = self.player.directory().filtered_len();
    if count == 0 {
      return;
    }
    let i = match (self.list_state.selected(), down) {
      (None, _) => 0,
      (Some(i), true) => (i + 1).min(count - 1),
      (Some(i), false) => i.saturating_sub(1),
    };
    self.list_state.select(Some(i));
  }

  pub fn play_index(&mut self, index: usize) {
    match self.player.select(index as i64) {
      Ok(mode) => {
        debug!(index, mode = mode.label(), "channel selected");
        self.clear_error();
        self.after_activation();
      }
      Err(e) => self.set_error(e.to_string()),
    }
  }

  pub fn play_cursor(&mut self) {
    if let Some(index) = self.list_state.selected() {
      self.play_index(index);
    }
  }

  pub fn play_next(&mut self) {
    if self.player.directory().selected().is_none() {
      self.play_index(0);
    } else if self.player.next_channel().is_some() {
      self.after_activation();
    }
  }

  pub fn play_previous(&mut self) {
    if self.player.previous_channel().is_some() {
      self.after_activation();
    }
  }

  fn after_activation(&mut self) {
    if let Some(selected) = self.player.directory().selected() {
      self.list_state.select(Some(selected));
    }
    self.trigger_logo();
  }

  // --- Playback ---

  pub fn toggle_pause(&mut self) {
    self.player.toggle_pause();
  }

  pub fn toggle_mute(&mut self) {
    self.player.toggle_mute();
    self.save_config();
  }

  pub fn change_volume(&mut self, delta: i16) {
    let volume = (i16::from(self.player.volume()) + delta).clamp(0, 100);
    self.player.set_volume(volume as u8);
    self.save_config();
  }

  /// Drain playback events into messages and follow auto-advances.
  pub fn poll_player(&mut self, now: Instant) {
    for notice in self.player.poll(now) {
      match notice {
        PlayerNotice::Failed(e) => self.set_error(e.to_string()),
        PlayerNotice::Advanced(index) => {
          info!(index, "advanced after failure");
          self.after_activation();
        }
        PlayerNotice::Recovering(kind) => debug!(?kind, "stream recovering"),
        PlayerNotice::Loaded => self.clear_error(),
        PlayerNotice::Loading => {}
      }
    }
  }

  // --- Logo ---

  fn trigger_logo(&mut self) {
    let Some(url) = self.player.current().map(|c| c.logo.clone()) else { return };
    if url.is_empty()
      || self.logo.failed.as_deref() == Some(url.as_str())
      || self.logo.image.as_ref().is_some_and(|(u, _)| *u == url)
    {
      return;
    }
    let client = self.http.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = fetch_logo(&client, &url).await;
      let _ = tx.send((url, result));
    });
    self.tasks.logo_rx = Some(rx);
  }

  /// Logo for the channel being played, if it has been fetched.
  pub fn current_logo(&self) -> Option<&(String, DynamicImage)> {
    let current = self.player.current()?;
    self.logo.image.as_ref().filter(|(url, _)| *url == current.logo)
  }

  // --- Background tasks ---

  pub fn check_pending(&mut self) {
    if let Some(mut rx) = self.tasks.playlist_rx.take() {
      match rx.try_recv() {
        Ok((url, result)) => self.on_playlist_loaded(url, result),
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.playlist_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error(PLAYLIST_FAILED.to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.logo_rx.take() {
      match rx.try_recv() {
        Ok((url, Ok(image))) => {
          self.logo.image = Some((url, image));
          self.logo.resized = None;
        }
        Ok((url, Err(e))) => {
          debug!(url = %url, err = format!("{:#}", e), "logo unavailable");
          self.logo.failed = Some(url);
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.logo_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {}
      }
    }
  }
}
