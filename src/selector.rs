//! Stream selection and per-activation playback state.
//!
//! The selector exclusively owns the playback surface and at most one
//! adaptive session. Each call to [`StreamSelector::activate`] starts a new
//! activation: the previous session is destroyed and the surface stopped
//! first, then the channel is attached through one of three pathways. Surface
//! events from a generation older than the last stop are ignored. Failures schedule an auto-advance
//! keyed to the activation they belong to, so a newer activation makes the
//! pending advance stale.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adaptive::{AdaptiveConfig, AdaptiveEngine, AdaptiveErrorKind, AdaptiveEvent, AdaptiveSession};
use crate::error::PlayerError;
use crate::events::drain;
use crate::playlist::Channel;
use crate::surface::{Generation, HLS_MIME, PlaybackSurface, SurfaceEvent, TaggedEvent};

const ADAPTIVE_MANIFEST_MARKER: &str = ".m3u8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
  /// In-process adaptive engine feeding the surface.
  AdaptiveLibrary,
  /// The surface plays the HLS manifest itself.
  NativePlatform,
  /// The URL is handed to the surface as-is.
  DirectElement,
}

impl PlaybackMode {
  pub fn label(self) -> &'static str {
    match self {
      PlaybackMode::AdaptiveLibrary => "adaptive",
      PlaybackMode::NativePlatform => "native",
      PlaybackMode::DirectElement => "direct",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
  #[default]
  Idle,
  Loading,
  Playing,
  Failed,
}

/// Monotonic id of a channel activation.
pub type ActivationId = u64;

/// Deferred advance to the next channel after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAdvance {
  pub activation: ActivationId,
  pub due: Instant,
}

/// What the UI needs to know after draining events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorNotice {
  Loading,
  Loaded,
  /// Recoverable adaptive error being retried in place.
  Recovering(AdaptiveErrorKind),
  Failed(PlayerError),
}

/// Choose a playback pathway for `url`.
pub fn choose_mode(url: &str, adaptive_supported: bool, native_hls: bool) -> PlaybackMode {
  if url.contains(ADAPTIVE_MANIFEST_MARKER) && adaptive_supported {
    PlaybackMode::AdaptiveLibrary
  } else if native_hls {
    PlaybackMode::NativePlatform
  } else {
    PlaybackMode::DirectElement
  }
}

pub struct StreamSelector {
  surface: Box<dyn PlaybackSurface>,
  surface_rx: mpsc::UnboundedReceiver<TaggedEvent>,
  /// Surface generation owned by the current activation.
  generation: Generation,
  engine: Box<dyn AdaptiveEngine>,
  config: AdaptiveConfig,
  session: Option<Box<dyn AdaptiveSession>>,
  session_rx: Option<mpsc::UnboundedReceiver<AdaptiveEvent>>,
  state: PlaybackState,
  mode: Option<PlaybackMode>,
  current: Option<Channel>,
  activation: ActivationId,
  pending_advance: Option<PendingAdvance>,
  advance_delay: Duration,
  /// Native and direct sources start playing once data is loaded.
  play_on_data: bool,
}

impl StreamSelector {
  pub fn new(
    mut surface: Box<dyn PlaybackSurface>,
    engine: Box<dyn AdaptiveEngine>,
    config: AdaptiveConfig,
    advance_delay: Duration,
  ) -> Self {
    let surface_rx = surface.subscribe();
    Self {
      surface,
      surface_rx,
      generation: 0,
      engine,
      config,
      session: None,
      session_rx: None,
      state: PlaybackState::Idle,
      mode: None,
      current: None,
      activation: 0,
      pending_advance: None,
      advance_delay,
      play_on_data: false,
    }
  }

  pub fn state(&self) -> PlaybackState {
    self.state
  }

  pub fn mode(&self) -> Option<PlaybackMode> {
    self.mode
  }

  pub fn current(&self) -> Option<&Channel> {
    self.current.as_ref()
  }

  #[cfg(test)]
  pub fn pending_advance(&self) -> Option<PendingAdvance> {
    self.pending_advance
  }

  #[cfg(test)]
  pub fn has_session(&self) -> bool {
    self.session.is_some()
  }

  pub fn surface(&self) -> &dyn PlaybackSurface {
    self.surface.as_ref()
  }

  /// Attach `channel` to the surface, replacing whatever was playing.
  pub fn activate(&mut self, channel: &Channel) -> PlaybackMode {
    self.cancel_advance();
    self.destroy_session();
    self.generation = self.surface.stop();

    self.activation += 1;
    self.current = Some(channel.clone());
    self.state = PlaybackState::Loading;
    self.play_on_data = false;

    let mode = choose_mode(&channel.url, self.engine.is_supported(), self.surface.can_play_type(HLS_MIME));
    info!(channel = %channel.name, url = %channel.url, mode = mode.label(), activation = self.activation, "activating channel");

    match mode {
      PlaybackMode::AdaptiveLibrary => {
        let mut session = self.engine.create(&self.config);
        self.session_rx = Some(session.subscribe());
        session.load_source(&channel.url);
        session.attach_media(self.surface.media());
        self.session = Some(session);
      }
      PlaybackMode::NativePlatform | PlaybackMode::DirectElement => {
        self.surface.set_source(&channel.url);
        self.surface.load();
        self.play_on_data = true;
      }
    }

    self.mode = Some(mode);
    mode
  }

  /// Drain surface and adaptive events, updating the state machine.
  pub fn poll(&mut self, now: Instant) -> Vec<SelectorNotice> {
    let mut notices = Vec::new();

    for TaggedEvent { generation, event } in drain(&mut self.surface_rx) {
      // Checked per event: a failure in this batch stops the surface again.
      if generation != self.generation {
        debug!(generation, current = self.generation, ?event, "dropping event from a stopped source");
        continue;
      }
      if let Some(notice) = self.on_surface_event(event, now) {
        notices.push(notice);
      }
    }

    let adaptive_events = self.session_rx.as_mut().map(drain).unwrap_or_default();
    for event in adaptive_events {
      // A failure earlier in this batch already tore the session down.
      if self.session.is_none() {
        break;
      }
      if let Some(notice) = self.on_adaptive_event(event, now) {
        notices.push(notice);
      }
    }

    notices
  }

  fn on_surface_event(&mut self, event: SurfaceEvent, now: Instant) -> Option<SelectorNotice> {
    match event {
      SurfaceEvent::LoadStart => {
        (self.state == PlaybackState::Loading).then_some(SelectorNotice::Loading)
      }
      SurfaceEvent::DataLoaded => {
        if self.state != PlaybackState::Loading {
          return None;
        }
        self.state = PlaybackState::Playing;
        if std::mem::take(&mut self.play_on_data) {
          self.surface.play();
        }
        Some(SelectorNotice::Loaded)
      }
      SurfaceEvent::Error(reason) => {
        if !matches!(self.state, PlaybackState::Loading | PlaybackState::Playing) {
          debug!(reason = %reason, "surface error outside an activation, ignoring");
          return None;
        }
        warn!(reason = %reason, "playback surface error");
        Some(SelectorNotice::Failed(self.fail(now)))
      }
      SurfaceEvent::Play | SurfaceEvent::Pause => None,
    }
  }

  fn on_adaptive_event(&mut self, event: AdaptiveEvent, now: Instant) -> Option<SelectorNotice> {
    match event {
      AdaptiveEvent::ManifestParsed { levels } => {
        info!(levels = levels.len(), "adaptive manifest parsed");
        self.surface.play();
        None
      }
      AdaptiveEvent::Error(err) if !err.fatal => {
        debug!(kind = ?err.kind, details = %err.details, "non-fatal adaptive error");
        None
      }
      AdaptiveEvent::Error(err) => match err.kind {
        AdaptiveErrorKind::Network => {
          info!(details = %err.details, "network error, trying to recover");
          if let Some(session) = self.session.as_mut() {
            session.start_load();
          }
          Some(SelectorNotice::Recovering(err.kind))
        }
        AdaptiveErrorKind::Media => {
          info!(details = %err.details, "media error, trying to recover");
          if let Some(session) = self.session.as_mut() {
            session.recover_media_error();
          }
          Some(SelectorNotice::Recovering(err.kind))
        }
        AdaptiveErrorKind::Other => {
          warn!(details = %err.details, "unrecoverable adaptive error");
          Some(SelectorNotice::Failed(self.fail(now)))
        }
      },
    }
  }

  /// Tear down, enter `Failed` and schedule the auto-advance.
  fn fail(&mut self, now: Instant) -> PlayerError {
    self.destroy_session();
    self.generation = self.surface.stop();
    self.state = PlaybackState::Failed;
    self.play_on_data = false;
    self.pending_advance = Some(PendingAdvance { activation: self.activation, due: now + self.advance_delay });
    let channel = self.current.as_ref().map_or_else(|| "channel".to_string(), |c| c.name.clone());
    PlayerError::PlaybackFailed { channel }
  }

  /// Take the pending advance if it is due and still belongs to the current activation.
  pub fn take_due_advance(&mut self, now: Instant) -> Option<ActivationId> {
    let pending = self.pending_advance?;
    if now < pending.due {
      return None;
    }
    self.pending_advance = None;
    if pending.activation != self.activation || self.state != PlaybackState::Failed {
      debug!(activation = pending.activation, current = self.activation, "dropping stale auto-advance");
      return None;
    }
    Some(pending.activation)
  }

  pub fn cancel_advance(&mut self) {
    if let Some(pending) = self.pending_advance.take() {
      debug!(activation = pending.activation, "auto-advance cancelled");
    }
  }

  fn destroy_session(&mut self) {
    if let Some(mut session) = self.session.take() {
      session.destroy();
      debug!("adaptive session destroyed");
    }
    self.session_rx = None;
  }

  pub fn toggle_pause(&mut self) {
    if self.surface.paused() {
      self.surface.play();
    } else {
      self.surface.pause();
    }
  }

  pub fn set_muted(&mut self, muted: bool) {
    self.surface.set_muted(muted);
  }

  pub fn set_volume(&mut self, volume: f32) {
    self.surface.set_volume(volume.clamp(0.0, 1.0));
  }

  /// Release the session and forget any pending advance.
  pub fn stop(&mut self) {
    self.cancel_advance();
    self.destroy_session();
    self.generation = self.surface.stop();
    self.state = PlaybackState::Idle;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adaptive::fake::FakeEngine;
  use crate::adaptive::{AdaptiveError, Level};
  use crate::events::Emitter;
  use crate::surface::fake::{CallLog, FakeEvents, FakeSurface, entries, new_log};
  use std::sync::{Arc, Mutex as StdMutex};

  const DELAY: Duration = Duration::from_secs(3);

  struct Harness {
    selector: StreamSelector,
    log: CallLog,
    surface_events: FakeEvents,
    session_events: Arc<StdMutex<Option<Emitter<AdaptiveEvent>>>>,
  }

  impl Harness {
    fn new(adaptive: bool, native_hls: bool) -> Self {
      let log = new_log();
      let surface = FakeSurface::new(Arc::clone(&log), native_hls);
      let surface_events = surface.events.clone();
      let engine = FakeEngine::new(Arc::clone(&log), adaptive);
      let session_events = engine.session_events();
      let config = crate::constants::constants().adaptive.clone();
      let selector = StreamSelector::new(Box::new(surface), Box::new(engine), config, DELAY);
      Self { selector, log, surface_events, session_events }
    }

    fn emit_adaptive(&self, event: AdaptiveEvent) {
      if let Some(emitter) = self.session_events.lock().unwrap().as_ref() {
        emitter.emit(event);
      }
    }

    fn position(&self, call: &str) -> usize {
      entries(&self.log).iter().position(|c| c == call).unwrap_or_else(|| panic!("missing call {call}"))
    }
  }

  fn channel(name: &str, url: &str) -> Channel {
    Channel {
      name: name.to_string(),
      logo: String::new(),
      country: "Unknown".to_string(),
      id: String::new(),
      url: url.to_string(),
    }
  }

  // --- choose_mode ---

  #[test]
  fn mode_adaptive_needs_manifest_and_support() {
    assert_eq!(choose_mode("http://h/a.m3u8", true, true), PlaybackMode::AdaptiveLibrary);
    assert_eq!(choose_mode("http://h/a.m3u8", false, true), PlaybackMode::NativePlatform);
    assert_eq!(choose_mode("http://h/a.mp4", true, true), PlaybackMode::NativePlatform);
  }

  #[test]
  fn mode_falls_back_to_direct() {
    assert_eq!(choose_mode("http://h/a.m3u8", false, false), PlaybackMode::DirectElement);
    assert_eq!(choose_mode("http://h/live.ts", true, false), PlaybackMode::DirectElement);
  }

  // --- activation ---

  #[test]
  fn adaptive_activation_loads_then_attaches() {
    let mut h = Harness::new(true, true);
    let mode = h.selector.activate(&channel("A", "http://h/a.m3u8"));
    assert_eq!(mode, PlaybackMode::AdaptiveLibrary);
    assert_eq!(h.selector.state(), PlaybackState::Loading);
    assert_eq!(
      entries(&h.log),
      vec!["surface.stop", "engine.create #1", "session#1.load_source http://h/a.m3u8", "session#1.attach_media"]
    );
  }

  #[test]
  fn native_activation_sets_source_and_plays_on_data() {
    let mut h = Harness::new(false, true);
    assert_eq!(h.selector.activate(&channel("A", "http://h/a.m3u8")), PlaybackMode::NativePlatform);
    h.surface_events.emit(SurfaceEvent::LoadStart);
    h.surface_events.emit(SurfaceEvent::DataLoaded);
    let notices = h.selector.poll(Instant::now());
    assert_eq!(notices, vec![SelectorNotice::Loading, SelectorNotice::Loaded]);
    assert_eq!(h.selector.state(), PlaybackState::Playing);
    assert_eq!(
      entries(&h.log),
      vec!["surface.stop", "surface.set_source http://h/a.m3u8", "surface.load", "surface.play"]
    );
  }

  #[test]
  fn switching_stops_old_source_before_new_attach() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("Old", "http://h/old/live.mp4"));
    h.selector.activate(&channel("New", "http://h/new.m3u8"));
    let calls = entries(&h.log);
    assert_eq!(calls.iter().filter(|c| *c == "surface.stop").count(), 2);
    assert_eq!(calls.iter().rposition(|c| c == "surface.stop"), Some(calls.len() - 4));
    assert!(h.position("surface.set_source http://h/old/live.mp4") < h.position("session#1.attach_media"));
  }

  #[test]
  fn late_error_from_previous_source_is_ignored() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("Old", "http://h/old/live.mp4"));
    h.surface_events.emit(SurfaceEvent::DataLoaded);
    h.selector.poll(Instant::now());
    let old = h.surface_events.generation();

    h.selector.activate(&channel("New", "http://h/new.m3u8"));
    h.surface_events.emit_for(old, SurfaceEvent::Error("old stream dropped".to_string()));
    assert!(h.selector.poll(Instant::now()).is_empty());
    assert_eq!(h.selector.state(), PlaybackState::Loading);
    assert!(h.selector.has_session());
    assert_eq!(h.selector.pending_advance(), None);
  }

  #[test]
  fn prior_session_destroyed_before_next_attach() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    h.selector.activate(&channel("B", "http://h/b.m3u8"));
    assert!(h.position("session#1.destroy") < h.position("session#2.attach_media"));
    assert!(h.position("session#1.destroy") < h.position("engine.create #2"));
  }

  #[test]
  fn prior_session_destroyed_when_switching_to_direct() {
    let mut h = Harness::new(true, false);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    assert_eq!(h.selector.activate(&channel("B", "http://h/b.mp4")), PlaybackMode::DirectElement);
    assert!(!h.selector.has_session());
    assert!(h.position("session#1.destroy") < h.position("surface.set_source http://h/b.mp4"));
  }

  #[test]
  fn manifest_parsed_starts_playback() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    h.emit_adaptive(AdaptiveEvent::ManifestParsed {
      levels: vec![Level { url: "http://h/720.m3u8".to_string(), bandwidth: 2_000_000, resolution: None }],
    });
    h.selector.poll(Instant::now());
    assert!(entries(&h.log).contains(&"surface.play".to_string()));
  }

  // --- failures ---

  #[test]
  fn surface_error_fails_and_schedules_advance() {
    let mut h = Harness::new(false, true);
    h.selector.activate(&channel("News", "http://h/live"));
    let now = Instant::now();
    h.surface_events.emit(SurfaceEvent::Error("loading failed".to_string()));
    let notices = h.selector.poll(now);
    assert_eq!(notices, vec![SelectorNotice::Failed(PlayerError::PlaybackFailed { channel: "News".to_string() })]);
    assert_eq!(h.selector.state(), PlaybackState::Failed);
    assert_eq!(h.selector.pending_advance(), Some(PendingAdvance { activation: 1, due: now + DELAY }));
  }

  #[test]
  fn failure_stops_surface() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    let now = Instant::now();
    h.emit_adaptive(AdaptiveEvent::Error(AdaptiveError::fatal(AdaptiveErrorKind::Other, "manifestParsingError")));
    h.selector.poll(now);
    assert!(h.position("session#1.destroy") < entries(&h.log).iter().rposition(|c| c == "surface.stop").unwrap());
    assert_eq!(h.surface_events.generation(), 2);
  }

  #[test]
  fn advance_not_due_before_delay() {
    let mut h = Harness::new(false, true);
    h.selector.activate(&channel("News", "http://h/live"));
    let now = Instant::now();
    h.surface_events.emit(SurfaceEvent::Error("boom".to_string()));
    h.selector.poll(now);
    assert_eq!(h.selector.take_due_advance(now + Duration::from_millis(2999)), None);
    assert_eq!(h.selector.take_due_advance(now + DELAY), Some(1));
    assert_eq!(h.selector.take_due_advance(now + DELAY), None);
  }

  #[test]
  fn new_activation_cancels_pending_advance() {
    let mut h = Harness::new(false, true);
    h.selector.activate(&channel("A", "http://h/a/live"));
    let now = Instant::now();
    h.surface_events.emit(SurfaceEvent::Error("boom".to_string()));
    h.selector.poll(now);
    h.selector.activate(&channel("B", "http://h/b/live"));
    assert_eq!(h.selector.pending_advance(), None);
    assert_eq!(h.selector.take_due_advance(now + DELAY * 2), None);
    assert_eq!(h.selector.state(), PlaybackState::Loading);
  }

  #[test]
  fn stale_advance_from_old_activation_is_dropped() {
    let mut h = Harness::new(false, true);
    h.selector.activate(&channel("A", "http://h/a/live"));
    let now = Instant::now();
    h.surface_events.emit(SurfaceEvent::Error("boom".to_string()));
    h.selector.poll(now);
    // Bypass the explicit cancel to exercise the activation guard.
    let stale = h.selector.pending_advance();
    h.selector.activate(&channel("B", "http://h/b/live"));
    h.selector.pending_advance = stale;
    assert_eq!(h.selector.take_due_advance(now + DELAY), None);
    assert_eq!(h.selector.pending_advance(), None);
  }

  #[test]
  fn surface_error_when_idle_is_ignored() {
    let mut h = Harness::new(false, true);
    h.surface_events.emit(SurfaceEvent::Error("late".to_string()));
    assert!(h.selector.poll(Instant::now()).is_empty());
    assert_eq!(h.selector.pending_advance(), None);
  }

  #[test]
  fn queued_events_from_previous_source_are_discarded() {
    let mut h = Harness::new(false, true);
    h.selector.activate(&channel("A", "http://h/a/live"));
    h.surface_events.emit(SurfaceEvent::Error("old source".to_string()));
    h.selector.activate(&channel("B", "http://h/b/live"));
    assert!(h.selector.poll(Instant::now()).is_empty());
    assert_eq!(h.selector.state(), PlaybackState::Loading);
  }

  #[test]
  fn fatal_network_error_recovers_in_place() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    h.emit_adaptive(AdaptiveEvent::Error(AdaptiveError::fatal(AdaptiveErrorKind::Network, "manifestLoadError")));
    let notices = h.selector.poll(Instant::now());
    assert_eq!(notices, vec![SelectorNotice::Recovering(AdaptiveErrorKind::Network)]);
    assert!(h.selector.has_session());
    assert_eq!(h.selector.state(), PlaybackState::Loading);
    assert!(entries(&h.log).contains(&"session#1.start_load".to_string()));
  }

  #[test]
  fn fatal_media_error_recovers_in_place() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    h.emit_adaptive(AdaptiveEvent::Error(AdaptiveError::fatal(AdaptiveErrorKind::Media, "bufferAppendError")));
    h.selector.poll(Instant::now());
    assert!(entries(&h.log).contains(&"session#1.recover_media_error".to_string()));
    assert_eq!(h.selector.pending_advance(), None);
  }

  #[test]
  fn non_fatal_adaptive_error_is_only_logged() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    h.emit_adaptive(AdaptiveEvent::Error(AdaptiveError::non_fatal(AdaptiveErrorKind::Network, "fragLoadError")));
    assert!(h.selector.poll(Instant::now()).is_empty());
    assert_eq!(entries(&h.log).len(), 4);
  }

  #[test]
  fn fatal_other_error_tears_down_and_fails() {
    let mut h = Harness::new(true, true);
    h.selector.activate(&channel("A", "http://h/a.m3u8"));
    h.emit_adaptive(AdaptiveEvent::Error(AdaptiveError::fatal(AdaptiveErrorKind::Other, "manifestParsingError")));
    let notices = h.selector.poll(Instant::now());
    assert!(matches!(notices.as_slice(), [SelectorNotice::Failed(PlayerError::PlaybackFailed { .. })]));
    assert!(!h.selector.has_session());
    assert!(entries(&h.log).contains(&"session#1.destroy".to_string()));
  }

  // --- controls ---

  #[test]
  fn toggle_pause_follows_surface_state() {
    let mut h = Harness::new(false, true);
    h.selector.toggle_pause();
    h.selector.toggle_pause();
    assert_eq!(entries(&h.log), vec!["surface.play", "surface.pause"]);
  }

  #[test]
  fn volume_is_clamped() {
    let mut h = Harness::new(false, true);
    h.selector.set_volume(1.7);
    assert_eq!(h.selector.surface().volume(), 1.0);
    assert_eq!(entries(&h.log), vec!["surface.set_volume 1.00"]);
  }
}
