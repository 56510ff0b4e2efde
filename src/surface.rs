//! Playback surface abstraction.
//!
//! A surface renders one source at a time and reports what happens to it as
//! [`SurfaceEvent`]s. Every mutating call is fire-and-forget: results arrive
//! later as events, so nothing on the UI task blocks on the player.

use tokio::sync::mpsc;

/// MIME type of HLS manifests, used to probe native support.
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// Load generation of a surface. Every [`PlaybackSurface::stop`] starts a new one.
pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
  /// The surface started opening a new source.
  LoadStart,
  /// Enough of the source is decoded to start rendering.
  DataLoaded,
  /// The current source failed and will not recover on its own.
  Error(String),
  Play,
  Pause,
}

/// A surface event stamped with the generation of the source it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
  pub generation: Generation,
  pub event: SurfaceEvent,
}

/// Commands queued for the surface, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
  Load(String),
  Play,
  Pause,
  SetMuted(bool),
  SetVolume(f32),
  /// Halt the current source. Carries the generation that starts with it.
  Stop(Generation),
}

/// Cloneable write end of a surface's command queue.
///
/// Handed to an adaptive session on attach so it can feed renditions to the
/// surface. Commands from the handle and from the surface owner share one
/// queue, so their relative order is preserved.
#[derive(Debug, Clone)]
pub struct MediaHandle {
  tx: mpsc::UnboundedSender<MediaCommand>,
}

impl MediaHandle {
  pub fn new(tx: mpsc::UnboundedSender<MediaCommand>) -> Self {
    Self { tx }
  }

  /// Queue a command. A closed queue means the surface is gone; the command is dropped.
  pub fn send(&self, command: MediaCommand) {
    let _ = self.tx.send(command);
  }

  pub fn load(&self, url: &str) {
    self.send(MediaCommand::Load(url.to_string()));
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }
}

pub trait PlaybackSurface: Send {
  /// Set the source without loading it.
  fn set_source(&mut self, url: &str);
  /// Halt whatever is playing. Events still in flight for the halted source
  /// carry an older generation than the one returned.
  fn stop(&mut self) -> Generation;
  /// Start loading the current source.
  fn load(&mut self);
  /// Request playback. Failures arrive as [`SurfaceEvent::Error`].
  fn play(&mut self);
  fn pause(&mut self);
  fn paused(&self) -> bool;
  fn muted(&self) -> bool;
  fn set_muted(&mut self, muted: bool);
  /// Volume in `0.0..=1.0`.
  fn volume(&self) -> f32;
  fn set_volume(&mut self, volume: f32);
  fn can_play_type(&self, mime: &str) -> bool;
  fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TaggedEvent>;
  /// Handle for an adaptive session to drive this surface.
  fn media(&self) -> MediaHandle;
}
