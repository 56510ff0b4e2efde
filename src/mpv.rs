//! mpv as the playback surface, driven over its JSON IPC socket.
//!
//! One idle mpv process lives for the whole session. Commands are queued on
//! an unbounded channel and written by a background task; a second task reads
//! IPC events and republishes them as [`SurfaceEvent`]s.
//!
//! Every `stop` goes out with the new generation as its `request_id`. mpv
//! answers commands in order with its events, so the reader stamps each event
//! with the last generation acknowledged before it.

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::{
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader},
  net::UnixStream,
  process::{Child as TokioChild, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::events::Emitter;
use crate::surface::{Generation, HLS_MIME, MediaCommand, MediaHandle, PlaybackSurface, SurfaceEvent, TaggedEvent};

const PAUSE_OBSERVER_ID: u64 = 1;

/// Serialize a queued command as one IPC line.
pub fn command_json(command: &MediaCommand) -> String {
  let line = match command {
    MediaCommand::Load(url) => json!({ "command": ["loadfile", url, "replace"] }),
    MediaCommand::Play => json!({ "command": ["set_property", "pause", false] }),
    MediaCommand::Pause => json!({ "command": ["set_property", "pause", true] }),
    MediaCommand::SetMuted(muted) => json!({ "command": ["set_property", "mute", muted] }),
    MediaCommand::SetVolume(volume) => json!({ "command": ["set_property", "volume", (volume * 100.0).round()] }),
    MediaCommand::Stop(generation) => json!({ "command": ["stop"], "request_id": generation }),
  };
  format!("{line}\n")
}

/// Generation acknowledged by a reply to a `stop`. Other replies carry `request_id` 0.
pub fn parse_fence(line: &str) -> Option<Generation> {
  let val: Value = serde_json::from_str(line).ok()?;
  if val.get("event").is_some() {
    return None;
  }
  val.get("request_id").and_then(Value::as_u64).filter(|&id| id > 0)
}

/// Map one IPC line to a surface event. Replies and unrelated events yield `None`.
pub fn parse_event(line: &str) -> Option<SurfaceEvent> {
  let val: Value = serde_json::from_str(line).ok()?;
  match val.get("event").and_then(Value::as_str)? {
    "start-file" => Some(SurfaceEvent::LoadStart),
    "file-loaded" => Some(SurfaceEvent::DataLoaded),
    "end-file" if val.get("reason").and_then(Value::as_str) == Some("error") => {
      let reason = val.get("file_error").and_then(Value::as_str).unwrap_or("playback error");
      Some(SurfaceEvent::Error(reason.to_string()))
    }
    "property-change" if val.get("name").and_then(Value::as_str) == Some("pause") => {
      match val.get("data").and_then(Value::as_bool)? {
        true => Some(SurfaceEvent::Pause),
        false => Some(SurfaceEvent::Play),
      }
    }
    _ => None,
  }
}

#[derive(Debug)]
struct MpvState {
  paused: bool,
}

/// The surface half handed to the selector.
pub struct MpvSurface {
  tx: mpsc::UnboundedSender<MediaCommand>,
  state: Arc<StdMutex<MpvState>>,
  events: Emitter<TaggedEvent>,
  generation: Generation,
  source: Option<String>,
  muted: bool,
  volume: f32,
  native_hls: bool,
}

/// The process half, kept by `main` for shutdown.
pub struct MpvProcess {
  child: Option<TokioChild>,
  events: Emitter<TaggedEvent>,
  socket_path: String,
  writer_handle: Option<JoinHandle<()>>,
  reader_handle: Option<JoinHandle<()>>,
}

impl MpvSurface {
  /// Start an idle mpv window and connect to its IPC socket.
  pub async fn spawn(native_hls: bool) -> Result<(Self, MpvProcess)> {
    let socket_path = std::env::temp_dir().join(format!("tvp-mpv-{}.sock", std::process::id()));
    let socket_path_str = socket_path.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let mut cmd = Command::new("mpv");
    cmd.args([
      "--idle=yes",
      "--force-window=immediate",
      "--keep-open=no",
      "--really-quiet",
      "--title=tvp",
      &format!("--input-ipc-server={}", socket_path_str),
    ]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("mpv not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)")
      } else {
        anyhow!(e).context("Failed to spawn mpv process")
      }
    })?;

    let stream = connect_ipc(&socket_path_str).await?;
    let (read_half, mut write_half) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<MediaCommand>();
    let state = Arc::new(StdMutex::new(MpvState { paused: false }));
    let events = Emitter::new();

    let observe = format!("{}\n", json!({ "command": ["observe_property", PAUSE_OBSERVER_ID, "pause"] }));
    write_half.write_all(observe.as_bytes()).await.context("Failed to send observe_property to mpv IPC")?;

    let writer_handle = tokio::spawn(async move {
      while let Some(command) = rx.recv().await {
        debug!(?command, "mpv command");
        if let Err(e) = write_half.write_all(command_json(&command).as_bytes()).await {
          warn!(err = %e, "mpv IPC write failed");
          break;
        }
      }
    });

    let reader_state = Arc::clone(&state);
    let reader_events = events.clone();
    let reader_handle = tokio::spawn(async move {
      let mut lines = TokioBufReader::new(read_half).lines();
      let mut generation: Generation = 0;
      while let Ok(Some(line)) = lines.next_line().await {
        if let Some(acked) = parse_fence(&line) {
          generation = generation.max(acked);
          continue;
        }
        let Some(event) = parse_event(&line) else { continue };
        if let Ok(mut s) = reader_state.lock() {
          match event {
            SurfaceEvent::Play => s.paused = false,
            SurfaceEvent::Pause => s.paused = true,
            _ => {}
          }
        }
        reader_events.emit(TaggedEvent { generation, event });
      }
      warn!("mpv IPC connection closed");
      reader_events.emit(TaggedEvent { generation, event: SurfaceEvent::Error("mpv exited".to_string()) });
    });

    info!(socket = %socket_path_str, "mpv started");
    let surface =
      Self { tx, state, events: events.clone(), generation: 0, source: None, muted: false, volume: 1.0, native_hls };
    let process = MpvProcess {
      child: Some(child),
      events,
      socket_path: socket_path_str,
      writer_handle: Some(writer_handle),
      reader_handle: Some(reader_handle),
    };
    Ok((surface, process))
  }

  fn send(&self, command: MediaCommand) {
    let _ = self.tx.send(command);
  }

  fn set_paused(&self, paused: bool) {
    if let Ok(mut s) = self.state.lock() {
      s.paused = paused;
    }
  }
}

impl MpvProcess {
  pub async fn shutdown(&mut self) -> Result<()> {
    if let Some(handle) = self.writer_handle.take() {
      handle.abort();
      let _ = handle.await;
    }
    if let Some(handle) = self.reader_handle.take() {
      handle.abort();
      let _ = handle.await;
    }
    self.events.clear();

    if let Some(mut child) = self.child.take() {
      child.kill().await.context("Failed to kill mpv process")?;
      let _ = child.wait().await;
    }

    let _ = std::fs::remove_file(&self.socket_path);
    info!("mpv stopped");
    Ok(())
  }
}

/// mpv creates the socket shortly after start; poll until it accepts.
async fn connect_ipc(socket_path: &str) -> Result<UnixStream> {
  let c = constants();
  let mut last_err = None;
  for attempt in 0..c.mpv_connect_attempts {
    match UnixStream::connect(socket_path).await {
      Ok(stream) => return Ok(stream),
      Err(e) => {
        debug!(attempt, err = %e, "mpv IPC not ready, retrying");
        last_err = Some(e);
        tokio::time::sleep(Duration::from_millis(c.mpv_connect_interval_ms)).await;
      }
    }
  }
  let err = last_err.map_or_else(|| anyhow!("no connection attempts configured"), anyhow::Error::from);
  Err(err.context("Failed to connect to mpv IPC socket"))
}

impl PlaybackSurface for MpvSurface {
  fn set_source(&mut self, url: &str) {
    self.source = Some(url.to_string());
  }

  fn stop(&mut self) -> Generation {
    self.generation += 1;
    self.source = None;
    self.send(MediaCommand::Stop(self.generation));
    self.generation
  }

  fn load(&mut self) {
    if let Some(url) = self.source.clone() {
      self.send(MediaCommand::Load(url));
    }
  }

  fn play(&mut self) {
    self.set_paused(false);
    self.send(MediaCommand::Play);
  }

  fn pause(&mut self) {
    self.set_paused(true);
    self.send(MediaCommand::Pause);
  }

  fn paused(&self) -> bool {
    self.state.lock().map(|s| s.paused).unwrap_or(false)
  }

  fn muted(&self) -> bool {
    self.muted
  }

  fn set_muted(&mut self, muted: bool) {
    self.muted = muted;
    self.send(MediaCommand::SetMuted(muted));
  }

  fn volume(&self) -> f32 {
    self.volume
  }

  fn set_volume(&mut self, volume: f32) {
    self.volume = volume.clamp(0.0, 1.0);
    self.send(MediaCommand::SetVolume(self.volume));
  }

  fn can_play_type(&self, mime: &str) -> bool {
    self.native_hls && (mime == HLS_MIME || mime.eq_ignore_ascii_case("application/x-mpegurl"))
  }

  fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TaggedEvent> {
    self.events.subscribe()
  }

  fn media(&self) -> MediaHandle {
    MediaHandle::new(self.tx.clone())
  }
}
