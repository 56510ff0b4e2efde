//! In-process HLS engine.
//!
//! Resolves a manifest the way a browser-side adaptive library would before
//! handing media to the element: fetch the manifest (with timeout and
//! retries), pick a rendition from a master playlist, make sure the chosen
//! rendition loads, then feed it to the surface and report the level list.
//! Segment download and decoding stay with the surface.

use reqwest::{Client, Url};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adaptive::{
  AdaptiveConfig, AdaptiveEngine, AdaptiveError, AdaptiveErrorKind, AdaptiveEvent, AdaptiveSession, Level,
};
use crate::events::Emitter;
use crate::surface::MediaHandle;

pub struct HlsEngine {
  client: Client,
  enabled: bool,
}

impl HlsEngine {
  pub fn new(client: Client, enabled: bool) -> Self {
    Self { client, enabled }
  }
}

impl AdaptiveEngine for HlsEngine {
  fn is_supported(&self) -> bool {
    self.enabled
  }

  fn create(&self, config: &AdaptiveConfig) -> Box<dyn AdaptiveSession> {
    Box::new(HlsSession::new(self.client.clone(), config.clone()))
  }
}

pub struct HlsSession {
  client: Client,
  config: AdaptiveConfig,
  events: Emitter<AdaptiveEvent>,
  source: Option<String>,
  media: Option<MediaHandle>,
  /// Rendition currently fed to the media, set by the load task.
  level: Arc<StdMutex<Option<String>>>,
  task: Option<JoinHandle<()>>,
  recoveries: u32,
}

impl HlsSession {
  pub fn new(client: Client, config: AdaptiveConfig) -> Self {
    Self {
      client,
      config,
      events: Emitter::new(),
      source: None,
      media: None,
      level: Arc::new(StdMutex::new(None)),
      task: None,
      recoveries: 0,
    }
  }

  /// Loading begins once both a source and a media handle are present.
  fn maybe_start(&mut self) {
    if self.task.is_none() && self.source.is_some() && self.media.is_some() {
      self.spawn_load();
    }
  }

  fn spawn_load(&mut self) {
    self.abort_task();
    let (Some(source), Some(media)) = (self.source.clone(), self.media.clone()) else { return };
    let client = self.client.clone();
    let config = self.config.clone();
    let events = self.events.clone();
    let level = Arc::clone(&self.level);

    self.task = Some(tokio::spawn(async move {
      match resolve(&client, &config, &source).await {
        Ok(_) if media.is_closed() => debug!("media detached before manifest resolved"),
        Ok((levels, chosen)) => {
          info!(url = %chosen.url, bandwidth = chosen.bandwidth, "hls rendition selected");
          if let Ok(mut l) = level.lock() {
            *l = Some(chosen.url.clone());
          }
          media.load(&chosen.url);
          events.emit(AdaptiveEvent::ManifestParsed { levels });
        }
        Err(err) => {
          warn!(kind = ?err.kind, details = %err.details, "hls load failed");
          events.emit(AdaptiveEvent::Error(err));
        }
      }
    }));
  }

  fn abort_task(&mut self) {
    if let Some(handle) = self.task.take() {
      handle.abort();
    }
  }

  /// Count one in-place recovery; `false` once the budget is spent.
  fn take_recovery(&mut self, what: &str) -> bool {
    self.recoveries += 1;
    if self.recoveries > self.config.manifest_loading_max_retry {
      self.events.emit(AdaptiveEvent::Error(AdaptiveError::fatal(
        AdaptiveErrorKind::Other,
        format!("{what}RecoveryExhausted"),
      )));
      return false;
    }
    true
  }
}

impl AdaptiveSession for HlsSession {
  fn load_source(&mut self, url: &str) {
    self.source = Some(url.to_string());
    self.maybe_start();
  }

  fn attach_media(&mut self, media: MediaHandle) {
    self.media = Some(media);
    self.maybe_start();
  }

  fn subscribe(&mut self) -> mpsc::UnboundedReceiver<AdaptiveEvent> {
    self.events.subscribe()
  }

  fn start_load(&mut self) {
    if self.take_recovery("network") {
      debug!(attempt = self.recoveries, "hls reloading manifest");
      self.spawn_load();
    }
  }

  fn recover_media_error(&mut self) {
    if !self.take_recovery("media") {
      return;
    }
    let current = self.level.lock().ok().and_then(|l| l.clone());
    match (current, self.media.as_ref()) {
      (Some(url), Some(media)) => {
        debug!(url = %url, "hls re-attaching rendition");
        media.load(&url);
      }
      _ => self.spawn_load(),
    }
  }

  fn destroy(&mut self) {
    self.abort_task();
    self.events.clear();
    self.media = None;
    self.source = None;
  }
}

impl Drop for HlsSession {
  fn drop(&mut self) {
    self.abort_task();
  }
}

/// Fetch a playlist body, retrying `retries` extra times on failure.
async fn fetch_with_retry(
  client: &Client,
  url: &Url,
  timeout: Duration,
  retries: u32,
  what: &str,
) -> Result<Vec<u8>, AdaptiveError> {
  let mut last = AdaptiveError::fatal(AdaptiveErrorKind::Network, format!("{what}LoadError"));
  for attempt in 0..=retries {
    let request = async { client.get(url.clone()).send().await?.error_for_status()?.bytes().await };
    match tokio::time::timeout(timeout, request).await {
      Ok(Ok(bytes)) => return Ok(bytes.to_vec()),
      Ok(Err(e)) => {
        debug!(attempt, url = %url, err = %e, "hls fetch failed");
        last = AdaptiveError::fatal(AdaptiveErrorKind::Network, format!("{what}LoadError: {e}"));
      }
      Err(_) => {
        debug!(attempt, url = %url, "hls fetch timed out");
        last = AdaptiveError::fatal(AdaptiveErrorKind::Network, format!("{what}LoadTimeOut"));
      }
    }
  }
  Err(last)
}

/// Renditions of a master playlist, best first, with absolute URLs.
pub fn levels_from_master(base: &Url, master: &m3u8_rs::MasterPlaylist) -> Vec<Level> {
  let mut levels: Vec<Level> = master
    .variants
    .iter()
    .filter(|v| !v.is_i_frame)
    .filter_map(|v| {
      let url = base.join(&v.uri).ok()?;
      Some(Level {
        url: url.to_string(),
        bandwidth: v.bandwidth,
        resolution: v.resolution.map(|r| (r.width, r.height)),
      })
    })
    .collect();
  levels.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
  levels
}

/// Best level within `max_bitrate`, or the lowest one if none fits.
pub fn pick_level(levels: &[Level], max_bitrate: Option<u64>) -> Option<&Level> {
  match max_bitrate {
    None => levels.first(),
    Some(cap) => levels.iter().find(|l| l.bandwidth <= cap).or_else(|| levels.last()),
  }
}

fn check_media_playlist(body: &[u8], what: &str) -> Result<(), AdaptiveError> {
  match m3u8_rs::parse_playlist_res(body) {
    Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) if pl.segments.is_empty() && !pl.end_list => Ok(()),
    Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) if pl.segments.is_empty() => {
      Err(AdaptiveError::fatal(AdaptiveErrorKind::Media, format!("{what}EmptyError")))
    }
    Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => Ok(()),
    _ => Err(AdaptiveError::fatal(AdaptiveErrorKind::Media, format!("{what}ParsingError"))),
  }
}

/// Resolve `source` to its level list and the rendition to play.
pub(crate) async fn resolve(
  client: &Client,
  config: &AdaptiveConfig,
  source: &str,
) -> Result<(Vec<Level>, Level), AdaptiveError> {
  let base = Url::parse(source)
    .map_err(|e| AdaptiveError::fatal(AdaptiveErrorKind::Other, format!("manifestParsingError: {e}")))?;
  let body =
    fetch_with_retry(client, &base, config.manifest_timeout(), config.manifest_loading_max_retry, "manifest").await?;

  let master = match m3u8_rs::parse_playlist_res(&body) {
    Ok(m3u8_rs::Playlist::MasterPlaylist(pl)) => pl,
    Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => {
      // Single-rendition stream: the manifest is the media playlist.
      check_media_playlist(&body, "level")?;
      let level = Level { url: base.to_string(), bandwidth: 0, resolution: None };
      return Ok((vec![level.clone()], level));
    }
    Err(_) => return Err(AdaptiveError::fatal(AdaptiveErrorKind::Other, "manifestParsingError")),
  };

  let levels = levels_from_master(&base, &master);
  let chosen = pick_level(&levels, config.max_bitrate)
    .cloned()
    .ok_or_else(|| AdaptiveError::fatal(AdaptiveErrorKind::Other, "manifestIncompatibleCodecsError"))?;

  let level_url = Url::parse(&chosen.url)
    .map_err(|e| AdaptiveError::fatal(AdaptiveErrorKind::Other, format!("levelParsingError: {e}")))?;
  let level_body = fetch_with_retry(client, &level_url, config.level_timeout(), 0, "level").await?;
  check_media_playlist(&level_body, "level")?;

  Ok((levels, chosen))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::drain;
  use crate::surface::MediaCommand;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
mid/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
http://other.example/high/index.m3u8
";

  const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6.0,
seg0.ts
#EXTINF:6.0,
seg1.ts
";

  fn config(retries: u32) -> AdaptiveConfig {
    AdaptiveConfig {
      enabled: true,
      manifest_loading_timeout_ms: 2_000,
      manifest_loading_max_retry: retries,
      level_loading_timeout_ms: 2_000,
      max_bitrate: None,
    }
  }

  async fn serve(routes: Vec<(&'static str, &'static str)>) -> String {
    serve_after_failures(routes, 0).await
  }

  /// Serve fixed bodies by path over plain HTTP; unknown paths get 404, and
  /// so do the first `failures` requests.
  async fn serve_after_failures(routes: Vec<(&'static str, &'static str)>, failures: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
      loop {
        let Ok((mut socket, _)) = listener.accept().await else { break };
        let routes = routes.clone();
        let served = Arc::clone(&served);
        tokio::spawn(async move {
          let mut buf = vec![0u8; 4096];
          let n = socket.read(&mut buf).await.unwrap_or(0);
          let request = String::from_utf8_lossy(&buf[..n]);
          let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
          let failing = served.fetch_add(1, Ordering::SeqCst) < failures;
          let response = match routes.iter().find(|(p, _)| *p == path).filter(|_| !failing) {
            Some((_, body)) => {
              format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body)
            }
            None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
          };
          let _ = socket.write_all(response.as_bytes()).await;
        });
      }
    });
    format!("http://{}", addr)
  }

  fn levels() -> Vec<Level> {
    let base = Url::parse("http://cdn.example/live/master.m3u8").unwrap();
    match m3u8_rs::parse_playlist_res(MASTER.as_bytes()) {
      Ok(m3u8_rs::Playlist::MasterPlaylist(pl)) => levels_from_master(&base, &pl),
      _ => panic!("fixture is a master playlist"),
    }
  }

  // --- levels_from_master / pick_level ---

  #[test]
  fn levels_sorted_best_first_with_absolute_urls() {
    let levels = levels();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0].url, "http://other.example/high/index.m3u8");
    assert_eq!(levels[1].url, "http://cdn.example/live/mid/index.m3u8");
    assert_eq!(levels[2].resolution, Some((640, 360)));
  }

  #[test]
  fn pick_best_without_cap() {
    let levels = levels();
    assert_eq!(pick_level(&levels, None).map(|l| l.bandwidth), Some(5_000_000));
  }

  #[test]
  fn pick_respects_cap() {
    let levels = levels();
    assert_eq!(pick_level(&levels, Some(3_000_000)).map(|l| l.bandwidth), Some(2_800_000));
    assert_eq!(pick_level(&levels, Some(100)).map(|l| l.bandwidth), Some(800_000));
    assert_eq!(pick_level(&[], None), None);
  }

  #[test]
  fn media_playlist_checks() {
    assert!(check_media_playlist(MEDIA.as_bytes(), "level").is_ok());
    let ended_empty = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-ENDLIST\n";
    assert_eq!(
      check_media_playlist(ended_empty.as_bytes(), "level").unwrap_err().details,
      "levelEmptyError".to_string()
    );
    assert_eq!(check_media_playlist(MASTER.as_bytes(), "level").unwrap_err().kind, AdaptiveErrorKind::Media);
  }

  // --- resolve ---

  #[tokio::test]
  async fn resolve_master_picks_rendition() {
    let master = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\nhigh.m3u8\n";
    let base = serve(vec![("/master.m3u8", master), ("/high.m3u8", MEDIA), ("/low.m3u8", MEDIA)]).await;
    let (levels, chosen) = resolve(&Client::new(), &config(0), &format!("{base}/master.m3u8")).await.unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(chosen.url, format!("{base}/high.m3u8"));
  }

  #[tokio::test]
  async fn resolve_media_playlist_plays_source() {
    let base = serve(vec![("/live.m3u8", MEDIA)]).await;
    let (levels, chosen) = resolve(&Client::new(), &config(0), &format!("{base}/live.m3u8")).await.unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(chosen.url, format!("{base}/live.m3u8"));
  }

  #[tokio::test]
  async fn resolve_missing_manifest_is_network_error() {
    let base = serve(vec![]).await;
    let err = resolve(&Client::new(), &config(1), &format!("{base}/gone.m3u8")).await.unwrap_err();
    assert_eq!(err.kind, AdaptiveErrorKind::Network);
    assert!(err.fatal);
  }

  #[tokio::test]
  async fn resolve_garbage_manifest_is_unrecoverable() {
    let base = serve(vec![("/bad.m3u8", "<html>nope</html>")]).await;
    let err = resolve(&Client::new(), &config(0), &format!("{base}/bad.m3u8")).await.unwrap_err();
    assert_eq!(err.kind, AdaptiveErrorKind::Other);
  }

  // --- session ---

  #[tokio::test]
  async fn session_feeds_media_after_attach() {
    let base = serve(vec![("/live.m3u8", MEDIA)]).await;
    let (tx, mut media_rx) = mpsc::unbounded_channel();
    let mut session = HlsSession::new(Client::new(), config(0));
    let mut events = session.subscribe();
    session.load_source(&format!("{base}/live.m3u8"));
    assert!(session.task.is_none());
    session.attach_media(MediaHandle::new(tx));

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert!(matches!(event, Some(AdaptiveEvent::ManifestParsed { .. })));
    assert_eq!(media_rx.try_recv().ok(), Some(MediaCommand::Load(format!("{base}/live.m3u8"))));
  }

  #[tokio::test]
  async fn start_load_refetches_after_network_error() {
    // One retry per load: both attempts of the first load fail.
    let base = serve_after_failures(vec![("/live.m3u8", MEDIA)], 2).await;
    let (tx, mut media_rx) = mpsc::unbounded_channel();
    let mut session = HlsSession::new(Client::new(), config(1));
    let mut events = session.subscribe();
    session.load_source(&format!("{base}/live.m3u8"));
    session.attach_media(MediaHandle::new(tx));

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert!(matches!(first, Some(AdaptiveEvent::Error(AdaptiveError { kind: AdaptiveErrorKind::Network, .. }))));
    assert!(media_rx.try_recv().is_err());

    session.start_load();
    let second = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert!(matches!(second, Some(AdaptiveEvent::ManifestParsed { .. })));
    assert_eq!(media_rx.try_recv().ok(), Some(MediaCommand::Load(format!("{base}/live.m3u8"))));
  }

  #[tokio::test]
  async fn recovery_budget_escalates_to_other() {
    let mut session = HlsSession::new(Client::new(), config(1));
    let mut events = session.subscribe();
    session.recover_media_error();
    session.recover_media_error();
    let errors: Vec<_> = drain(&mut events)
      .into_iter()
      .filter_map(|e| match e {
        AdaptiveEvent::Error(err) => Some(err),
        _ => None,
      })
      .collect();
    assert_eq!(errors, vec![AdaptiveError::fatal(AdaptiveErrorKind::Other, "mediaRecoveryExhausted")]);
  }

  #[tokio::test]
  async fn destroy_closes_subscriptions() {
    let mut session = HlsSession::new(Client::new(), config(0));
    let mut events = session.subscribe();
    session.destroy();
    assert!(events.recv().await.is_none());
  }
}
