//! M3U playlist parsing.
//!
//! Only the pieces of `#EXTINF` the player shows are extracted: the display
//! name after the last comma plus the `tvg-logo`, `group-title` and `tvg-id`
//! attributes. Everything else in the playlist is skipped.

use crate::error::PlayerError;

const EXTINF_PREFIX: &str = "#EXTINF:";
const HEADER_MARKER: &str = "#EXTM3U";

const UNKNOWN_NAME: &str = "Unknown Channel";
const UNKNOWN_GROUP: &str = "Unknown";

/// Substrings that mark a URL as something the player will try to stream.
const STREAM_EXTENSIONS: [&str; 5] = [".m3u8", ".ts", ".mp4", ".mkv", ".avi"];
const STREAM_KEYWORDS: [&str; 3] = ["stream", "live", "playlist"];

/// A single playable playlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
  pub name: String,
  /// Logo image URL, empty when the entry has none.
  pub logo: String,
  /// `group-title`, shown as the channel's country/category.
  pub country: String,
  /// `tvg-id`, empty when the entry has none.
  pub id: String,
  pub url: String,
}

impl Channel {
  /// Upper-cased first character of the name, used when there is no logo.
  pub fn initial(&self) -> String {
    self.name.chars().next().map(|c| c.to_uppercase().collect()).unwrap_or_default()
  }
}

/// Metadata collected from an `#EXTINF` line, waiting for its URL line.
#[derive(Debug)]
struct PendingEntry {
  name: String,
  logo: String,
  country: String,
  id: String,
}

impl PendingEntry {
  fn from_extinf(line: &str) -> Self {
    let name = line
      .rfind(',')
      .map(|pos| line[pos + 1..].trim())
      .filter(|name| !name.is_empty())
      .unwrap_or(UNKNOWN_NAME)
      .to_string();
    Self {
      name,
      logo: extract_attr(line, "tvg-logo").unwrap_or_default(),
      country: extract_attr(line, "group-title").unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
      id: extract_attr(line, "tvg-id").unwrap_or_default(),
    }
  }

  fn into_channel(self, url: &str) -> Channel {
    Channel { name: self.name, logo: self.logo, country: self.country, id: self.id, url: url.to_string() }
  }
}

/// Find `name="value"` in an `#EXTINF` line.
///
/// The attribute name matches case-insensitively and the value must be
/// non-empty and closed by a quote. If the first occurrence is empty or
/// unterminated the search moves on to the next one.
fn extract_attr(line: &str, name: &str) -> Option<String> {
  // ASCII lowercasing keeps byte offsets aligned with `line`.
  let haystack = line.to_ascii_lowercase();
  let needle = format!("{}=\"", name.to_ascii_lowercase());

  let mut from = 0;
  while let Some(found) = haystack[from..].find(&needle) {
    let value_start = from + found + needle.len();
    let rest = &line[value_start..];
    if let Some(end) = rest.find('"')
      && end > 0
    {
      return Some(rest[..end].to_string());
    }
    from = value_start;
  }
  None
}

/// Heuristic check for URLs worth handing to the playback surface.
///
/// Accepts anything containing a known media extension or one of the words
/// `stream`, `live` or `playlist`. This lets through plenty of non-media URLs
/// and rejects bare CDN paths; both are kept as-is for playlist compatibility.
pub fn is_valid_stream_url(url: &str) -> bool {
  let lower = url.to_lowercase();
  STREAM_EXTENSIONS.iter().any(|ext| lower.contains(ext)) || STREAM_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn is_url_line(line: &str) -> bool {
  line.starts_with("http://") || line.starts_with("https://")
}

/// Parse M3U text into channels, in playlist order.
///
/// Does not require the `#EXTM3U` header and never fails; an input without
/// usable entries yields an empty list.
pub fn parse_m3u(content: &str) -> Vec<Channel> {
  let mut channels = Vec::new();
  let mut current: Option<PendingEntry> = None;

  for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
    if line.starts_with(EXTINF_PREFIX) {
      current = Some(PendingEntry::from_extinf(line));
    } else if is_url_line(line) {
      // A URL without preceding metadata is dropped and leaves state alone.
      let Some(entry) = current.take() else { continue };
      if is_valid_stream_url(line) {
        channels.push(entry.into_channel(line));
      }
    }
  }

  channels
}

/// Validate playlist text and parse it, keeping at most `cap` channels.
pub fn parse_playlist(content: &str, cap: usize) -> Result<Vec<Channel>, PlayerError> {
  if !content.contains(HEADER_MARKER) {
    return Err(PlayerError::PlaylistFormatInvalid);
  }
  let mut channels = parse_m3u(content);
  if channels.is_empty() {
    return Err(PlayerError::PlaylistEmpty);
  }
  channels.truncate(cap);
  Ok(channels)
}
