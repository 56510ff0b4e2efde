use crate::error::PlayerError;
use crate::playlist::Channel;

/// One row of the channel list, ready to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
  pub index: usize,
  pub name: String,
  pub country: String,
  pub logo: String,
  /// Shown in place of the logo.
  pub initial: String,
  pub active: bool,
}

/// Check if a channel matches a search query.
/// Matches case-insensitively against both name and country.
pub fn matches_query(channel: &Channel, query: &str) -> bool {
  if query.is_empty() {
    return true;
  }
  let needle = query.to_lowercase();
  channel.name.to_lowercase().contains(&needle) || channel.country.to_lowercase().contains(&needle)
}

/// Build view rows for `filtered`, marking `selected` as active.
///
/// A selection past the end of `filtered` simply highlights nothing.
pub fn render(filtered: &[&Channel], selected: Option<usize>) -> Vec<ChannelRow> {
  filtered
    .iter()
    .enumerate()
    .map(|(index, channel)| ChannelRow {
      index,
      name: channel.name.clone(),
      country: channel.country.clone(),
      logo: channel.logo.clone(),
      initial: channel.initial(),
      active: selected == Some(index),
    })
    .collect()
}

/// Loaded channels plus the current search view and selection.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
  all: Vec<Channel>,
  /// Indices into `all` that match the current query.
  /// When the query is empty, contains all indices.
  filtered: Vec<usize>,
  selected: Option<usize>,
}

impl ChannelDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace all channels. Resets the view and the selection.
  pub fn load(&mut self, channels: Vec<Channel>) {
    self.all = channels;
    self.filtered = (0..self.all.len()).collect();
    self.selected = None;
  }

  /// Rebuild the filtered view. The selection index is left as it was and
  /// is re-resolved against the new view by the caller.
  pub fn search(&mut self, query: &str) {
    self.filtered = if query.is_empty() {
      (0..self.all.len()).collect()
    } else {
      self.all.iter().enumerate().filter(|(_, ch)| matches_query(ch, query)).map(|(i, _)| i).collect()
    };
  }

  /// Select an entry of the filtered view.
  pub fn select(&mut self, index: i64) -> Result<&Channel, PlayerError> {
    let len = self.filtered.len();
    let Some(pos) = usize::try_from(index).ok().filter(|&i| i < len) else {
      return Err(PlayerError::InvalidSelection { index, len });
    };
    self.selected = Some(pos);
    Ok(&self.all[self.filtered[pos]])
  }

  pub fn selected(&self) -> Option<usize> {
    self.selected
  }

  pub fn filtered(&self) -> Vec<&Channel> {
    self.filtered.iter().map(|&i| &self.all[i]).collect()
  }

  pub fn filtered_len(&self) -> usize {
    self.filtered.len()
  }

  pub fn len(&self) -> usize {
    self.all.len()
  }

  pub fn is_empty(&self) -> bool {
    self.all.is_empty()
  }

  /// Index after the selection, if it exists in the filtered view.
  pub fn next_index(&self) -> Option<usize> {
    let next = self.selected? + 1;
    (next < self.filtered.len()).then_some(next)
  }

  /// Index before the selection. `None` at the top or past the end of the view.
  pub fn previous_index(&self) -> Option<usize> {
    let current = self.selected?;
    (current > 0 && current <= self.filtered.len()).then(|| current - 1)
  }

  pub fn rows(&self) -> Vec<ChannelRow> {
    render(&self.filtered(), self.selected)
  }
}
