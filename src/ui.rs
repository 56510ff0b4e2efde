use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph},
};

use crate::app::{App, AppMode, TextInput};
use crate::graphics::{InitialBadge, ThumbnailWidget, fit_logo};
use crate::selector::PlaybackState;
use crate::theme::Theme;

const SIDEBAR_WIDTH: u16 = 38;
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn rounded(theme: &Theme, focused: bool) -> Block<'static> {
  let color = if focused { theme.accent } else { theme.border };
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(color))
}

fn spinner(app: &App) -> &'static str {
  let tick = (app.started_at.elapsed().as_millis() / 100) as usize;
  SPINNER[tick % SPINNER.len()]
}

/// Visible slice of `field` for a box `inner_w` columns wide; updates its scroll.
fn visible_text(field: &mut TextInput, inner_w: usize) -> (String, usize) {
  let cursor_col = display_width(&field.text, field.cursor);
  if cursor_col < field.scroll {
    field.scroll = cursor_col;
  } else if cursor_col >= field.scroll + inner_w {
    field.scroll = cursor_col.saturating_sub(inner_w) + 1;
  }
  let scroll = field.scroll;
  let visible: String = field
    .text
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= scroll)
    .take_while(|(start, _, _)| *start < scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();
  (visible, cursor_col - scroll)
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let input_h = if app.mode == AppMode::PlaylistUrl { 3 } else { 0 };
  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(input_h),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  if app.mode == AppMode::PlaylistUrl {
    render_playlist_input(frame, app, input_area);
  }
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let mut spans = vec![Span::styled(" ▶ tvp ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))];
  let total = app.player.directory().len();
  if total > 0 {
    spans.push(Span::styled(format!(" {} channels", total), Style::default().fg(theme.muted)));
  }
  frame.render_widget(Line::from(spans), area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  if app.sidebar_visible {
    let [sidebar_area, player_area] =
      Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH.min(area.width / 2)), Constraint::Min(10)]).areas(area);
    render_sidebar(frame, app, sidebar_area);
    render_player(frame, app, player_area);
  } else {
    render_player(frame, app, area);
  }
}

fn render_sidebar(frame: &mut Frame, app: &mut App, area: Rect) {
  let [search_area, list_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(3)]).areas(area);
  render_search(frame, app, search_area);

  if app.player.directory().filtered_len() == 0 {
    render_empty_list(frame, app, list_area);
  } else {
    render_channels(frame, app, list_area);
  }
}

fn render_search(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let focused = app.mode == AppMode::Search;
  let block = rounded(theme, focused)
    .title(" Search channels ")
    .title_style(Style::default().fg(if focused { theme.accent } else { theme.muted }))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let paragraph = if app.search.text.is_empty() && !focused {
    Paragraph::new(Span::styled("/ to search", Style::default().fg(theme.muted)))
  } else {
    let (visible, cursor) = visible_text(&mut app.search, inner_w);
    if focused {
      frame.set_cursor_position((area.x + 2 + cursor as u16, area.y + 1));
    }
    Paragraph::new(visible).style(Style::default().fg(theme.fg))
  };
  frame.render_widget(paragraph.block(block), area);
}

fn render_empty_list(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let text = if app.player.directory().is_empty() {
    vec![
      Line::from(""),
      Line::from(Span::styled("No playlist loaded", Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
      Line::from(""),
      Line::from(Span::styled("Press ^l to load an M3U URL", Style::default().fg(theme.muted))),
    ]
  } else {
    vec![
      Line::from(""),
      Line::from(Span::styled("No Channels Found", Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
      Line::from(""),
      Line::from(Span::styled("Try adjusting your search", Style::default().fg(theme.muted))),
    ]
  };
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(rounded(theme, false).title(" Channels "));
  frame.render_widget(paragraph, area);
}

fn render_channels(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let rows = app.player.rows();
  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = rows
    .iter()
    .map(|row| {
      let is_cursor = Some(row.index) == app.list_state.selected();
      let fg = if is_cursor { theme.highlight_fg } else { theme.fg };
      let bg = if is_cursor {
        theme.highlight_bg
      } else if row.index % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let marker = if row.active { "● " } else { "  " };
      let badge = format!("{} ", row.initial);
      let country_w = row.country.chars().count().min(inner_w / 3);
      let country = truncate_str(&row.country, country_w);
      let name_max = inner_w.saturating_sub(marker.chars().count() + badge.chars().count() + country_w + 1);
      let name = truncate_str(&row.name, name_max);
      let gap = inner_w
        .saturating_sub(marker.chars().count() + badge.chars().count() + name.chars().count() + country.chars().count());

      let line = Line::from(vec![
        Span::styled(marker, Style::default().fg(theme.live)),
        Span::styled(badge, Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
        Span::styled(name, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(country, Style::default().fg(theme.muted)),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect();

  let filtered = app.player.directory().filtered_len();
  let total = app.player.directory().len();
  let title = if filtered == total { format!(" Channels ({}) ", total) } else { format!(" Channels ({}/{}) ", filtered, total) };

  let list = List::new(items)
    .block(
      rounded(theme, app.mode == AppMode::Browse)
        .title(title)
        .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    )
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_player(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let mode_label = app.player.mode().map(|m| format!("[{}] ", m.label())).unwrap_or_default();
  let title = Line::from(vec![
    Span::styled(" Now Playing ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    Span::styled(mode_label, Style::default().fg(theme.muted)),
  ]);
  let block = rounded(theme, false).title(title).padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let Some(channel) = app.player.current().cloned() else {
    let text = vec![
      Line::from(""),
      Line::from(Span::styled("▶  Welcome to tvp", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
      Line::from(""),
      Line::from(Span::styled("Select a channel to start watching", Style::default().fg(theme.fg))),
      Line::from(""),
      Line::from(Span::styled("Enter plays the highlighted channel, ↑/↓ zaps.", Style::default().fg(theme.muted))),
    ];
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), inner);
    return;
  };

  let [logo_area, info_area] = Layout::vertical([Constraint::Percentage(60), Constraint::Min(6)]).areas(inner);
  let logo_area = Rect { y: logo_area.y + 1, height: logo_area.height.saturating_sub(1), ..logo_area };

  let logo = app.current_logo().map(|(url, image)| {
    let fresh = match &app.logo.resized {
      Some((u, w, h, _)) => u == url && *w == logo_area.width && *h == logo_area.height,
      None => false,
    };
    (!fresh).then(|| (url.clone(), fit_logo(image, logo_area, app.display_mode)))
  });

  if let Some(update) = logo {
    if let Some((url, resized)) = update {
      app.logo.resized = Some((url, logo_area.width, logo_area.height, resized));
    }
    if let Some((_, _, _, ref resized)) = app.logo.resized {
      frame.render_widget(ThumbnailWidget { image: resized, display_mode: app.display_mode }, logo_area);
    }
  } else {
    let badge_w = logo_area.width.min(9);
    let badge_h = logo_area.height.min(3);
    let badge_area = Rect {
      x: logo_area.x + (logo_area.width - badge_w) / 2,
      y: logo_area.y + (logo_area.height - badge_h) / 2,
      width: badge_w,
      height: badge_h,
    };
    let style = Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg);
    frame.render_widget(InitialBadge { initial: &channel.initial(), style }, badge_area);
  }

  let inner_w = info_area.width as usize;
  let (state_icon, state_text, state_color) = match app.player.state() {
    PlaybackState::Idle => ("○", "Idle".to_string(), theme.muted),
    PlaybackState::Loading => (spinner(app), "Loading stream…".to_string(), theme.status),
    PlaybackState::Playing if app.player.paused() => ("⏸", "Paused".to_string(), theme.muted),
    PlaybackState::Playing => ("●", "LIVE".to_string(), theme.live),
    PlaybackState::Failed => ("✕", "Stream unavailable".to_string(), theme.error),
  };
  let volume = if app.player.muted() { "muted".to_string() } else { format!("{}%", app.player.volume()) };

  let lines = vec![
    Line::from(""),
    Line::from(Span::styled(truncate_str(&channel.name, inner_w), Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(Span::styled(
      truncate_str(&format!("{} • Live TV", channel.country), inner_w),
      Style::default().fg(theme.muted),
    )),
    Line::from(""),
    Line::from(vec![
      Span::styled(format!("{} ", state_icon), Style::default().fg(state_color)),
      Span::styled(state_text, Style::default().fg(state_color)),
    ]),
    Line::from(vec![
      Span::styled("Volume  ", Style::default().fg(theme.muted)),
      Span::styled(volume, Style::default().fg(theme.fg)),
    ]),
    Line::from(""),
    Line::from(Span::styled(
      truncate_str(&channel.url, inner_w),
      Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
    )),
  ];
  frame.render_widget(Paragraph::new(lines), info_area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" {} {}", spinner(app), msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ  {}", info), Style::default().fg(theme.status))
  } else if let Some(url) = &app.playlist_url {
    (format!(" ♪ {}", url), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_playlist_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let block = rounded(theme, true)
    .title(" Load Playlist (M3U URL) ")
    .title_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1));
  let inner_w = area.width.saturating_sub(4) as usize;
  let (visible, cursor) = visible_text(&mut app.playlist_input, inner_w);
  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(block), area);
  frame.set_cursor_position((area.x + 2 + cursor as u16, area.y + 1));
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let is_playing = app.player.current().is_some();
  let keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Browse => {
      let mut k = vec![("Enter", "Play"), ("↑/↓", "Zap"), ("/", "Search")];
      if is_playing {
        let pause_label = if app.player.paused() { "Resume" } else { "Pause" };
        k.push(("Space", pause_label));
        k.push(("m", if app.player.muted() { "Unmute" } else { "Mute" }));
        k.push(("+/-", "Volume"));
      }
      k.push(("^l", "Playlist"));
      k.push(("^b", "Sidebar"));
      k.push(("^t", "Theme"));
      k.push(("q", "Quit"));
      k
    }
    AppMode::Search => vec![("Enter", "Play"), ("↑/↓", "Navigate"), ("Tab", "Keep"), ("Esc", "Clear")],
    AppMode::PlaylistUrl => vec![("Enter", "Load"), ("Esc", "Cancel")],
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} · {} ", theme.name, app.display_mode.label());
  let label_w = theme_label.chars().count() as u16;
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area = Rect { x: area.x + area.width.saturating_sub(label_w), width: label_w, ..area };
  frame.render_widget(right, right_area);
}
