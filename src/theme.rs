use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  /// Background of every other list row.
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub key_fg: Color,
  pub key_bg: Color,
  /// Live indicator and the active channel marker.
  pub live: Color,
}

pub static THEMES: [Theme; 4] = [
  Theme {
    name: "Midnight",
    bg: Color::Rgb(22, 24, 33),
    fg: Color::Rgb(220, 223, 235),
    accent: Color::Rgb(130, 170, 255),
    muted: Color::Rgb(110, 116, 140),
    border: Color::Rgb(58, 63, 84),
    highlight_fg: Color::Rgb(22, 24, 33),
    highlight_bg: Color::Rgb(130, 170, 255),
    stripe_bg: Color::Rgb(28, 30, 41),
    status: Color::Rgb(195, 232, 141),
    error: Color::Rgb(255, 117, 127),
    key_fg: Color::Rgb(22, 24, 33),
    key_bg: Color::Rgb(110, 116, 140),
    live: Color::Rgb(255, 83, 112),
  },
  Theme {
    name: "Pastel",
    bg: Color::Rgb(253, 248, 243),
    fg: Color::Rgb(74, 68, 88),
    accent: Color::Rgb(198, 120, 221),
    muted: Color::Rgb(160, 152, 170),
    border: Color::Rgb(226, 212, 232),
    highlight_fg: Color::Rgb(253, 248, 243),
    highlight_bg: Color::Rgb(198, 120, 221),
    stripe_bg: Color::Rgb(247, 240, 236),
    status: Color::Rgb(106, 168, 132),
    error: Color::Rgb(214, 92, 104),
    key_fg: Color::Rgb(253, 248, 243),
    key_bg: Color::Rgb(160, 152, 170),
    live: Color::Rgb(232, 96, 118),
  },
  Theme {
    name: "Mint",
    bg: Color::Rgb(18, 32, 30),
    fg: Color::Rgb(214, 240, 232),
    accent: Color::Rgb(102, 221, 170),
    muted: Color::Rgb(104, 140, 130),
    border: Color::Rgb(44, 72, 66),
    highlight_fg: Color::Rgb(18, 32, 30),
    highlight_bg: Color::Rgb(102, 221, 170),
    stripe_bg: Color::Rgb(23, 39, 36),
    status: Color::Rgb(240, 214, 120),
    error: Color::Rgb(255, 128, 120),
    key_fg: Color::Rgb(18, 32, 30),
    key_bg: Color::Rgb(104, 140, 130),
    live: Color::Rgb(255, 110, 110),
  },
  Theme {
    name: "Terminal",
    bg: Color::Reset,
    fg: Color::White,
    accent: Color::Cyan,
    muted: Color::DarkGray,
    border: Color::Gray,
    highlight_fg: Color::Black,
    highlight_bg: Color::Cyan,
    stripe_bg: Color::Reset,
    status: Color::Green,
    error: Color::Red,
    key_fg: Color::Black,
    key_bg: Color::Gray,
    live: Color::LightRed,
  },
];

/// Index of the theme called `name`, falling back to the first.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(n))).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn theme_names_are_unique() {
    let mut names: Vec<_> = THEMES.iter().map(|t| t.name).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), THEMES.len());
  }

  #[test]
  fn lookup_by_saved_name() {
    assert_eq!(theme_index(Some("mint")), 2);
    assert_eq!(theme_index(Some("gone")), 0);
    assert_eq!(theme_index(None), 0);
  }
}
