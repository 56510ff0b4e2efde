use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Direct,
  Ascii,
}

/// How channel logos are drawn into the terminal grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  Ascii,
  /// True-color half-block cells.
  Direct,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ASCII",
      DisplayMode::Direct => "Half-block",
    }
  }

  /// Name stored in prefs.
  pub fn key(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ascii",
      DisplayMode::Direct => "direct",
    }
  }

  pub fn toggle(self) -> Self {
    match self {
      DisplayMode::Ascii => DisplayMode::Direct,
      DisplayMode::Direct => DisplayMode::Ascii,
    }
  }
}

fn mode_for_colorterm(colorterm: &str) -> DisplayMode {
  match colorterm.to_lowercase().as_str() {
    "truecolor" | "24bit" => DisplayMode::Direct,
    _ => DisplayMode::Ascii,
  }
}

/// Half-block needs true color; everything else gets ASCII.
pub fn detect_display_mode() -> DisplayMode {
  mode_for_colorterm(&std::env::var("COLORTERM").unwrap_or_default())
}

/// CLI flag wins unless it is `auto`; then the saved pref, then detection.
pub fn resolve_display_mode(cli: CliDisplayMode, saved: Option<&str>) -> DisplayMode {
  let cli = match cli {
    CliDisplayMode::Auto => saved.and_then(|s| CliDisplayMode::from_str(s, true).ok()).unwrap_or(CliDisplayMode::Auto),
    other => other,
  };
  match cli {
    CliDisplayMode::Auto => detect_display_mode(),
    CliDisplayMode::Direct => DisplayMode::Direct,
    CliDisplayMode::Ascii => DisplayMode::Ascii,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn colorterm_detection() {
    assert_eq!(mode_for_colorterm("truecolor"), DisplayMode::Direct);
    assert_eq!(mode_for_colorterm("24BIT"), DisplayMode::Direct);
    assert_eq!(mode_for_colorterm(""), DisplayMode::Ascii);
  }

  #[test]
  fn explicit_flag_beats_saved_pref() {
    assert_eq!(resolve_display_mode(CliDisplayMode::Ascii, Some("direct")), DisplayMode::Ascii);
    assert_eq!(resolve_display_mode(CliDisplayMode::Auto, Some("ascii")), DisplayMode::Ascii);
    assert_eq!(resolve_display_mode(CliDisplayMode::Auto, Some("Direct")), DisplayMode::Direct);
  }

  #[test]
  fn pref_key_resolves_back() {
    for mode in [DisplayMode::Ascii, DisplayMode::Direct] {
      assert_eq!(resolve_display_mode(CliDisplayMode::Auto, Some(mode.key())), mode);
      assert_eq!(mode.toggle().toggle(), mode);
    }
  }
}
