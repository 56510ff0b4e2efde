use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode, TextInput};

const VOLUME_STEP: i16 = 5;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Apply a line-editing key to `field`. Returns true if the text changed.
pub fn edit_text(field: &mut TextInput, code: KeyCode) -> bool {
  match code {
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&field.text, field.cursor);
      field.text.insert(byte_idx, c);
      field.cursor += 1;
      true
    }
    KeyCode::Backspace if field.cursor > 0 => {
      field.cursor -= 1;
      let byte_idx = char_to_byte_index(&field.text, field.cursor);
      field.text.remove(byte_idx);
      true
    }
    KeyCode::Delete if field.cursor < field.char_count() => {
      let byte_idx = char_to_byte_index(&field.text, field.cursor);
      field.text.remove(byte_idx);
      true
    }
    KeyCode::Left => {
      field.cursor = field.cursor.saturating_sub(1);
      false
    }
    KeyCode::Right => {
      field.cursor = (field.cursor + 1).min(field.char_count());
      false
    }
    KeyCode::Home => {
      field.cursor = 0;
      false
    }
    KeyCode::End => {
      field.cursor = field.char_count();
      false
    }
    _ => false,
  }
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => app.should_quit = true,
      KeyCode::Char('t') => app.next_theme(),
      KeyCode::Char('d') => app.toggle_display_mode(),
      KeyCode::Char('b') => app.toggle_sidebar(),
      KeyCode::Char('l') => {
        app.clear_error();
        app.mode = AppMode::PlaylistUrl;
      }
      _ => {}
    }
    return;
  }

  match app.mode {
    AppMode::Browse => handle_browse_key(app, key),
    AppMode::Search => handle_search_key(app, key),
    AppMode::PlaylistUrl => handle_playlist_key(app, key),
  }
}

fn handle_browse_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Char(' ') => app.toggle_pause(),
    KeyCode::Down => app.play_next(),
    KeyCode::Up => app.play_previous(),
    KeyCode::Char('j') => app.move_cursor(true),
    KeyCode::Char('k') => app.move_cursor(false),
    KeyCode::Enter => app.play_cursor(),
    KeyCode::Char('m') => app.toggle_mute(),
    KeyCode::Char('+') | KeyCode::Char('=') => app.change_volume(VOLUME_STEP),
    KeyCode::Char('-') => app.change_volume(-VOLUME_STEP),
    KeyCode::Char('/') => {
      // The search box lives in the sidebar.
      app.sidebar_visible = true;
      app.mode = AppMode::Search;
    }
    KeyCode::Char('o') => app.mode = AppMode::PlaylistUrl,
    KeyCode::Char('q') => app.should_quit = true,
    KeyCode::Esc => {
      if app.search.text.is_empty() {
        app.clear_error();
      } else {
        app.clear_search();
      }
    }
    _ => {}
  }
}

fn handle_search_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Down => app.move_cursor(true),
    KeyCode::Up => app.move_cursor(false),
    KeyCode::Enter => {
      app.play_cursor();
      app.mode = AppMode::Browse;
    }
    KeyCode::Esc => {
      app.clear_search();
      app.mode = AppMode::Browse;
    }
    KeyCode::Tab => app.mode = AppMode::Browse,
    code => {
      if edit_text(&mut app.search, code) {
        app.apply_search();
      }
    }
  }
}

fn handle_playlist_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => {
      app.trigger_playlist_load();
      app.mode = AppMode::Browse;
    }
    KeyCode::Esc => app.mode = AppMode::Browse,
    code => {
      app.clear_error();
      edit_text(&mut app.playlist_input, code);
    }
  }
}
