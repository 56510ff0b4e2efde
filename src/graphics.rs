use image::{DynamicImage, imageops::FilterType};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Modifier, Style},
  widgets::Widget,
};

use crate::display::DisplayMode;

// --- Logo Widget ---

pub struct ThumbnailWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

const ASCII_CHARS: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

/// Resize a logo to fit `area` cells. Half-block packs two pixel rows per cell.
pub fn fit_logo(image: &DynamicImage, area: Rect, display_mode: DisplayMode) -> DynamicImage {
  let w = u32::from(area.width).max(1);
  let h = match display_mode {
    DisplayMode::Direct => u32::from(area.height) * 2,
    DisplayMode::Ascii => u32::from(area.height),
  }
  .max(1);
  image.resize(w, h, FilterType::Triangle)
}

impl Widget for ThumbnailWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_direct(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
    }
  }
}

fn cell(area: Rect, offset_x: u32, offset_y: u32, x: u32, y: u32) -> (u16, u16) {
  let clamp = |v: u32| v.min(u32::from(u16::MAX)) as u16;
  (
    area.x.saturating_add(clamp(offset_x)).saturating_add(clamp(x)),
    area.y.saturating_add(clamp(offset_y)).saturating_add(clamp(y)),
  )
}

fn render_direct(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgba = image.to_rgba8();
  let img_w = rgba.width().min(u32::from(area.width));
  let img_h = rgba.height();
  let cell_h = img_h.div_ceil(2);
  let offset_x = u32::from(area.width).saturating_sub(img_w) / 2;
  let offset_y = u32::from(area.height).saturating_sub(cell_h) / 2;

  // Logos are often transparent PNGs; transparent pixels keep the panel background.
  let color = |p: &image::Rgba<u8>| if p[3] < 64 { Color::Reset } else { Color::Rgb(p[0], p[1], p[2]) };

  for y in 0..cell_h.min(u32::from(area.height)) {
    for x in 0..img_w {
      let fg = color(rgba.get_pixel(x, y * 2));
      let lower_y = y * 2 + 1;
      let bg = if lower_y < img_h { color(rgba.get_pixel(x, lower_y)) } else { Color::Reset };
      let (cx, cy) = cell(area, offset_x, offset_y, x, y);
      buf.set_string(cx, cy, "▀", Style::default().fg(fg).bg(bg));
    }
  }
}

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let luma = image.to_luma_alpha8();
  let img_w = luma.width().min(u32::from(area.width));
  let img_h = luma.height().min(u32::from(area.height));
  let offset_x = u32::from(area.width).saturating_sub(img_w) / 2;
  let offset_y = u32::from(area.height).saturating_sub(img_h) / 2;

  for y in 0..img_h {
    for x in 0..img_w {
      let pixel = luma.get_pixel(x, y);
      let idx = if pixel[1] < 64 { 0 } else { ascii_index(pixel[0]) };
      let (cx, cy) = cell(area, offset_x, offset_y, x, y);
      buf.set_string(cx, cy, ASCII_CHARS[idx], Style::default());
    }
  }
}

fn ascii_index(luma: u8) -> usize {
  let idx = ((f32::from(luma) / 255.0) * (ASCII_CHARS.len() - 1) as f32).round() as usize;
  idx.min(ASCII_CHARS.len() - 1)
}

// --- Initial Badge ---

/// Stand-in for a missing logo: the channel's first letter, centred.
pub struct InitialBadge<'a> {
  pub initial: &'a str,
  pub style: Style,
}

impl Widget for InitialBadge<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    buf.set_style(area, self.style);
    let x = area.x + area.width.saturating_sub(1) / 2;
    let y = area.y + area.height.saturating_sub(1) / 2;
    buf.set_string(x, y, self.initial, self.style.add_modifier(Modifier::BOLD));
  }
}
