//! Draws a page raster with half-block characters
//!
//! Each terminal cell shows two vertically stacked samples: the upper one as
//! the foreground of `▀`, the lower one as the background. A cell is treated
//! as `cell_px` raster pixels wide, and each half as `cell_px` pixels tall.

use ratatui::{buffer::Buffer, layout::Rect, style::Color, widgets::Widget};

use crate::decode::Raster;

const UPPER_HALF: &str = "\u{2580}";

/// Raster pixels represented by one terminal column
pub const DEFAULT_CELL_PIXELS: u32 = 8;

pub struct RasterView<'a> {
    raster: &'a Raster,
    cell_px: u32,
}

impl<'a> RasterView<'a> {
    pub fn new(raster: &'a Raster) -> Self {
        Self {
            raster,
            cell_px: DEFAULT_CELL_PIXELS,
        }
    }

    pub fn cell_pixels(mut self, cell_px: u32) -> Self {
        self.cell_px = cell_px.max(1);
        self
    }

    /// Terminal columns needed to show the full raster width
    pub fn columns(&self) -> u16 {
        let cols = self.raster.width().div_ceil(self.cell_px);
        u16::try_from(cols).unwrap_or(u16::MAX)
    }

    fn sample(&self, x: u32, y: u32) -> Option<Color> {
        self.raster
            .pixel(x * self.cell_px, y * self.cell_px)
            .map(|(r, g, b)| Color::Rgb(r, g, b))
    }
}

impl Widget for RasterView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let offset_x = area.width.saturating_sub(self.columns()) / 2;

        for row in 0..area.height {
            for col in 0..area.width.saturating_sub(offset_x) {
                let x = u32::from(col);
                let top = self.sample(x, u32::from(row) * 2);
                let bottom = self.sample(x, u32::from(row) * 2 + 1);
                let (Some(top), bottom) = (top, bottom) else {
                    continue;
                };

                let cell = &mut buf[(area.x + offset_x + col, area.y + row)];
                cell.set_symbol(UPPER_HALF).set_fg(top);
                if let Some(bottom) = bottom {
                    cell.set_bg(bottom);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped(width: u32, height: u32) -> Raster {
        let mut pixels = Vec::new();
        for y in 0..height {
            let v = if y % 2 == 0 { 255 } else { 0 };
            for _ in 0..width {
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        Raster::new(pixels, width, height).unwrap()
    }

    #[test]
    fn half_blocks_carry_two_rows() {
        let raster = striped(4, 4);
        let mut buf = Buffer::empty(Rect::new(0, 0, 4, 2));
        RasterView::new(&raster)
            .cell_pixels(1)
            .render(buf.area, &mut buf);

        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), UPPER_HALF);
        assert_eq!(cell.fg, Color::Rgb(255, 255, 255));
        assert_eq!(cell.bg, Color::Rgb(0, 0, 0));
    }

    #[test]
    fn narrow_raster_is_centered() {
        let raster = striped(2, 2);
        let mut buf = Buffer::empty(Rect::new(0, 0, 6, 1));
        RasterView::new(&raster)
            .cell_pixels(1)
            .render(buf.area, &mut buf);

        assert_eq!(buf[(0, 0)].symbol(), " ");
        assert_eq!(buf[(2, 0)].symbol(), UPPER_HALF);
        assert_eq!(buf[(3, 0)].symbol(), UPPER_HALF);
        assert_eq!(buf[(4, 0)].symbol(), " ");
    }

    #[test]
    fn columns_round_up() {
        let raster = striped(17, 2);
        assert_eq!(RasterView::new(&raster).columns(), 3);
    }
}
