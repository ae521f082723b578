//! Drawing text onto a [Canvas].
use embedded_graphics::prelude::{Point, Size};
use heapless::Vec;

use crate::{
    canvas::Canvas,
    font::{ActiveFont, FixedFont},
    log::{error_log, warn_log},
    Error,
};

/// Capacity of the scanline buffer used by [Canvas::print], in bytes. This limits printed lines
/// to 512 pixels.
pub const MAX_LINE_BYTES: usize = 64;

impl<B> Canvas<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Draws one fixed-font character with its top-left corner at (x, y).
    ///
    /// Only the glyph's set bits are drawn; the background is left as is.
    pub fn draw_char_at(&mut self, x: i32, y: i32, c: char, font: &FixedFont<'_>, colored: bool) {
        let Some(rows) = font.glyph(c) else {
            return;
        };
        let bytes_per_row = font.bytes_per_row();
        for (j, row) in rows.chunks(bytes_per_row).enumerate() {
            for i in 0..font.width() as usize {
                let set = row
                    .get(i / 8)
                    .is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0);
                if set {
                    self.plot(x + i as i32, y + j as i32, colored);
                }
            }
        }
    }

    /// Draws `text` left to right, one fixed-width cell per character.
    pub fn draw_string_at(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        font: &FixedFont<'_>,
        colored: bool,
    ) {
        let mut cursor = x;
        for c in text.chars() {
            self.draw_char_at(cursor, y, c, font, colored);
            cursor += font.width() as i32;
        }
    }

    /// Prints `text` in the active variable-width font with the top-left of its text box at
    /// (x, y).
    ///
    /// The text is rendered one scanline at a time and only glyph pixels are drawn. Does nothing if
    /// no font is set. Fails with [Error::LineTooWide] before drawing anything if the line is
    /// wider than [MAX_LINE_BYTES] allows.
    pub fn print(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        font: &ActiveFont<'_>,
        colored: bool,
    ) -> Result<(), Error> {
        let Some(font) = font.font() else {
            warn_log!("No font set, nothing printed");
            return Ok(());
        };

        let width = font.string_width(text) as usize;
        let height = font.string_height(text);
        let required = width.div_ceil(8);
        let mut line = Vec::<u8, MAX_LINE_BYTES>::new();
        line.resize(required, 0).map_err(|_| {
            error_log!("Text line of {} pixels doesn't fit the line buffer", width);
            Error::LineTooWide {
                required,
                capacity: MAX_LINE_BYTES,
            }
        })?;

        for row in 0..height {
            line.fill(0);
            font.fill_pixel_line(text, row, &mut line, true);
            for px in 0..width {
                if line[px / 8] & (0x80 >> (px % 8)) != 0 {
                    self.plot(x + px as i32, y + row as i32, colored);
                }
            }
        }
        Ok(())
    }
}

impl ActiveFont<'_> {
    /// The top-left corner that centres `text` in an area of the given size.
    ///
    /// Along an axis where the text doesn't fit, the text starts at 0.
    pub fn centered_origin(&self, area: Size, text: &str) -> Point {
        let start = |extent: u32, size: u16| {
            let size = size as u32;
            if size > extent {
                0
            } else {
                ((extent - size) / 2) as i32
            }
        };
        Point::new(
            start(area.width, self.string_width(text)),
            start(area.height, self.string_height(text)),
        )
    }
}
