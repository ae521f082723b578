//! Digits and colon for the clock: the 5x7 glyphs doubled to 10x14, on a 12 pixel pitch.

use epd_paint_async::font::{Glyph, VariableFont};

static BITMAP: [u8; 187] = [
    // 0
    0x3F, 0x0F, 0xCC, 0x0F, 0x03, 0xC3, 0xF0, 0xFC, 0xCF,
    0x33, 0xF0, 0xFC, 0x3C, 0x0F, 0x03, 0x3F, 0x0F, 0xC0,
    // 1
    0x0C, 0x03, 0x03, 0xC0, 0xF0, 0x0C, 0x03, 0x00, 0xC0,
    0x30, 0x0C, 0x03, 0x00, 0xC0, 0x30, 0x3F, 0x0F, 0xC0,
    // 2
    0x3F, 0x0F, 0xCC, 0x0F, 0x03, 0x00, 0xC0, 0x30, 0x30,
    0x0C, 0x0C, 0x03, 0x03, 0x00, 0xC0, 0xFF, 0xFF, 0xF0,
    // 3
    0xFF, 0xFF, 0xF0, 0x30, 0x0C, 0x0C, 0x03, 0x00, 0x30,
    0x0C, 0x00, 0xC0, 0x3C, 0x0F, 0x03, 0x3F, 0x0F, 0xC0,
    // 4
    0x03, 0x00, 0xC0, 0xF0, 0x3C, 0x33, 0x0C, 0xCC, 0x33,
    0x0C, 0xFF, 0xFF, 0xF0, 0x30, 0x0C, 0x03, 0x00, 0xC0,
    // 5
    0xFF, 0xFF, 0xFC, 0x03, 0x00, 0xFF, 0x3F, 0xC0, 0x0C,
    0x03, 0x00, 0xC0, 0x3C, 0x0F, 0x03, 0x3F, 0x0F, 0xC0,
    // 6
    0x0F, 0x03, 0xC3, 0x00, 0xC0, 0xC0, 0x30, 0x0F, 0xF3,
    0xFC, 0xC0, 0xF0, 0x3C, 0x0F, 0x03, 0x3F, 0x0F, 0xC0,
    // 7
    0xFF, 0xFF, 0xF0, 0x0C, 0x03, 0x03, 0x00, 0xC0, 0xC0,
    0x30, 0x30, 0x0C, 0x03, 0x00, 0xC0, 0x30, 0x0C, 0x00,
    // 8
    0x3F, 0x0F, 0xCC, 0x0F, 0x03, 0xC0, 0xF0, 0x33, 0xF0,
    0xFC, 0xC0, 0xF0, 0x3C, 0x0F, 0x03, 0x3F, 0x0F, 0xC0,
    // 9
    0x3F, 0x0F, 0xCC, 0x0F, 0x03, 0xC0, 0xF0, 0x33, 0xFC,
    0xFF, 0x00, 0xC0, 0x30, 0x30, 0x0C, 0x3C, 0x0F, 0x00,
    // :
    0x00, 0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0x00,
];

static GLYPHS: [Glyph; 11] = [
    Glyph::new(0, 10, 14, 12, 0, -14), // 0
    Glyph::new(18, 10, 14, 12, 0, -14), // 1
    Glyph::new(36, 10, 14, 12, 0, -14), // 2
    Glyph::new(54, 10, 14, 12, 0, -14), // 3
    Glyph::new(72, 10, 14, 12, 0, -14), // 4
    Glyph::new(90, 10, 14, 12, 0, -14), // 5
    Glyph::new(108, 10, 14, 12, 0, -14), // 6
    Glyph::new(126, 10, 14, 12, 0, -14), // 7
    Glyph::new(144, 10, 14, 12, 0, -14), // 8
    Glyph::new(162, 10, 14, 12, 0, -14), // 9
    Glyph::new(180, 4, 14, 6, 1, -14), // :
];

pub static CLOCK_FONT: VariableFont<'static> =
    VariableFont::new(&BITMAP, &GLYPHS, b'0', b':', 16);
