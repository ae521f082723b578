/// A fixed-width bitmap font.
///
/// Every glyph occupies `height` rows of `ceil(width / 8)` bytes, MSB-first, and glyphs are stored
/// back to back starting at [FixedFont::first_char]. Characters outside the table are drawn as a
/// space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFont<'a> {
    table: &'a [u8],
    width: u8,
    height: u8,
    first_char: u8,
}

impl<'a> FixedFont<'a> {
    /// Creates a font whose table starts at the space character.
    pub const fn new(table: &'a [u8], width: u8, height: u8) -> Self {
        Self {
            table,
            width,
            height,
            first_char: b' ',
        }
    }

    /// Changes the character code of the first glyph in the table.
    pub const fn with_first_char(mut self, first_char: u8) -> Self {
        self.first_char = first_char;
        self
    }

    pub const fn width(&self) -> u8 {
        self.width
    }

    pub const fn height(&self) -> u8 {
        self.height
    }

    pub const fn first_char(&self) -> u8 {
        self.first_char
    }

    /// Bytes per glyph row.
    pub const fn bytes_per_row(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    const fn glyph_len(&self) -> usize {
        self.height as usize * self.bytes_per_row()
    }

    /// The number of glyphs in the table.
    pub const fn glyph_count(&self) -> usize {
        if self.glyph_len() == 0 {
            0
        } else {
            self.table.len() / self.glyph_len()
        }
    }

    fn index_of(&self, c: char) -> Option<usize> {
        let code = c as u32;
        let first = self.first_char as u32;
        if code < first {
            return None;
        }
        let index = (code - first) as usize;
        (index < self.glyph_count()).then_some(index)
    }

    /// The rows of the glyph for `c`, substituting a space when `c` isn't in the table.
    ///
    /// Returns `None` only if neither `c` nor the space character is available.
    pub fn glyph(&self, c: char) -> Option<&'a [u8]> {
        let index = self.index_of(c).or_else(|| self.index_of(' '))?;
        let start = index * self.glyph_len();
        self.table.get(start..start + self.glyph_len())
    }
}

/// Column-major 5x7 glyphs for ASCII 0x20..=0x7E, bit 0 at the top.
const COLUMNS_5X7: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // !
    [0x00, 0x07, 0x00, 0x07, 0x00], // "
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // #
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // $
    [0x23, 0x13, 0x08, 0x64, 0x62], // %
    [0x36, 0x49, 0x55, 0x22, 0x50], // &
    [0x00, 0x05, 0x03, 0x00, 0x00], // '
    [0x00, 0x1C, 0x22, 0x41, 0x00], // (
    [0x00, 0x41, 0x22, 0x1C, 0x00], // )
    [0x08, 0x2A, 0x1C, 0x2A, 0x08], // *
    [0x08, 0x08, 0x3E, 0x08, 0x08], // +
    [0x00, 0x50, 0x30, 0x00, 0x00], // ,
    [0x08, 0x08, 0x08, 0x08, 0x08], // -
    [0x00, 0x60, 0x60, 0x00, 0x00], // .
    [0x20, 0x10, 0x08, 0x04, 0x02], // /
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // 0
    [0x00, 0x42, 0x7F, 0x40, 0x00], // 1
    [0x42, 0x61, 0x51, 0x49, 0x46], // 2
    [0x21, 0x41, 0x45, 0x4B, 0x31], // 3
    [0x18, 0x14, 0x12, 0x7F, 0x10], // 4
    [0x27, 0x45, 0x45, 0x45, 0x39], // 5
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // 6
    [0x01, 0x71, 0x09, 0x05, 0x03], // 7
    [0x36, 0x49, 0x49, 0x49, 0x36], // 8
    [0x06, 0x49, 0x49, 0x29, 0x1E], // 9
    [0x00, 0x36, 0x36, 0x00, 0x00], // :
    [0x00, 0x56, 0x36, 0x00, 0x00], // ;
    [0x08, 0x14, 0x22, 0x41, 0x00], // <
    [0x14, 0x14, 0x14, 0x14, 0x14], // =
    [0x00, 0x41, 0x22, 0x14, 0x08], // >
    [0x02, 0x01, 0x51, 0x09, 0x06], // ?
    [0x32, 0x49, 0x79, 0x41, 0x3E], // @
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // A
    [0x7F, 0x49, 0x49, 0x49, 0x36], // B
    [0x3E, 0x41, 0x41, 0x41, 0x22], // C
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // D
    [0x7F, 0x49, 0x49, 0x49, 0x41], // E
    [0x7F, 0x09, 0x09, 0x09, 0x01], // F
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // G
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // H
    [0x00, 0x41, 0x7F, 0x41, 0x00], // I
    [0x20, 0x40, 0x41, 0x3F, 0x01], // J
    [0x7F, 0x08, 0x14, 0x22, 0x41], // K
    [0x7F, 0x40, 0x40, 0x40, 0x40], // L
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // M
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // N
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // O
    [0x7F, 0x09, 0x09, 0x09, 0x06], // P
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // Q
    [0x7F, 0x09, 0x19, 0x29, 0x46], // R
    [0x46, 0x49, 0x49, 0x49, 0x31], // S
    [0x01, 0x01, 0x7F, 0x01, 0x01], // T
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // U
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // V
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // W
    [0x63, 0x14, 0x08, 0x14, 0x63], // X
    [0x07, 0x08, 0x70, 0x08, 0x07], // Y
    [0x61, 0x51, 0x49, 0x45, 0x43], // Z
    [0x00, 0x7F, 0x41, 0x41, 0x00], // [
    [0x02, 0x04, 0x08, 0x10, 0x20], // \
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ]
    [0x04, 0x02, 0x01, 0x02, 0x04], // ^
    [0x40, 0x40, 0x40, 0x40, 0x40], // _
    [0x00, 0x01, 0x02, 0x04, 0x00], // `
    [0x20, 0x54, 0x54, 0x54, 0x78], // a
    [0x7F, 0x48, 0x44, 0x44, 0x38], // b
    [0x38, 0x44, 0x44, 0x44, 0x20], // c
    [0x38, 0x44, 0x44, 0x48, 0x7F], // d
    [0x38, 0x54, 0x54, 0x54, 0x18], // e
    [0x08, 0x7E, 0x09, 0x01, 0x02], // f
    [0x0C, 0x52, 0x52, 0x52, 0x3E], // g
    [0x7F, 0x08, 0x04, 0x04, 0x78], // h
    [0x00, 0x44, 0x7D, 0x40, 0x00], // i
    [0x20, 0x40, 0x44, 0x3D, 0x00], // j
    [0x7F, 0x10, 0x28, 0x44, 0x00], // k
    [0x00, 0x41, 0x7F, 0x40, 0x00], // l
    [0x7C, 0x04, 0x18, 0x04, 0x78], // m
    [0x7C, 0x08, 0x04, 0x04, 0x78], // n
    [0x38, 0x44, 0x44, 0x44, 0x38], // o
    [0x7C, 0x14, 0x14, 0x14, 0x08], // p
    [0x08, 0x14, 0x14, 0x18, 0x7C], // q
    [0x7C, 0x08, 0x04, 0x04, 0x08], // r
    [0x48, 0x54, 0x54, 0x54, 0x20], // s
    [0x04, 0x3F, 0x44, 0x40, 0x20], // t
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // u
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // v
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // w
    [0x44, 0x28, 0x10, 0x28, 0x44], // x
    [0x0C, 0x50, 0x50, 0x50, 0x3C], // y
    [0x44, 0x64, 0x54, 0x4C, 0x44], // z
    [0x00, 0x08, 0x36, 0x41, 0x00], // {
    [0x00, 0x00, 0x7F, 0x00, 0x00], // |
    [0x00, 0x41, 0x36, 0x08, 0x00], // }
    [0x08, 0x04, 0x08, 0x10, 0x08], // ~
];

/// Converts the column-major glyphs into one byte per row, leaving the sixth column blank as
/// spacing.
const fn rows_6x8(columns: &[[u8; 5]; 95]) -> [u8; 95 * 8] {
    let mut table = [0u8; 95 * 8];
    let mut glyph = 0;
    while glyph < 95 {
        let mut row = 0;
        while row < 8 {
            let mut byte = 0u8;
            let mut col = 0;
            while col < 5 {
                if columns[glyph][col] & (1 << row) != 0 {
                    byte |= 0x80 >> col;
                }
                col += 1;
            }
            table[glyph * 8 + row] = byte;
            row += 1;
        }
        glyph += 1;
    }
    table
}

static FONT_6X8_TABLE: [u8; 95 * 8] = rows_6x8(&COLUMNS_5X7);

/// A 6x8 ASCII font (5x7 glyphs plus one column and one row of spacing).
pub static FONT_6X8: FixedFont<'static> = FixedFont::new(&FONT_6X8_TABLE, 6, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_6x8_layout() {
        assert_eq!(FONT_6X8.bytes_per_row(), 1);
        assert_eq!(FONT_6X8.glyph_count(), 95);

        // 'H': two full-height columns joined in the middle row.
        let h = FONT_6X8.glyph('H').unwrap();
        assert_eq!(h[0], 0b1000_1000);
        assert_eq!(h[3], 0b1111_1000);
        assert_eq!(h[7], 0);
    }

    #[test]
    fn test_space_is_blank() {
        assert!(FONT_6X8.glyph(' ').unwrap().iter().all(|r| *r == 0));
    }

    #[test]
    fn test_unknown_characters_substitute_space() {
        assert_eq!(FONT_6X8.glyph('\u{7f}'), FONT_6X8.glyph(' '));
        assert_eq!(FONT_6X8.glyph('é'), FONT_6X8.glyph(' '));
        assert_eq!(FONT_6X8.glyph('\n'), FONT_6X8.glyph(' '));
    }

    #[test]
    fn test_wide_font_rows() {
        // Two 10 pixel wide glyphs of 2 rows each, starting at 'A'.
        const TABLE: [u8; 8] = [0xFF, 0xC0, 0x80, 0x40, 0x00, 0x00, 0x12, 0x34];
        let font = FixedFont::new(&TABLE, 10, 2).with_first_char(b'A');
        assert_eq!(font.bytes_per_row(), 2);
        assert_eq!(font.glyph_count(), 2);
        assert_eq!(font.glyph('B'), Some(&TABLE[4..8]));
        // No space in this table.
        assert_eq!(font.glyph('z'), None);
    }
}
