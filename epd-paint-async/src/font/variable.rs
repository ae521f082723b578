#[cfg(feature = "alloc")]
use alloc::{boxed::Box, vec::Vec};

use crate::log::debug;

/// Placement and bitmap location of a single glyph in a [VariableFont].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Glyph {
    /// Byte offset of the glyph's bits in the font bitmap.
    pub bitmap_offset: u16,
    pub width: u8,
    pub height: u8,
    /// How far to move the cursor after this glyph.
    pub x_advance: u8,
    /// Distance from the cursor to the glyph's left edge.
    pub x_offset: i8,
    /// Distance from the baseline to the glyph's top edge. Usually negative.
    pub y_offset: i8,
}

impl Glyph {
    pub const fn new(
        bitmap_offset: u16,
        width: u8,
        height: u8,
        x_advance: u8,
        x_offset: i8,
        y_offset: i8,
    ) -> Self {
        Self {
            bitmap_offset,
            width,
            height,
            x_advance,
            x_offset,
            y_offset,
        }
    }
}

/// Font-wide measurements derived from the glyph table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontMetrics {
    /// Height of a text line: from the highest glyph top (or the baseline) to the lowest glyph
    /// bottom (or the baseline).
    pub height: u16,
    /// The larger of the widest glyph and the largest advance.
    pub width: u16,
    pub min_x_offset: i8,
    /// Offset of the top of a text line relative to the baseline.
    pub min_y_offset: i8,
}

impl FontMetrics {
    const UNSET: Self = Self {
        height: 0,
        width: 0,
        min_x_offset: 0,
        min_y_offset: 0,
    };

    /// Metrics are considered missing when both the height and width are zero.
    pub const fn is_unset(&self) -> bool {
        self.height == 0 && self.width == 0
    }
}

/// A variable-width font.
///
/// Glyph bitmaps are packed into one continuous bitstream: each glyph's rows follow each other
/// without padding, `width` bits per row, most significant bit first. Glyph `i` describes the
/// character `first + i`.
///
/// Rendering uses the font's [FontMetrics]. Fonts declared without metrics get them from
/// [ActiveFont::set_font], or use [VariableFont::with_metrics] with the result of
/// [VariableFont::analyze].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableFont<'a> {
    bitmap: &'a [u8],
    glyphs: &'a [Glyph],
    first: u8,
    last: u8,
    y_advance: u8,
    metrics: FontMetrics,
}

impl<'a> VariableFont<'a> {
    pub const fn new(
        bitmap: &'a [u8],
        glyphs: &'a [Glyph],
        first: u8,
        last: u8,
        y_advance: u8,
    ) -> Self {
        Self {
            bitmap,
            glyphs,
            first,
            last,
            y_advance,
            metrics: FontMetrics::UNSET,
        }
    }

    /// Attaches precomputed metrics.
    pub const fn with_metrics(mut self, metrics: FontMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub const fn bitmap(&self) -> &'a [u8] {
        self.bitmap
    }

    pub const fn glyphs(&self) -> &'a [Glyph] {
        self.glyphs
    }

    pub const fn first(&self) -> u8 {
        self.first
    }

    pub const fn last(&self) -> u8 {
        self.last
    }

    /// Distance between two baselines.
    pub const fn y_advance(&self) -> u8 {
        self.y_advance
    }

    pub const fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    /// Computes the font metrics from every glyph in `first..=last`.
    pub fn analyze(&self) -> FontMetrics {
        let count = (self.last as usize + 1).saturating_sub(self.first as usize);

        // The baseline is always part of the line box.
        let mut max_bottom = 0i32;
        let mut min_top = 0i32;
        let mut min_x_offset = 0i32;
        let mut max_width = 0u16;
        let mut max_advance = 0u16;
        for glyph in self.glyphs.iter().take(count) {
            max_bottom = max_bottom.max(glyph.height as i32 + glyph.y_offset as i32);
            min_top = min_top.min(glyph.y_offset as i32);
            min_x_offset = min_x_offset.min(glyph.x_offset as i32);
            max_width = max_width.max(glyph.width as u16);
            max_advance = max_advance.max(glyph.x_advance as u16);
        }

        let metrics = FontMetrics {
            height: (max_bottom - min_top) as u16,
            width: max_width.max(max_advance),
            min_x_offset: min_x_offset as i8,
            min_y_offset: min_top as i8,
        };
        debug!(
            "Font size {}x{}, min offsets ({}, {}), {} glyphs",
            metrics.width,
            metrics.height,
            metrics.min_x_offset,
            metrics.min_y_offset,
            count
        );
        metrics
    }

    /// The glyph for `c`, if the font defines it.
    pub fn glyph(&self, c: char) -> Option<&'a Glyph> {
        let code = c as u32;
        if code < self.first as u32 || code > self.last as u32 {
            return None;
        }
        self.glyphs.get((code - self.first as u32) as usize)
    }

    fn glyph_or_space(&self, c: char) -> Option<&'a Glyph> {
        self.glyph(c).or_else(|| {
            debug!("Character {:#x} is not in font, using ' '", c as u32);
            self.glyph(' ')
        })
    }

    fn bit(&self, index: usize) -> bool {
        self.bitmap
            .get(index / 8)
            .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0)
    }

    /// Walks the glyphs of `text`, calling `place` with each glyph and the x position of its left
    /// edge. Returns the total width of the line.
    fn layout(&self, text: &str, mut place: impl FnMut(&Glyph, i32)) -> u16 {
        let mut cursor = 0i32;
        let mut first = true;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            let Some(glyph) = self.glyph_or_space(c) else {
                continue;
            };
            let x_offset = glyph.x_offset as i32;
            let width = glyph.width as i32;
            let advance = glyph.x_advance as i32;

            // A leading glyph that hangs left of the cursor widens the line instead of clipping.
            if first && x_offset < 0 {
                cursor = -x_offset;
            }
            first = false;

            place(glyph, cursor + x_offset);
            cursor += advance;

            if chars.peek().is_none() && x_offset + width > advance {
                cursor += x_offset + width - advance;
            }
        }
        cursor.clamp(0, u16::MAX as i32) as u16
    }

    /// Renders scanline `line` of `text` into `buf`, one bit per pixel, MSB-first.
    ///
    /// Line 0 is the top of the text box (see [FontMetrics::min_y_offset]). Each set glyph bit
    /// sets the matching bit of `buf` when `colored`, and clears it otherwise; other bits are left
    /// untouched. Pixels beyond the end of `buf` are dropped.
    ///
    /// Returns the width in pixels of the whole line, which is the same for every scanline.
    pub fn fill_pixel_line(&self, text: &str, line: u16, buf: &mut [u8], colored: bool) -> u16 {
        let line = line as i32;
        let min_y_offset = self.metrics.min_y_offset as i32;
        self.layout(text, |glyph, left| {
            let first_line = glyph.y_offset as i32 - min_y_offset;
            if line < first_line || line >= first_line + glyph.height as i32 {
                return;
            }

            let width = glyph.width as usize;
            let start = glyph.bitmap_offset as usize * 8 + width * (line - first_line) as usize;
            for i in 0..width {
                if !self.bit(start + i) {
                    continue;
                }
                let Ok(x) = usize::try_from(left + i as i32) else {
                    continue;
                };
                if let Some(byte) = buf.get_mut(x / 8) {
                    let mask = 0x80 >> (x % 8);
                    if colored {
                        *byte |= mask;
                    } else {
                        *byte &= !mask;
                    }
                }
            }
        })
    }

    /// The width in pixels `text` occupies when rendered.
    pub fn string_width(&self, text: &str) -> u16 {
        self.layout(text, |_, _| {})
    }

    /// The height in pixels `text` occupies when rendered: the font height, or 0 for an empty
    /// string.
    pub fn string_height(&self, text: &str) -> u16 {
        if text.is_empty() {
            0
        } else {
            self.metrics.height
        }
    }
}

/// A heap-allocated variable-width font, for example one parsed at runtime.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnedVariableFont {
    pub bitmap: Vec<u8>,
    pub glyphs: Vec<Glyph>,
    pub first: u8,
    pub last: u8,
    pub y_advance: u8,
    pub metrics: FontMetrics,
}

#[cfg(feature = "alloc")]
impl OwnedVariableFont {
    pub fn as_font(&self) -> VariableFont<'_> {
        VariableFont::new(
            &self.bitmap,
            &self.glyphs,
            self.first,
            self.last,
            self.y_advance,
        )
        .with_metrics(self.metrics)
    }
}

/// Where the active font comes from.
#[derive(Debug, Default)]
pub enum FontSlot<'a> {
    #[default]
    None,
    /// A font that outlives the slot, typically a `static`.
    Embedded(&'a VariableFont<'a>),
    /// A font owned by the slot. It is dropped when replaced.
    #[cfg(feature = "alloc")]
    Owned(Box<OwnedVariableFont>),
}

impl FontSlot<'_> {
    pub fn font(&self) -> Option<VariableFont<'_>> {
        match self {
            FontSlot::None => None,
            FontSlot::Embedded(font) => Some(**font),
            #[cfg(feature = "alloc")]
            FontSlot::Owned(font) => Some(font.as_font()),
        }
    }
}

/// Holds the font used for printing, along with its metrics.
///
/// All measuring and rendering methods return 0 while no font is set.
#[derive(Debug, Default)]
pub struct ActiveFont<'a> {
    slot: FontSlot<'a>,
    metrics: FontMetrics,
}

impl<'a> ActiveFont<'a> {
    pub const fn new() -> Self {
        Self {
            slot: FontSlot::None,
            metrics: FontMetrics::UNSET,
        }
    }

    /// Replaces the active font, dropping any previously owned one.
    ///
    /// Metrics are computed here unless the font already carries them. Setting the same embedded
    /// font again keeps the cached metrics without rescanning its glyphs. Returns false if `slot`
    /// is [FontSlot::None], which leaves no font active.
    pub fn set_font(&mut self, slot: FontSlot<'a>) -> bool {
        let metrics = if self.holds_same_embedded(&slot) {
            Some(self.metrics)
        } else {
            slot.font().map(|font| {
                if font.metrics().is_unset() {
                    font.analyze()
                } else {
                    font.metrics()
                }
            })
        };

        self.slot = slot;
        match metrics {
            Some(metrics) => {
                self.metrics = metrics;
                true
            }
            None => {
                debug!("Font cleared");
                self.metrics = FontMetrics::UNSET;
                false
            }
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.slot, FontSlot::None)
    }

    /// Whether `slot` borrows the very font already active, with metrics cached for it.
    fn holds_same_embedded(&self, slot: &FontSlot<'a>) -> bool {
        match (&self.slot, slot) {
            (FontSlot::Embedded(current), FontSlot::Embedded(new)) => {
                core::ptr::eq(*current, *new) && !self.metrics.is_unset()
            }
            _ => false,
        }
    }

    pub fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    /// The active font, carrying the cached metrics.
    pub fn font(&self) -> Option<VariableFont<'_>> {
        self.slot
            .font()
            .map(|font| font.with_metrics(self.metrics))
    }

    /// See [VariableFont::fill_pixel_line].
    pub fn fill_pixel_line(&self, text: &str, line: u16, buf: &mut [u8], colored: bool) -> u16 {
        self.font()
            .map_or(0, |font| font.fill_pixel_line(text, line, buf, colored))
    }

    pub fn string_width(&self, text: &str) -> u16 {
        self.font().map_or(0, |font| font.string_width(text))
    }

    pub fn string_height(&self, text: &str) -> u16 {
        self.font().map_or(0, |font| font.string_height(text))
    }
}
