//! Bitmap fonts.
//!
//! Two formats are supported:
//!
//! - [FixedFont]: every glyph has the same width and height, rows stored MSB-first. Drawn with
//!   [Canvas::draw_char_at](crate::canvas::Canvas::draw_char_at).
//! - [VariableFont]: glyphs of varying size, each with its own offsets and advance, packed into a
//!   continuous bitstream. Text is rendered one scanline at a time with
//!   [VariableFont::fill_pixel_line], usually through [ActiveFont] and
//!   [Canvas::print](crate::canvas::Canvas::print).
mod fixed;
mod variable;

pub use fixed::{FixedFont, FONT_6X8};
#[cfg(feature = "alloc")]
pub use variable::OwnedVariableFont;
pub use variable::{ActiveFont, FontMetrics, FontSlot, Glyph, VariableFont};

#[cfg(test)]
pub(crate) use variable::tests::TEST_FONT;
