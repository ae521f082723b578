use core::{cmp::min, convert::Infallible};

use embedded_graphics::{
    pixelcolor::BinaryColor,
    prelude::{DrawTarget, OriginDimensions, Size},
    Pixel,
};

use crate::{log::debug, Error};

/// How the logical drawing surface maps onto the packed buffer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Maps a logical coordinate onto the absolute buffer coordinate for a buffer of
    /// `width` x `height` pixels.
    ///
    /// Returns `None` when the logical coordinate lies outside the rotated bounds. Note that the
    /// 90/180/270 degree mappings reflect around `width`/`height` rather than `width - 1`, so the
    /// first logical row or column lands just outside the buffer and is dropped by
    /// [Canvas::plot_absolute].
    pub const fn transform(self, x: i32, y: i32, width: i32, height: i32) -> Option<(i32, i32)> {
        if x < 0 || y < 0 {
            return None;
        }
        match self {
            Rotation::Rotate0 => {
                if x >= width || y >= height {
                    None
                } else {
                    Some((x, y))
                }
            }
            Rotation::Rotate90 => {
                if x >= height || y >= width {
                    None
                } else {
                    Some((width - y, x))
                }
            }
            Rotation::Rotate180 => {
                if x >= width || y >= height {
                    None
                } else {
                    Some((width - x, height - y))
                }
            }
            Rotation::Rotate270 => {
                if x >= height || y >= width {
                    None
                } else {
                    Some((y, height - x))
                }
            }
        }
    }

    /// Whether logical x runs along the buffer's y axis.
    pub const fn is_transposed(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Decides what a "colored" pixel means in the packed buffer.
///
/// The panel displays a set bit as white. With [Polarity::SetWhenColored] a colored pixel sets its
/// bit, with [Polarity::ClearWhenColored] it clears it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    SetWhenColored,
    ClearWhenColored,
}

impl Polarity {
    /// The bit value a pixel takes when drawn with `colored`.
    pub const fn bit(self, colored: bool) -> bool {
        match self {
            Polarity::SetWhenColored => colored,
            Polarity::ClearWhenColored => !colored,
        }
    }

    /// A whole byte of pixels drawn with `colored`. Use this for
    /// [crate::epd1in54::Epd1In54::clear] so that panel RAM and canvas agree.
    pub const fn fill_byte(self, colored: bool) -> u8 {
        if self.bit(colored) {
            0xFF
        } else {
            0x00
        }
    }
}

/// Rounds a width up to the next whole byte of pixels.
pub const fn align_width(width: u32) -> u32 {
    if width % 8 == 0 {
        width
    } else {
        width + 8 - (width % 8)
    }
}

/// The number of bytes needed to hold `width` x `height` pixels, with `width` rounded up to a
/// multiple of 8.
pub const fn buffer_length(width: u32, height: u32) -> usize {
    (align_width(width) as usize / 8) * height as usize
}

/// A 1-bit-per-pixel drawing surface over a byte buffer.
///
/// Pixels are packed row-major, MSB-first: pixel (x, y) lives in byte `(x + y * width) / 8` at
/// bit `7 - x % 8`. The buffer can be owned (e.g. `[u8; N]`) or borrowed (`&mut [u8]`).
///
/// Width and height can be changed after construction so a single buffer can be reused for
/// differently sized regions. Growing the canvas beyond the buffer is allowed but pixels that
/// don't fit are dropped.
///
/// ```
/// use epd_paint_async::canvas::{buffer_length, Canvas};
///
/// let mut canvas = Canvas::new([0u8; buffer_length(16, 2)], 16, 2).unwrap();
/// canvas.plot(9, 1, true);
/// assert_eq!(canvas.data(), &[0x00, 0x00, 0x00, 0b0100_0000]);
/// ```
pub struct Canvas<B> {
    buffer: B,
    width: u32,
    height: u32,
    rotation: Rotation,
    polarity: Polarity,
}

impl<B> Canvas<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Creates a canvas over `buffer`. The width is rounded up to a multiple of 8.
    pub fn new(buffer: B, width: u32, height: u32) -> Result<Self, Error> {
        let required = buffer_length(width, height);
        let actual = buffer.as_ref().len();
        if actual < required {
            return Err(Error::BufferTooSmall { required, actual });
        }
        Ok(Self {
            buffer,
            width: align_width(width),
            height,
            rotation: Rotation::Rotate0,
            polarity: Polarity::SetWhenColored,
        })
    }

    /// Sets the colour polarity. See [Polarity].
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Sets the width, rounding it up to a multiple of 8.
    pub fn set_width(&mut self, width: u32) {
        self.width = align_width(width);
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        debug!("Rotate to {:?}", rotation);
        self.rotation = rotation;
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// The packed pixel data for the current width and height.
    pub fn data(&self) -> &[u8] {
        let buffer = self.buffer.as_ref();
        &buffer[..min(buffer_length(self.width, self.height), buffer.len())]
    }

    /// Releases the underlying buffer.
    pub fn into_inner(self) -> B {
        self.buffer
    }

    fn locate(&self, x: i32, y: i32) -> Option<(usize, u8)> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        let index = (x as usize + y as usize * self.width as usize) >> 3;
        let mask = 0x80 >> (x as usize & 7);
        Some((index, mask))
    }

    /// Draws a pixel at buffer coordinates, ignoring rotation. Pixels outside the canvas are
    /// dropped silently.
    pub fn plot_absolute(&mut self, x: i32, y: i32, colored: bool) {
        let Some((index, mask)) = self.locate(x, y) else {
            return;
        };
        let set = self.polarity.bit(colored);
        if let Some(byte) = self.buffer.as_mut().get_mut(index) {
            if set {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    /// Draws a pixel at logical coordinates, applying the current rotation.
    pub fn plot(&mut self, x: i32, y: i32, colored: bool) {
        if let Some((x, y)) =
            self.rotation
                .transform(x, y, self.width as i32, self.height as i32)
        {
            self.plot_absolute(x, y, colored);
        }
    }

    /// Reads back whether the pixel at buffer coordinates is colored. Returns `None` outside the
    /// canvas.
    pub fn pixel(&self, x: i32, y: i32) -> Option<bool> {
        let (index, mask) = self.locate(x, y)?;
        let bit = self.buffer.as_ref().get(index)? & mask != 0;
        Some(bit == self.polarity.bit(true))
    }

    /// Sets every pixel of the canvas to `colored`.
    pub fn clear(&mut self, colored: bool) {
        debug!("Clear canvas");
        // Every bit in the active region takes the same value, and the width is byte aligned.
        let fill = self.polarity.fill_byte(colored);
        let len = buffer_length(self.width, self.height);
        let buffer = self.buffer.as_mut();
        let len = min(len, buffer.len());
        buffer[..len].fill(fill);
    }
}

impl<B> OriginDimensions for Canvas<B> {
    fn size(&self) -> Size {
        if self.rotation.is_transposed() {
            Size::new(self.height, self.width)
        } else {
            Size::new(self.width, self.height)
        }
    }
}

/// Draws with `BinaryColor::On` as colored, honouring rotation.
impl<B> DrawTarget for Canvas<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    type Color = BinaryColor;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels.into_iter() {
            self.plot(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}
