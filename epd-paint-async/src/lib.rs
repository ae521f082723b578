//! This crate drives 1.54" monochrome Waveshare e-paper panels and provides a small 1-bit paint
//! engine for preparing the images that get pushed to them.
//!
//! It is built on top of `embedded-hal-async` and `embedded-graphics`, making it compatible with a
//! wide range of embedded platforms.
//!
//! ## Organisation
//!
//! - [`EpdHw`]: abstracts over the hardware needed to talk to a panel: the Data/Command, Reset
//!   and Busy lines, and a delay timer. The SPI device is handed to each driver call separately.
//! - [`epd1in54::Epd1In54`]: the protocol driver. It owns the reset/init/LUT sequencing, the RAM
//!   window addressing and the refresh trigger. Its type parameter tracks whether the panel is
//!   uninitialised, ready or asleep, and the [`Reset`], [`Sleep`] and [`Displayable`] traits move
//!   it between those states.
//! - [`canvas::Canvas`]: a bit-packed framebuffer with rotation aware plotting, plus the vector
//!   primitives in [`primitives`].
//! - [`font`]: fixed-width bitmap fonts (see [`font::FONT_6X8`]) and variable-width glyph fonts
//!   with per-glyph metrics. [`text`] lays strings out on a canvas.
//!
//! ## Colour polarity
//!
//! The panel shows a white pixel for a set bit. Drawing calls take a `colored` flag and the
//! canvas [`canvas::Polarity`] decides whether that sets or clears the bit. Use
//! [`canvas::Polarity::fill_byte`] when clearing panel RAM so both sides agree.
#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(test)]
extern crate std;

use thiserror::Error as ThisError;

pub mod canvas;
pub mod epd1in54;
pub mod font;
pub mod primitives;
pub mod text;

mod hw;
mod log;

pub use hw::{EpdHw, BUSY_POLL_INTERVAL_MS};

/// Hardware reset of a display.
#[allow(async_fn_in_trait)]
pub trait Reset<ERROR> {
    type DisplayOut;

    /// Pulses the reset line. A sleeping display must be initialised again afterwards.
    async fn reset(self) -> Result<Self::DisplayOut, ERROR>;
}

/// Deep sleep.
#[allow(async_fn_in_trait)]
pub trait Sleep<SPI, ERROR> {
    type DisplayOut;

    /// Puts the display into its low power mode. Only a [Reset] wakes it up again.
    async fn sleep(self, spi: &mut SPI) -> Result<Self::DisplayOut, ERROR>;
}

/// Displays whatever is in the panel RAM.
#[allow(async_fn_in_trait)]
pub trait Displayable<SPI, ERROR> {
    /// Runs the update sequence and waits for it to finish.
    ///
    /// The panel has two RAM planes that swap after every refresh, so the next write goes to the
    /// plane that was just hidden.
    async fn refresh(&mut self, spi: &mut SPI) -> Result<(), ERROR>;
}

/// Errors raised by the crate itself, as opposed to the hardware.
///
/// [`EpdHw::Error`] must be convertible from this type so that driver operations can return a
/// single error type.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A bounded busy wait gave up before the panel went idle.
    #[error("display still busy after {polls} polls")]
    BusyTimeout { polls: u32 },
    /// The pixel buffer can't hold the requested canvas dimensions.
    #[error("buffer holds {actual} bytes but {required} are needed")]
    BufferTooSmall { required: usize, actual: usize },
    /// A rendered text line doesn't fit in the scanline buffer.
    #[error("text line needs {required} bytes but only {capacity} are available")]
    LineTooWide { required: usize, capacity: usize },
    /// A raw LUT selector outside the defined refresh modes.
    #[error("invalid LUT mode {0}")]
    InvalidLutMode(u8),
}
