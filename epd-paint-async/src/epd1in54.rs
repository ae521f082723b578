use bitflags::bitflags;
use embedded_graphics::prelude::Size;
use embedded_hal::{
    digital::OutputPin,
    spi::{Phase, Polarity},
};
use embedded_hal_async::delay::DelayNs;

use crate::{
    hw::{BusyWait as _, CommandDataSend as _},
    log::{debug, error_log, trace, warn_log},
    Displayable, EpdHw, Error, Reset, Sleep,
};

/// LUT for a full refresh. Slow, but clears ghosting.
pub const LUT_FULL_UPDATE: [u8; 30] = [
    0x02, 0x02, 0x01, 0x11, 0x12, 0x12, 0x22, 0x22, 0x66, 0x69, 0x69, 0x59, 0x58, 0x99, 0x99, 0x88,
    0x00, 0x00, 0x00, 0x00, 0xF8, 0xB4, 0x13, 0x51, 0x35, 0x51, 0x51, 0x19, 0x01, 0x00,
];
/// LUT for a partial refresh. Fast, but leaves some ghosting behind, so do a full refresh every
/// now and then.
pub const LUT_PARTIAL_UPDATE: [u8; 30] = [
    0x10, 0x18, 0x18, 0x08, 0x18, 0x18, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x13, 0x14, 0x44, 0x12, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The refresh mode for the display, which selects the waveform LUT.
pub enum RefreshMode {
    /// Redraws every pixel. Use this at start up and occasionally afterwards.
    Full,
    /// Only drives the pixels that changed since the last refresh.
    Partial,
}

impl RefreshMode {
    /// Returns the LUT to use for this refresh mode.
    pub fn lut(&self) -> &'static [u8; 30] {
        match self {
            RefreshMode::Full => &LUT_FULL_UPDATE,
            RefreshMode::Partial => &LUT_PARTIAL_UPDATE,
        }
    }

    /// The raw configuration value for this mode, see [RefreshMode::try_from].
    pub fn code(&self) -> u8 {
        match self {
            RefreshMode::Full => 0,
            RefreshMode::Partial => 1,
        }
    }
}

impl TryFrom<u8> for RefreshMode {
    type Error = Error;

    /// Parses a raw configuration value: 0 is [RefreshMode::Full], 1 is [RefreshMode::Partial].
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RefreshMode::Full),
            1 => Ok(RefreshMode::Partial),
            _ => Err(Error::InvalidLutMode(code)),
        }
    }
}

/// The width of the display.
pub const DISPLAY_WIDTH: u16 = 200;
/// The height of the display.
pub const DISPLAY_HEIGHT: u16 = 200;
pub const RECOMMENDED_SPI_HZ: u32 = 500_000; // 500 kHz
/// SPI mode 0: use this phase in conjunction with [RECOMMENDED_SPI_POLARITY].
pub const RECOMMENDED_SPI_PHASE: Phase = Phase::CaptureOnFirstTransition;
/// SPI mode 0: use this polarity in conjunction with [RECOMMENDED_SPI_PHASE].
pub const RECOMMENDED_SPI_POLARITY: Polarity = Polarity::IdleLow;
/// How long the reset line is held low, and how long to wait after releasing it.
pub const RESET_DELAY_MS: u32 = 200;

/// Low-level commands for the Epd1In54. You probably want to use the other methods exposed on the
/// [Epd1In54] for most operations, but can send commands directly with [Epd1In54::send] for
/// low-level control or experimentation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Sets the number of gate lines (the panel height minus one) and the scan order.
    DriverOutputControl = 0x01,
    /// Used to configure the on chip voltage booster and regulator.
    BoosterSoftStartControl = 0x0C,
    /// Sets the first gate line to scan.
    GateScanStartPosition = 0x0F,
    /// Enters deep sleep mode. Requires a hardware reset and reinitialisation to wake up.
    DeepSleepMode = 0x10,
    /// Changes the auto-increment behaviour of the address counter. See [DataEntryMode].
    DataEntryModeSetting = 0x11,
    /// Resets all commands and parameters to default values (except deep sleep mode).
    SwReset = 0x12,
    /// Writes to the temperature register.
    TemperatureSensorControl = 0x1A,
    /// Activates the display update sequence configured with [Command::DisplayUpdateControl2].
    /// This operation must not be interrupted.
    MasterActivation = 0x20,
    /// Controls RAM bypass options for the update sequence.
    DisplayUpdateControl1 = 0x21,
    /// Configures the display update sequence for use with [Command::MasterActivation].
    DisplayUpdateControl2 = 0x22,
    /// Writes data to RAM, auto-incrementing the address counter.
    WriteRam = 0x24,
    /// Writes to the VCOM register.
    WriteVcom = 0x2C,
    /// Writes the LUT register (30 bytes).
    WriteLut = 0x32,
    /// Sets the number of dummy lines per gate.
    SetDummyLinePeriod = 0x3A,
    /// Sets the gate line width.
    SetGateLineWidth = 0x3B,
    /// Register to configure the behaviour of the border.
    BorderWaveformControl = 0x3C,
    /// Sets the start and end positions of the X axis for the auto-incrementing address counter.
    /// Start and end are inclusive, and sent as byte numbers (x >> 3).
    SetRamXStartEnd = 0x44,
    /// Sets the start and end positions of the Y axis for the auto-incrementing address counter.
    /// Start and end are inclusive.
    SetRamYStartEnd = 0x45,
    /// Sets the current x coordinate of the address counter, as a byte number (x >> 3).
    SetRamX = 0x4E,
    /// Sets the current y coordinate of the address counter.
    SetRamY = 0x4F,
    /// Does nothing, but terminates other commands such as [Command::WriteRam].
    Noop = 0xFF,
}

impl Command {
    /// Returns the register address for this command.
    fn register(&self) -> u8 {
        *self as u8
    }
}

bitflags! {
    /// Data sent with [Command::DataEntryModeSetting].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataEntryMode: u8 {
        /// Increment X after each byte, otherwise decrement.
        const X_INCREMENT = 0b001;
        /// Increment Y after each line, otherwise decrement.
        const Y_INCREMENT = 0b010;
        /// Move along Y first instead of X.
        const Y_DIRECTION = 0b100;
    }
}

/// This should be sent with [Command::BoosterSoftStartControl] during initialisation.
const BOOSTER_SOFT_START_INIT_DATA: [u8; 3] = [0xD7, 0xD6, 0x9D];
/// VCOM 7C.
const VCOM_INIT_DATA: u8 = 0xA8;
/// 4 dummy lines per gate.
const DUMMY_LINE_PERIOD_INIT_DATA: u8 = 0x1A;
/// 2us per line.
const GATE_LINE_WIDTH_INIT_DATA: u8 = 0x08;
/// Enable the clock and charge pump, load the temperature and LUT, display, then power down.
const DISPLAY_UPDATE_SEQUENCE: u8 = 0xC4;
/// Bytes sent per transfer when filling the panel RAM.
const CLEAR_CHUNK_LEN: usize = 64;

/// A rectangle of panel RAM, with inclusive ends.
///
/// X values are pixel columns, but the panel only addresses whole bytes: they are sent as
/// `x >> 3`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWindow {
    pub x_start: u16,
    pub y_start: u16,
    pub x_end: u16,
    pub y_end: u16,
}

impl MemoryWindow {
    /// Computes the window for an image of `width` x `height` pixels placed at (x, y).
    ///
    /// `x` and `width` are truncated to multiples of 8 and the ends are clamped to the panel. Returns
    /// `None` when any value is negative, or when nothing of the image lands on the panel.
    pub fn clamped(x: i32, y: i32, width: i32, height: i32, panel: Size) -> Option<Self> {
        let x = x & !7;
        let width = width & !7;
        if x < 0 || y < 0 || width <= 0 || height <= 0 {
            return None;
        }

        let panel_width = panel.width as i64;
        let panel_height = panel.height as i64;
        let (x, y) = (x as i64, y as i64);
        if x >= panel_width || y >= panel_height {
            return None;
        }
        let x_end = (x + width as i64 - 1).min(panel_width - 1);
        let y_end = (y + height as i64 - 1).min(panel_height - 1);

        Some(Self {
            x_start: x as u16,
            y_start: y as u16,
            x_end: x_end as u16,
            y_end: y_end as u16,
        })
    }

    /// The number of image bytes that fill this window.
    pub fn byte_len(&self) -> usize {
        let rows = self.y_end.saturating_sub(self.y_start) as usize + 1;
        let columns = self.x_end.saturating_sub(self.x_start) as usize + 1;
        rows * (columns / 8)
    }
}

fn split_low_and_high(value: u16) -> (u8, u8) {
    let low = (value & 0xFF) as u8;
    let high = (value >> 8) as u8;
    (low, high)
}

/// Controls the 1.54" (v1) Waveshare e-paper display.
///
/// * [datasheet](https://www.waveshare.com/w/upload/e/e5/1.54inch_e-paper_V2_Datasheet.pdf)
/// * [sample code](https://github.com/waveshareteam/e-Paper/blob/master/RaspberryPi_JetsonNano/c/lib/e-Paper/EPD_1in54.c)
///
/// The type parameter tracks the panel state: [StateUninitialized] after construction or a reset
/// from sleep, [StateReady] after [Epd1In54::init], and [StateAsleep] after [Sleep::sleep].
///
/// Pixel data is 1 bit per pixel, MSB-first, rows of `width / 8` bytes, which is the layout of
/// [crate::canvas::Canvas::data]. A set bit is white.
pub struct Epd1In54<HW, STATE>
where
    HW: EpdHw,
    STATE: State,
{
    hw: HW,
    size: Size,
    state: STATE,
}

trait StateInternal {}
#[allow(private_bounds)]
pub trait State: StateInternal {}
pub trait StateAwake: State {}

macro_rules! impl_base_state {
    ($state:ident) => {
        impl StateInternal for $state {}
        impl State for $state {}
    };
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateUninitialized();
impl_base_state!(StateUninitialized);
impl StateAwake for StateUninitialized {}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateReady {
    mode: RefreshMode,
    dirty: bool,
}
impl_base_state!(StateReady);
impl StateAwake for StateReady {}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateAsleep();
impl_base_state!(StateAsleep);

impl<HW> Epd1In54<HW, StateUninitialized>
where
    HW: EpdHw,
{
    /// Creates a driver for a panel of the given size.
    pub fn new(hw: HW, size: Size) -> Self {
        Epd1In54 {
            hw,
            size,
            state: StateUninitialized(),
        }
    }

    /// Creates a driver for the standard 200x200 panel.
    pub fn with_default_size(hw: HW) -> Self {
        Self::new(hw, Size::new(DISPLAY_WIDTH as u32, DISPLAY_HEIGHT as u32))
    }
}

impl<HW, STATE> Epd1In54<HW, STATE>
where
    HW: EpdHw,
    STATE: State,
{
    /// The panel size in pixels.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Releases the hardware.
    pub fn into_hw(self) -> HW {
        self.hw
    }
}

impl<HW, STATE> Epd1In54<HW, STATE>
where
    HW: EpdHw,
    STATE: StateAwake,
{
    /// Initialise the display. This should be called before any other operations.
    pub async fn init(
        mut self,
        spi: &mut HW::Spi,
        mode: RefreshMode,
    ) -> Result<Epd1In54<HW, StateReady>, HW::Error> {
        debug!("Initialising display");
        self = self.reset().await?;

        let (height_low, height_high) =
            split_low_and_high(self.size.height.saturating_sub(1) as u16);
        // GD = 0, SM = 0, TB = 0.
        self.send(
            spi,
            Command::DriverOutputControl,
            &[height_low, height_high, 0x00],
        )
        .await?;
        self.send(
            spi,
            Command::BoosterSoftStartControl,
            &BOOSTER_SOFT_START_INIT_DATA,
        )
        .await?;
        self.send(spi, Command::WriteVcom, &[VCOM_INIT_DATA]).await?;
        self.send(
            spi,
            Command::SetDummyLinePeriod,
            &[DUMMY_LINE_PERIOD_INIT_DATA],
        )
        .await?;
        self.send(spi, Command::SetGateLineWidth, &[GATE_LINE_WIDTH_INIT_DATA])
            .await?;
        let entry_mode = DataEntryMode::X_INCREMENT | DataEntryMode::Y_INCREMENT;
        self.send(spi, Command::DataEntryModeSetting, &[entry_mode.bits()])
            .await?;

        self.send_lut(spi, mode).await?;

        Ok(Epd1In54 {
            hw: self.hw,
            size: self.size,
            // Nothing has been shown yet.
            state: StateReady { mode, dirty: true },
        })
    }

    async fn send_lut(&mut self, spi: &mut HW::Spi, mode: RefreshMode) -> Result<(), HW::Error> {
        debug!("Loading LUT for {:?}", mode);
        self.send(spi, Command::WriteLut, mode.lut()).await
    }

    /// Send the following command and data to the display.
    pub async fn send(
        &mut self,
        spi: &mut HW::Spi,
        command: Command,
        data: &[u8],
    ) -> Result<(), HW::Error> {
        self.hw.send(spi, command.register(), data).await
    }

    /// Waits until the busy line is released. This never times out.
    pub async fn wait_idle(&mut self) -> Result<(), HW::Error> {
        self.hw.wait_if_busy().await
    }

    /// Waits until the busy line is released, polling at most `max_polls` times.
    ///
    /// Fails with [Error::BusyTimeout] when the panel is still busy after that.
    pub async fn wait_idle_for(&mut self, max_polls: u32) -> Result<(), HW::Error> {
        self.hw.wait_if_busy_for(max_polls).await
    }
}

impl<HW: EpdHw> Epd1In54<HW, StateReady> {
    /// The currently loaded refresh mode.
    pub fn mode(&self) -> RefreshMode {
        self.state.mode
    }

    /// Loads the LUT for `mode`. Takes effect at the next refresh.
    pub async fn load_lut(&mut self, spi: &mut HW::Spi, mode: RefreshMode) -> Result<(), HW::Error> {
        self.send_lut(spi, mode).await?;
        self.state.mode = mode;
        Ok(())
    }

    /// Loads a LUT from a raw configuration value (see [RefreshMode::try_from]).
    ///
    /// Unknown values are logged and nothing is sent.
    pub async fn load_lut_code(&mut self, spi: &mut HW::Spi, code: u8) -> Result<(), HW::Error> {
        match RefreshMode::try_from(code) {
            Ok(mode) => self.load_lut(spi, mode).await,
            Err(_) => {
                error_log!("Invalid LUT mode {}", code);
                Ok(())
            }
        }
    }

    /// Sets the window of RAM that the next image data will be written to. Ends are inclusive.
    ///
    /// X values are sent as byte numbers, so their lower 3 bits are ignored.
    pub async fn set_memory_window(
        &mut self,
        spi: &mut HW::Spi,
        x_start: u16,
        y_start: u16,
        x_end: u16,
        y_end: u16,
    ) -> Result<(), HW::Error> {
        let x_start_byte = ((x_start >> 3) & 0xFF) as u8;
        let x_end_byte = ((x_end >> 3) & 0xFF) as u8;
        self.send(spi, Command::SetRamXStartEnd, &[x_start_byte, x_end_byte])
            .await?;

        let (y_start_low, y_start_high) = split_low_and_high(y_start);
        let (y_end_low, y_end_high) = split_low_and_high(y_end);
        self.send(
            spi,
            Command::SetRamYStartEnd,
            &[y_start_low, y_start_high, y_end_low, y_end_high],
        )
        .await
    }

    /// Moves the RAM address counter, then waits for the panel to be idle.
    ///
    /// The x value is sent as a byte number, so its lower 3 bits are ignored.
    pub async fn set_memory_pointer(
        &mut self,
        spi: &mut HW::Spi,
        x: u16,
        y: u16,
    ) -> Result<(), HW::Error> {
        self.send(spi, Command::SetRamX, &[((x >> 3) & 0xFF) as u8])
            .await?;
        let (y_low, y_high) = split_low_and_high(y);
        self.send(spi, Command::SetRamY, &[y_low, y_high]).await?;
        self.wait_idle().await
    }

    fn region_data<'b>(
        &self,
        buffer: &'b [u8],
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<Option<(MemoryWindow, &'b [u8])>, Error> {
        let Some(window) = MemoryWindow::clamped(x, y, width, height, self.size) else {
            warn_log!(
                "Ignoring region {}x{} at ({}, {}) outside the panel",
                width,
                height,
                x,
                y
            );
            return Ok(None);
        };
        let required = window.byte_len();
        match buffer.get(..required) {
            Some(data) => Ok(Some((window, data))),
            None => {
                warn_log!(
                    "Region needs {} bytes, buffer has {}",
                    required,
                    buffer.len()
                );
                Err(Error::BufferTooSmall {
                    required,
                    actual: buffer.len(),
                })
            }
        }
    }

    /// Writes an image of `width` x `height` pixels to panel RAM at (x, y). This doesn't refresh
    /// the display.
    ///
    /// `x` and `width` are truncated to multiples of 8, and the region is clipped to the panel.
    /// The panel fills the clipped window row by row from the start of `buffer`, so a region
    /// clipped on the right should be drawn with the clipped width. Regions with a negative value,
    /// or entirely off the panel, are ignored.
    ///
    /// Fails with [Error::BufferTooSmall] if `buffer` doesn't hold the clipped region.
    pub async fn push_region(
        &mut self,
        spi: &mut HW::Spi,
        buffer: &[u8],
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<(), HW::Error> {
        let Some((window, data)) = self.region_data(buffer, x, y, width, height)? else {
            return Ok(());
        };
        trace!(
            "Pushing {} bytes to ({}, {})..=({}, {})",
            data.len(),
            window.x_start,
            window.y_start,
            window.x_end,
            window.y_end
        );
        self.set_memory_window(
            spi,
            window.x_start,
            window.y_start,
            window.x_end,
            window.y_end,
        )
        .await?;
        self.set_memory_pointer(spi, window.x_start, window.y_start)
            .await?;
        self.send(spi, Command::WriteRam, data).await
    }

    /// Like [Epd1In54::push_region], but continues at the current RAM address counter instead of
    /// setting the window and pointer. Use it to stream an image in slices.
    pub async fn continue_region(
        &mut self,
        spi: &mut HW::Spi,
        buffer: &[u8],
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<(), HW::Error> {
        let Some((_, data)) = self.region_data(buffer, x, y, width, height)? else {
            return Ok(());
        };
        self.send(spi, Command::WriteRam, data).await
    }

    /// Fills the whole panel RAM with `color`, then waits for the panel to be idle. This doesn't
    /// refresh the display.
    ///
    /// Use [crate::canvas::Polarity::fill_byte] to get the byte matching a canvas background.
    pub async fn clear(&mut self, spi: &mut HW::Spi, color: u8) -> Result<(), HW::Error> {
        debug!("Clearing panel RAM with {:#x}", color);
        let x_end = self.size.width.saturating_sub(1) as u16;
        let y_end = self.size.height.saturating_sub(1) as u16;
        self.set_memory_window(spi, 0, 0, x_end, y_end).await?;
        self.set_memory_pointer(spi, 0, 0).await?;

        self.send(spi, Command::WriteRam, &[]).await?;
        let chunk = [color; CLEAR_CHUNK_LEN];
        let mut remaining = (self.size.width / 8) as usize * self.size.height as usize;
        while remaining > 0 {
            let len = remaining.min(CLEAR_CHUNK_LEN);
            self.hw.send_data(spi, &chunk[..len]).await?;
            remaining -= len;
        }
        self.wait_idle().await
    }

    /// Flags that panel RAM holds content that hasn't been displayed yet.
    pub fn mark_dirty(&mut self) {
        self.state.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty
    }

    /// Refreshes the display if it was marked dirty since the last refresh. Returns whether a
    /// refresh happened.
    pub async fn refresh_if_dirty(&mut self, spi: &mut HW::Spi) -> Result<bool, HW::Error> {
        if !self.state.dirty {
            return Ok(false);
        }
        self.refresh(spi).await?;
        Ok(true)
    }
}

impl<HW: EpdHw> Displayable<HW::Spi, HW::Error> for Epd1In54<HW, StateReady> {
    async fn refresh(&mut self, spi: &mut HW::Spi) -> Result<(), HW::Error> {
        debug!("Refreshing display");
        self.send(spi, Command::DisplayUpdateControl2, &[DISPLAY_UPDATE_SEQUENCE])
            .await?;
        self.send(spi, Command::MasterActivation, &[]).await?;
        self.send(spi, Command::Noop, &[]).await?;
        self.wait_idle().await?;
        self.state.dirty = false;
        Ok(())
    }
}

async fn reset_impl<HW: EpdHw>(hw: &mut HW) -> Result<(), HW::Error> {
    debug!("Resetting EPD");
    hw.dc().set_low()?;
    hw.reset().set_low()?;
    hw.delay().delay_ms(RESET_DELAY_MS).await;
    hw.reset().set_high()?;
    hw.delay().delay_ms(RESET_DELAY_MS).await;
    Ok(())
}

impl<HW: EpdHw, STATE: StateAwake> Reset<HW::Error> for Epd1In54<HW, STATE> {
    type DisplayOut = Epd1In54<HW, STATE>;

    async fn reset(mut self) -> Result<Self::DisplayOut, HW::Error> {
        reset_impl(&mut self.hw).await?;
        Ok(self)
    }
}

impl<HW: EpdHw> Reset<HW::Error> for Epd1In54<HW, StateAsleep> {
    type DisplayOut = Epd1In54<HW, StateUninitialized>;

    async fn reset(mut self) -> Result<Self::DisplayOut, HW::Error> {
        reset_impl(&mut self.hw).await?;
        Ok(Epd1In54 {
            hw: self.hw,
            size: self.size,
            state: StateUninitialized(),
        })
    }
}

impl<HW: EpdHw, STATE: StateAwake> Sleep<HW::Spi, HW::Error> for Epd1In54<HW, STATE> {
    type DisplayOut = Epd1In54<HW, StateAsleep>;

    async fn sleep(mut self, spi: &mut HW::Spi) -> Result<Self::DisplayOut, HW::Error> {
        debug!("Sleeping EPD");
        self.send(spi, Command::DeepSleepMode, &[]).await?;
        self.wait_idle().await?;
        Ok(Epd1In54 {
            hw: self.hw,
            size: self.size,
            state: StateAsleep(),
        })
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;
    use std::{cell::RefCell, collections::VecDeque, rc::Rc, vec, vec::Vec};

    use embassy_futures::block_on;
    use embedded_hal::{
        digital::{ErrorType as PinErrorType, InputPin},
        spi::{Error as SpiError, ErrorKind},
    };
    use embedded_hal_async::spi::{ErrorType as SpiErrorType, Operation, SpiDevice};
    use thiserror::Error as ThisError;

    use super::*;
    use crate::{
        canvas::{buffer_length, Canvas},
        font::FONT_6X8,
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Command(u8),
        Data(Vec<u8>),
        Reset(bool),
        DelayMs(u32),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        dc_high: bool,
        busy_script: VecDeque<bool>,
        /// Counts SPI writes since the events were last cleared.
        writes: usize,
        /// The write, counted from 0, that fails.
        failing_write: Option<usize>,
    }

    type Shared = Rc<RefCell<Recorder>>;

    struct MockSpi(Shared);
    struct MockDc(Shared);
    struct MockReset(Shared);
    struct MockBusy(Shared);
    struct MockDelay(Shared);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BusFault;

    impl SpiError for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    impl SpiErrorType for MockSpi {
        type Error = BusFault;
    }

    impl SpiDevice for MockSpi {
        async fn transaction(
            &mut self,
            operations: &mut [Operation<'_, u8>],
        ) -> Result<(), BusFault> {
            let mut recorder = self.0.borrow_mut();
            for op in operations {
                if let Operation::Write(bytes) = op {
                    let write = recorder.writes;
                    recorder.writes += 1;
                    if recorder.failing_write == Some(write) {
                        return Err(BusFault);
                    }
                    let event = if recorder.dc_high {
                        Event::Data(bytes.to_vec())
                    } else {
                        assert_eq!(bytes.len(), 1, "commands are single bytes");
                        Event::Command(bytes[0])
                    };
                    recorder.events.push(event);
                }
            }
            Ok(())
        }
    }

    impl PinErrorType for MockDc {
        type Error = Infallible;
    }

    impl OutputPin for MockDc {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().dc_high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().dc_high = true;
            Ok(())
        }
    }

    impl PinErrorType for MockReset {
        type Error = Infallible;
    }

    impl OutputPin for MockReset {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().events.push(Event::Reset(false));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().events.push(Event::Reset(true));
            Ok(())
        }
    }

    impl PinErrorType for MockBusy {
        type Error = Infallible;
    }

    impl InputPin for MockBusy {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.borrow_mut().busy_script.pop_front().unwrap_or(false))
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    impl DelayNs for MockDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.0.borrow_mut().events.push(Event::DelayMs(ns / 1_000_000));
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.0.borrow_mut().events.push(Event::DelayMs(ms));
        }
    }

    #[derive(Debug, ThisError)]
    enum TestError {
        #[error("driver error: {0}")]
        Driver(#[from] Error),
        #[error("SPI error: {0:?}")]
        Spi(BusFault),
    }

    impl From<BusFault> for TestError {
        fn from(e: BusFault) -> Self {
            TestError::Spi(e)
        }
    }

    impl From<Infallible> for TestError {
        fn from(e: Infallible) -> Self {
            match e {}
        }
    }

    struct MockHw {
        dc: MockDc,
        reset: MockReset,
        busy: MockBusy,
        delay: MockDelay,
    }

    impl EpdHw for MockHw {
        type Spi = MockSpi;
        type Dc = MockDc;
        type Reset = MockReset;
        type Busy = MockBusy;
        type Delay = MockDelay;
        type Error = TestError;

        fn dc(&mut self) -> &mut MockDc {
            &mut self.dc
        }

        fn reset(&mut self) -> &mut MockReset {
            &mut self.reset
        }

        fn busy(&mut self) -> &mut MockBusy {
            &mut self.busy
        }

        fn delay(&mut self) -> &mut MockDelay {
            &mut self.delay
        }
    }

    fn mock() -> (MockHw, MockSpi, Shared) {
        let shared: Shared = Rc::default();
        let hw = MockHw {
            dc: MockDc(shared.clone()),
            reset: MockReset(shared.clone()),
            busy: MockBusy(shared.clone()),
            delay: MockDelay(shared.clone()),
        };
        (hw, MockSpi(shared.clone()), shared)
    }

    /// Commands with the data that followed them, dropping pin and delay events.
    fn frames(shared: &Shared) -> Vec<(u8, Vec<u8>)> {
        let mut frames: Vec<(u8, Vec<u8>)> = Vec::new();
        for event in &shared.borrow().events {
            match event {
                Event::Command(command) => frames.push((*command, Vec::new())),
                Event::Data(data) => frames
                    .last_mut()
                    .expect("data without a command")
                    .1
                    .extend_from_slice(data),
                _ => {}
            }
        }
        frames
    }

    fn delays(shared: &Shared) -> Vec<u32> {
        shared
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::DelayMs(ms) => Some(*ms),
                _ => None,
            })
            .collect()
    }

    fn clear_events(shared: &Shared) {
        let mut recorder = shared.borrow_mut();
        recorder.events.clear();
        recorder.writes = 0;
    }

    /// Delays recorded after the last data transfer.
    fn trailing_delays(shared: &Shared) -> Vec<u32> {
        let recorder = shared.borrow();
        let last_data = recorder
            .events
            .iter()
            .rposition(|e| matches!(e, Event::Data(_)))
            .expect("no data sent");
        recorder.events[last_data..]
            .iter()
            .filter_map(|e| match e {
                Event::DelayMs(ms) => Some(*ms),
                _ => None,
            })
            .collect()
    }

    fn ready(mode: RefreshMode) -> (Epd1In54<MockHw, StateReady>, MockSpi, Shared) {
        let (hw, mut spi, shared) = mock();
        let epd = block_on(Epd1In54::with_default_size(hw).init(&mut spi, mode)).unwrap();
        clear_events(&shared);
        (epd, spi, shared)
    }

    #[test]
    fn test_init_sequence() {
        let (hw, mut spi, shared) = mock();
        let epd = block_on(Epd1In54::with_default_size(hw).init(&mut spi, RefreshMode::Full))
            .unwrap();
        assert_eq!(epd.mode(), RefreshMode::Full);
        assert!(epd.is_dirty());

        let events = shared.borrow().events.clone();
        assert_eq!(
            events[..4],
            [
                Event::Reset(false),
                Event::DelayMs(200),
                Event::Reset(true),
                Event::DelayMs(200)
            ]
        );
        assert_eq!(
            frames(&shared),
            vec![
                (0x01, vec![0xC7, 0x00, 0x00]),
                (0x0C, vec![0xD7, 0xD6, 0x9D]),
                (0x2C, vec![0xA8]),
                (0x3A, vec![0x1A]),
                (0x3B, vec![0x08]),
                (0x11, vec![0x03]),
                (0x32, LUT_FULL_UPDATE.to_vec()),
            ]
        );
    }

    #[test]
    fn test_init_uses_panel_height() {
        let (hw, mut spi, shared) = mock();
        block_on(Epd1In54::new(hw, Size::new(128, 296)).init(&mut spi, RefreshMode::Partial))
            .unwrap();
        let frames = frames(&shared);
        assert_eq!(frames[0], (0x01, vec![0x27, 0x01, 0x00]));
        assert_eq!(frames[6], (0x32, LUT_PARTIAL_UPDATE.to_vec()));
    }

    #[test]
    fn test_load_lut() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        block_on(epd.load_lut(&mut spi, RefreshMode::Partial)).unwrap();
        assert_eq!(epd.mode(), RefreshMode::Partial);
        assert_eq!(frames(&shared), vec![(0x32, LUT_PARTIAL_UPDATE.to_vec())]);
        assert_eq!(frames(&shared)[0].1.len(), 30);
    }

    #[test]
    fn test_load_lut_code() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Partial);
        block_on(epd.load_lut_code(&mut spi, 7)).unwrap();
        assert!(frames(&shared).is_empty());
        assert_eq!(epd.mode(), RefreshMode::Partial);

        block_on(epd.load_lut_code(&mut spi, 0)).unwrap();
        assert_eq!(frames(&shared), vec![(0x32, LUT_FULL_UPDATE.to_vec())]);
        assert_eq!(epd.mode(), RefreshMode::Full);
    }

    #[test]
    fn test_refresh_mode_codes() {
        assert_eq!(RefreshMode::try_from(0), Ok(RefreshMode::Full));
        assert_eq!(RefreshMode::try_from(1), Ok(RefreshMode::Partial));
        assert_eq!(RefreshMode::try_from(2), Err(Error::InvalidLutMode(2)));
        assert_eq!(
            RefreshMode::try_from(RefreshMode::Partial.code()),
            Ok(RefreshMode::Partial)
        );
    }

    #[test]
    fn test_memory_window_clamps_to_panel() {
        let panel = Size::new(200, 200);
        let window = MemoryWindow::clamped(196, 0, 16, 8, panel).unwrap();
        assert_eq!(
            window,
            MemoryWindow {
                x_start: 192,
                y_start: 0,
                x_end: 199,
                y_end: 7
            }
        );
        assert_eq!(window.byte_len(), 8);

        let window = MemoryWindow::clamped(0, 190, 200, 24, panel).unwrap();
        assert_eq!(window.y_end, 199);
        assert_eq!(window.byte_len(), 10 * 25);
    }

    #[test]
    fn test_memory_window_truncates_x() {
        let window = MemoryWindow::clamped(13, 4, 21, 2, Size::new(200, 200)).unwrap();
        assert_eq!(
            window,
            MemoryWindow {
                x_start: 8,
                y_start: 4,
                x_end: 23,
                y_end: 5
            }
        );
        assert_eq!(window.byte_len(), 4);
    }

    #[test]
    fn test_memory_window_huge_dimensions() {
        let panel = Size::new(200, 200);
        let window = MemoryWindow::clamped(8, 0, i32::MAX, 1, panel).unwrap();
        assert_eq!(
            window,
            MemoryWindow {
                x_start: 8,
                y_start: 0,
                x_end: 199,
                y_end: 0
            }
        );
        assert_eq!(window.byte_len(), 24);

        let window = MemoryWindow::clamped(0, 8, 16, i32::MAX, panel).unwrap();
        assert_eq!((window.y_start, window.y_end), (8, 199));
        assert_eq!(window.byte_len(), 2 * 192);

        let window = MemoryWindow::clamped(192, 199, i32::MAX, i32::MAX, panel).unwrap();
        assert_eq!(window.byte_len(), 1);
    }

    #[test]
    fn test_push_region_huge_dimensions_is_clamped() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        let buffer = [0x0F; 25];
        block_on(epd.push_region(&mut spi, &buffer, 0, 199, i32::MAX, i32::MAX)).unwrap();
        let frames = frames(&shared);
        assert_eq!(frames[0], (0x44, vec![0, 24]));
        assert_eq!(frames[1], (0x45, vec![199, 0, 199, 0]));
        assert_eq!(frames[4], (0x24, vec![0x0F; 25]));
    }

    #[test]
    fn test_memory_window_rejects() {
        let panel = Size::new(200, 200);
        assert_eq!(MemoryWindow::clamped(-8, 0, 16, 8, panel), None);
        assert_eq!(MemoryWindow::clamped(0, -1, 16, 8, panel), None);
        assert_eq!(MemoryWindow::clamped(0, 0, -16, 8, panel), None);
        assert_eq!(MemoryWindow::clamped(0, 0, 16, -8, panel), None);
        assert_eq!(MemoryWindow::clamped(0, 0, 7, 8, panel), None);
        assert_eq!(MemoryWindow::clamped(200, 0, 16, 8, panel), None);
        assert_eq!(MemoryWindow::clamped(0, 200, 16, 8, panel), None);
    }

    #[test]
    fn test_push_region_text_band() {
        let mut canvas =
            Canvas::new([0u8; buffer_length(200, 24)], 200, 24).unwrap();
        canvas.clear(false);
        canvas.draw_string_at(2, 2, "Hi", &FONT_6X8, true);

        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        block_on(epd.push_region(&mut spi, canvas.data(), 0, 0, 200, 24)).unwrap();

        assert_eq!(
            frames(&shared),
            vec![
                (0x44, vec![0, 24]),
                (0x45, vec![0, 0, 23, 0]),
                (0x4E, vec![0]),
                (0x4F, vec![0, 0]),
                (0x24, canvas.data().to_vec()),
            ]
        );
    }

    #[test]
    fn test_push_region_sends_only_clipped_bytes() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Partial);
        let buffer = [0xAB; 2 * 8];
        block_on(epd.push_region(&mut spi, &buffer, 196, 10, 16, 8)).unwrap();

        let frames = frames(&shared);
        assert_eq!(frames[0], (0x44, vec![24, 24]));
        assert_eq!(frames[1], (0x45, vec![10, 0, 17, 0]));
        assert_eq!(frames[2], (0x4E, vec![24]));
        assert_eq!(frames[4], (0x24, vec![0xAB; 8]));
    }

    #[test]
    fn test_push_region_ignores_invalid_regions() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        let buffer = [0u8; 16];
        block_on(epd.push_region(&mut spi, &buffer, 0, -1, 16, 8)).unwrap();
        block_on(epd.push_region(&mut spi, &buffer, 0, 0, 16, 0)).unwrap();
        block_on(epd.continue_region(&mut spi, &buffer, 0, 0, -8, 8)).unwrap();
        assert!(shared.borrow().events.is_empty());
    }

    #[test]
    fn test_push_region_short_buffer() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        let buffer = [0u8; 10];
        let result = block_on(epd.push_region(&mut spi, &buffer, 0, 0, 200, 24));
        assert!(matches!(
            result,
            Err(TestError::Driver(Error::BufferTooSmall {
                required: 600,
                actual: 10
            }))
        ));
        assert!(shared.borrow().events.is_empty());
    }

    #[test]
    fn test_continue_region() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        let buffer = [0x5A; 50];
        block_on(epd.continue_region(&mut spi, &buffer, 0, 24, 200, 2)).unwrap();
        assert_eq!(frames(&shared), vec![(0x24, vec![0x5A; 50])]);
    }

    #[test]
    fn test_clear() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        block_on(epd.clear(&mut spi, 0xFF)).unwrap();
        assert_eq!(
            frames(&shared),
            vec![
                (0x44, vec![0, 24]),
                (0x45, vec![0, 0, 199, 0]),
                (0x4E, vec![0]),
                (0x4F, vec![0, 0]),
                (0x24, vec![0xFF; 25 * 200]),
            ]
        );
    }

    #[test]
    fn test_refresh_tracking() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        assert!(block_on(epd.refresh_if_dirty(&mut spi)).unwrap());
        assert_eq!(
            frames(&shared),
            vec![(0x22, vec![0xC4]), (0x20, vec![]), (0xFF, vec![])]
        );
        assert!(!epd.is_dirty());

        clear_events(&shared);
        assert!(!block_on(epd.refresh_if_dirty(&mut spi)).unwrap());
        assert!(shared.borrow().events.is_empty());

        epd.mark_dirty();
        assert!(block_on(epd.refresh_if_dirty(&mut spi)).unwrap());
        assert_eq!(frames(&shared).len(), 3);
    }

    #[test]
    fn test_refresh_waits_until_idle() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        shared.borrow_mut().busy_script.extend([true, true, true]);
        block_on(epd.refresh(&mut spi)).unwrap();
        assert_eq!(delays(&shared), vec![50, 50, 50]);
        assert!(shared.borrow().busy_script.is_empty());
    }

    #[test]
    fn test_set_memory_pointer_waits_until_idle() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        shared.borrow_mut().busy_script.extend([true, true]);
        block_on(epd.set_memory_pointer(&mut spi, 17, 300)).unwrap();
        assert_eq!(
            frames(&shared),
            vec![(0x4E, vec![2]), (0x4F, vec![0x2C, 0x01])]
        );
        assert_eq!(trailing_delays(&shared), vec![50, 50]);
        assert!(shared.borrow().busy_script.is_empty());
    }

    #[test]
    fn test_clear_waits_after_streaming() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        // One poll for the memory pointer, then three after the RAM is filled.
        shared
            .borrow_mut()
            .busy_script
            .extend([true, false, true, true, true]);
        block_on(epd.clear(&mut spi, 0x00)).unwrap();
        assert_eq!(delays(&shared), vec![50, 50, 50, 50]);
        assert_eq!(trailing_delays(&shared), vec![50, 50, 50]);
        assert!(shared.borrow().busy_script.is_empty());
    }

    #[test]
    fn test_push_region_stops_at_bus_fault() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        // Writes: 0x44, its data, then 0x45 fails.
        shared.borrow_mut().failing_write = Some(2);
        let buffer = [0u8; 25 * 24];
        let result = block_on(epd.push_region(&mut spi, &buffer, 0, 0, 200, 24));
        assert!(matches!(result, Err(TestError::Spi(BusFault))));
        assert_eq!(frames(&shared), vec![(0x44, vec![0, 24])]);
        // Nothing is retried.
        assert_eq!(shared.borrow().writes, 3);
    }

    #[test]
    fn test_refresh_bus_fault_keeps_dirty() {
        let (mut epd, mut spi, shared) = ready(RefreshMode::Full);
        // The DisplayUpdateControl2 data byte fails.
        shared.borrow_mut().failing_write = Some(1);
        let result = block_on(epd.refresh(&mut spi));
        assert!(matches!(result, Err(TestError::Spi(BusFault))));
        assert_eq!(frames(&shared), vec![(0x22, vec![])]);
        assert_eq!(shared.borrow().writes, 2);
        assert!(delays(&shared).is_empty());
        assert!(epd.is_dirty());

        // The bus recovers and the next refresh goes through.
        shared.borrow_mut().failing_write = None;
        clear_events(&shared);
        assert!(block_on(epd.refresh_if_dirty(&mut spi)).unwrap());
        assert_eq!(frames(&shared).len(), 3);
    }

    #[test]
    fn test_wait_idle_for_times_out() {
        let (mut epd, _spi, shared) = ready(RefreshMode::Full);
        shared.borrow_mut().busy_script.extend([true; 5]);
        let result = block_on(epd.wait_idle_for(2));
        assert!(matches!(
            result,
            Err(TestError::Driver(Error::BusyTimeout { polls: 2 }))
        ));
        assert_eq!(delays(&shared), vec![50, 50]);

        // Released within the limit.
        shared.borrow_mut().busy_script = VecDeque::from([true]);
        block_on(epd.wait_idle_for(2)).unwrap();
    }

    #[test]
    fn test_sleep_then_reset_requires_init() {
        let (epd, mut spi, shared) = ready(RefreshMode::Partial);
        let asleep = block_on(epd.sleep(&mut spi)).unwrap();
        assert_eq!(frames(&shared), vec![(0x10, vec![])]);

        clear_events(&shared);
        let uninitialized = block_on(asleep.reset()).unwrap();
        assert_eq!(shared.borrow().events[0], Event::Reset(false));

        let epd = block_on(uninitialized.init(&mut spi, RefreshMode::Full)).unwrap();
        assert_eq!(epd.mode(), RefreshMode::Full);
    }
}
