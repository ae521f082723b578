use core::error::Error as CoreError;

use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin, PinState};
use embedded_hal_async::{
    delay::DelayNs,
    spi::{ErrorType as SpiErrorType, SpiDevice},
};

use crate::{
    log::{error_log, trace, warn_log},
    Error,
};

/// How long to sleep between two reads of the busy line.
pub const BUSY_POLL_INTERVAL_MS: u32 = 50;

/// Provides access to the hardware needed to control an EPD.
///
/// This keeps the driver generic over a single type parameter, at the cost of implementing this
/// trait once for your board. The SPI device itself is not owned by the implementation: it is
/// handed to each driver call, so the bus can be shared with other devices between calls.
///
/// ```ignore
/// use core::convert::Infallible;
///
/// use embassy_embedded_hal::shared_bus::asynch::spi::SpiDevice;
/// use embassy_embedded_hal::shared_bus::SpiDeviceError;
/// use embassy_rp::gpio::{Input, Output};
/// use embassy_rp::spi::{self, Spi};
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use embassy_time::Delay;
/// use epd_paint_async::EpdHw;
/// use thiserror::Error as ThisError;
///
/// #[derive(Debug, ThisError)]
/// enum Error {
///     #[error("SPI error: {0:?}")]
///     Spi(SpiDeviceError<spi::Error, Infallible>),
///     #[error("driver error: {0}")]
///     Driver(#[from] epd_paint_async::Error),
/// }
///
/// // ... From<Infallible> and From<SpiDeviceError<..>> for Error ...
///
/// struct RpEpdHw<'a> {
///     dc: Output<'a>,
///     reset: Output<'a>,
///     busy: Input<'a>,
///     delay: Delay,
/// }
///
/// impl<'a> EpdHw for RpEpdHw<'a> {
///     type Spi = SpiDevice<'a, NoopRawMutex, Spi<'a, embassy_rp::peripherals::SPI0, spi::Async>, Output<'a>>;
///     type Dc = Output<'a>;
///     type Reset = Output<'a>;
///     type Busy = Input<'a>;
///     type Delay = Delay;
///     type Error = Error;
///
///     fn dc(&mut self) -> &mut Self::Dc { &mut self.dc }
///     fn reset(&mut self) -> &mut Self::Reset { &mut self.reset }
///     fn busy(&mut self) -> &mut Self::Busy { &mut self.busy }
///     fn delay(&mut self) -> &mut Self::Delay { &mut self.delay }
/// }
/// ```
pub trait EpdHw {
    type Spi: SpiDevice;
    type Dc: OutputPin;
    type Reset: OutputPin;
    type Busy: InputPin;
    type Delay: DelayNs;
    type Error: CoreError
        + From<<Self::Spi as SpiErrorType>::Error>
        + From<<Self::Dc as PinErrorType>::Error>
        + From<<Self::Reset as PinErrorType>::Error>
        + From<<Self::Busy as PinErrorType>::Error>
        + From<Error>;

    fn dc(&mut self) -> &mut Self::Dc;
    fn reset(&mut self) -> &mut Self::Reset;
    fn busy(&mut self) -> &mut Self::Busy;
    fn delay(&mut self) -> &mut Self::Delay;

    /// Indicates which state of the busy pin means the panel is busy.
    ///
    /// The 1.54" panel drives the line high while it is working. This is user-configurable to
    /// allow for inverting level shifters or other unusual wiring.
    fn busy_when(&self) -> PinState {
        PinState::High
    }
}

/// Provides "wait" support for hardware with a busy state.
pub(crate) trait BusyWait: EpdHw {
    /// Polls the busy line until the panel reports idle.
    ///
    /// There is no timeout: this waits forever if the panel never releases the line.
    async fn wait_if_busy(&mut self) -> Result<(), Self::Error>;

    /// Like [BusyWait::wait_if_busy], but gives up with [Error::BusyTimeout] after `max_polls`
    /// polls.
    async fn wait_if_busy_for(&mut self, max_polls: u32) -> Result<(), Self::Error>;
}

/// Provides the ability to send <command> then <data> style communications.
pub(crate) trait CommandDataSend: EpdHw {
    /// Sends the command byte with DC low, then all of `data` with DC high in a single transfer.
    async fn send(
        &mut self,
        spi: &mut <Self as EpdHw>::Spi,
        command: u8,
        data: &[u8],
    ) -> Result<(), Self::Error>;

    /// Sends more data bytes for the last command.
    async fn send_data(
        &mut self,
        spi: &mut <Self as EpdHw>::Spi,
        data: &[u8],
    ) -> Result<(), Self::Error>;
}

fn is_busy<HW: EpdHw>(hw: &mut HW) -> Result<bool, HW::Error> {
    let busy_when = hw.busy_when();
    let busy = hw.busy();
    let busy = match busy_when {
        PinState::High => busy.is_high()?,
        PinState::Low => busy.is_low()?,
    };
    Ok(busy)
}

impl<HW: EpdHw> BusyWait for HW {
    async fn wait_if_busy(&mut self) -> Result<(), HW::Error> {
        let mut polls: u32 = 0;
        while is_busy(self)? {
            polls = polls.wrapping_add(1);
            trace!("Still busy, poll {}", polls);
            self.delay().delay_ms(BUSY_POLL_INTERVAL_MS).await;
        }
        Ok(())
    }

    async fn wait_if_busy_for(&mut self, max_polls: u32) -> Result<(), HW::Error> {
        let mut polls: u32 = 0;
        while is_busy(self)? {
            if polls >= max_polls {
                warn_log!("EPD still busy after {} polls, giving up", polls);
                return Err(Error::BusyTimeout { polls }.into());
            }
            polls += 1;
            trace!("Still busy, poll {}", polls);
            self.delay().delay_ms(BUSY_POLL_INTERVAL_MS).await;
        }
        Ok(())
    }
}

impl<HW: EpdHw> CommandDataSend for HW {
    async fn send(
        &mut self,
        spi: &mut <Self as EpdHw>::Spi,
        command: u8,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        trace!("Sending EPD command: {:#x}", command);

        self.dc().set_low()?;
        if let Err(e) = spi.write(&[command]).await {
            error_log!("SPI transfer failed for command {:#x}", command);
            return Err(e.into());
        }

        if !data.is_empty() {
            self.send_data(spi, data).await?;
        }

        Ok(())
    }

    async fn send_data(
        &mut self,
        spi: &mut <Self as EpdHw>::Spi,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        self.dc().set_high()?;
        if let Err(e) = spi.write(data).await {
            error_log!("SPI transfer failed for {} data bytes", data.len());
            return Err(e.into());
        }
        Ok(())
    }
}
