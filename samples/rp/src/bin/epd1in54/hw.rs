//! Pico wiring for the 1.54" module: SPI0 clock on GP2, MOSI on GP3, chip select on GP5, then
//! DC, RST and BUSY on GP6, GP7 and GP8. The panel never answers, so MISO stays free.

use embassy_embedded_hal::shared_bus::asynch::spi::SpiDevice;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::SPI0;
use embassy_rp::spi::{self, Spi};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Delay;
use embedded_hal_async::spi::{Phase, Polarity};
use epd_paint_async::{epd1in54, EpdHw};
use rp_samples::Error;

assign_resources::assign_resources! {
    bus: BusPins {
        spi: SPI0,
        clk: PIN_2,
        mosi: PIN_3,
        dma: DMA_CH1,
        cs: PIN_5,
    },
    panel: PanelPins {
        dc: PIN_6,
        reset: PIN_7,
        busy: PIN_8,
    }
}

pub type PanelBus<'a> = Spi<'a, SPI0, spi::Async>;
pub type PanelSpi<'a> = SpiDevice<'a, NoopRawMutex, PanelBus<'a>, Output<'a>>;

/// The panel's recommended SPI settings, in embassy-rp's own enums.
pub fn spi_config() -> spi::Config {
    let mut config = spi::Config::default();
    config.frequency = epd1in54::RECOMMENDED_SPI_HZ;
    config.phase = match epd1in54::RECOMMENDED_SPI_PHASE {
        Phase::CaptureOnFirstTransition => spi::Phase::CaptureOnFirstTransition,
        Phase::CaptureOnSecondTransition => spi::Phase::CaptureOnSecondTransition,
    };
    config.polarity = match epd1in54::RECOMMENDED_SPI_POLARITY {
        Polarity::IdleLow => spi::Polarity::IdleLow,
        Polarity::IdleHigh => spi::Polarity::IdleHigh,
    };
    config
}

impl BusPins {
    /// Opens SPI0 transmit-only and returns it with the chip select, deasserted.
    pub fn open<'a>(self) -> (PanelBus<'a>, Output<'a>) {
        let bus = Spi::new_txonly(self.spi, self.clk, self.mosi, self.dma, spi_config());
        // Active low.
        let cs = Output::new(self.cs, Level::High);
        (bus, cs)
    }
}

/// Control lines and delay source for [epd_paint_async::epd1in54::Epd1In54].
pub struct PanelHw<'a> {
    dc: Output<'a>,
    reset: Output<'a>,
    busy: Input<'a>,
    delay: Delay,
}

impl PanelHw<'_> {
    pub fn new(pins: PanelPins) -> Self {
        Self {
            dc: Output::new(pins.dc, Level::Low),
            // Held high; the driver pulses it low to reset.
            reset: Output::new(pins.reset, Level::High),
            // The module drives BUSY push-pull.
            busy: Input::new(pins.busy, Pull::None),
            delay: Delay,
        }
    }
}

impl<'a> EpdHw for PanelHw<'a> {
    type Spi = PanelSpi<'a>;
    type Dc = Output<'a>;
    type Reset = Output<'a>;
    type Busy = Input<'a>;
    type Delay = Delay;
    type Error = Error;

    fn dc(&mut self) -> &mut Self::Dc {
        &mut self.dc
    }

    fn reset(&mut self) -> &mut Self::Reset {
        &mut self.reset
    }

    fn busy(&mut self) -> &mut Self::Busy {
        &mut self.busy
    }

    fn delay(&mut self) -> &mut Self::Delay {
        &mut self.delay
    }
}
