//! Drives a Waveshare 1.54" display from a Raspberry Pi Pico: a few static text bands drawn with
//! full refreshes, then an uptime clock redrawn with partial refreshes.

#![no_std]
#![no_main]

mod clock_font;
mod hw;

use core::fmt::Write;

use clock_font::CLOCK_FONT;
use defmt::{debug, expect, info};
use embassy_embedded_hal::shared_bus::asynch::spi::SpiDevice;
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Instant, Timer};
use embedded_graphics::prelude::Size;
use epd_paint_async::{
    canvas::{buffer_length, Canvas, Polarity},
    epd1in54::{Epd1In54, RefreshMode},
    font::{ActiveFont, FontSlot, FONT_6X8},
    primitives::Corners,
    Displayable, Reset, Sleep,
};
use hw::*;
use {defmt_rtt as _, panic_probe as _};

const BAND_WIDTH: u32 = 200;
const BAND_HEIGHT: u32 = 24;
const CLOCK_WIDTH: u32 = 128;
const CLOCK_HEIGHT: u32 = 32;
const CLOCK_UPDATES: u32 = 30;

// Black ink on a white panel: drawing "colored" clears bits.
const POLARITY: Polarity = Polarity::ClearWhenColored;

type Band = Canvas<[u8; buffer_length(BAND_WIDTH, BAND_HEIGHT)]>;

fn centered_x(text: &str, width: u32) -> i32 {
    let text_width = text.len() as i32 * FONT_6X8.width() as i32;
    ((width as i32 - text_width) / 2).max(0)
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let resources = split_resources!(p);
    let (bus, cs) = resources.bus.open();
    let bus: Mutex<NoopRawMutex, _> = Mutex::new(bus);
    let mut spi = SpiDevice::new(&bus, cs);
    let epd = Epd1In54::with_default_size(PanelHw::new(resources.panel));

    info!("Initializing EPD");
    let mut epd = expect!(
        epd.init(&mut spi, RefreshMode::Full).await,
        "Failed to initialize EPD"
    );

    // Both RAM planes need clearing, since they swap on every refresh.
    let white = POLARITY.fill_byte(false);
    for _ in 0..2 {
        expect!(epd.clear(&mut spi, white).await, "Failed to clear EPD");
        expect!(epd.refresh(&mut spi).await, "Failed to refresh EPD");
    }

    info!("Displaying text bands");
    let mut band: Band = expect!(
        Canvas::new(
            [0; buffer_length(BAND_WIDTH, BAND_HEIGHT)],
            BAND_WIDTH,
            BAND_HEIGHT
        ),
        "Band buffer too small"
    )
    .with_polarity(POLARITY);
    for _ in 0..2 {
        band.clear(true);
        band.draw_string_at(4, 8, "Hello epd-paint-async!", &FONT_6X8, false);
        expect!(
            epd.push_region(&mut spi, band.data(), 0, 10, BAND_WIDTH as i32, BAND_HEIGHT as i32)
                .await,
            "Failed to push band"
        );

        let title = "1.54\" e-paper";
        band.clear(false);
        band.draw_string_at(centered_x(title, BAND_WIDTH), 8, title, &FONT_6X8, true);
        expect!(
            epd.push_region(&mut spi, band.data(), 0, 30, BAND_WIDTH as i32, BAND_HEIGHT as i32)
                .await,
            "Failed to push band"
        );

        band.clear(false);
        band.draw_string_at(5, 8, "* Using embassy-rp SPI", &FONT_6X8, true);
        band.draw_round_rect(0, 0, BAND_WIDTH as i32, BAND_HEIGHT as i32, 6, true);
        expect!(
            epd.push_region(&mut spi, band.data(), 0, 50, BAND_WIDTH as i32, BAND_HEIGHT as i32)
                .await,
            "Failed to push band"
        );

        band.clear(false);
        band.draw_filled_circle(12, 12, 10, true);
        band.draw_circle_quadrants(40, 12, 10, Corners::TOP_LEFT | Corners::BOTTOM_RIGHT, true);
        band.draw_triangle(60, 22, 72, 2, 84, 22, true);
        band.draw_filled_triangle(92, 22, 104, 2, 116, 22, true);
        band.draw_line(124, 2, 196, 22, true);
        band.draw_rectangle(124, 2, 196, 22, true);
        expect!(
            epd.push_region(&mut spi, band.data(), 0, 80, BAND_WIDTH as i32, BAND_HEIGHT as i32)
                .await,
            "Failed to push band"
        );

        expect!(epd.refresh(&mut spi).await, "Failed to refresh EPD");
    }
    Timer::after_secs(2).await;

    info!("Changing to partial refresh mode");
    expect!(
        epd.load_lut(&mut spi, RefreshMode::Partial).await,
        "Failed to load partial LUT"
    );

    // Reuse the band buffer for the clock.
    let mut clock = band;
    clock.set_width(CLOCK_WIDTH);
    clock.set_height(CLOCK_HEIGHT);
    let mut clock_font = ActiveFont::new();
    clock_font.set_font(FontSlot::Embedded(&CLOCK_FONT));
    let mut text: heapless::String<16> = heapless::String::new();
    for _ in 0..CLOCK_UPDATES {
        let secs = Instant::now().as_secs();
        text.clear();
        expect!(
            write!(text, "{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60),
            "Clock text too long"
        );
        debug!("Drawing clock {}", text.as_str());

        clock.clear(false);
        let origin = clock_font.centered_origin(Size::new(CLOCK_WIDTH, 18), &text);
        expect!(
            clock.print(origin.x, origin.y, &text, &clock_font, true),
            "Failed to print clock"
        );
        // Progress through the current minute.
        let bar = ((secs % 60) as i32 * (CLOCK_WIDTH as i32 - 8)) / 59;
        clock.draw_rectangle(2, 20, CLOCK_WIDTH as i32 - 3, 29, true);
        clock.draw_filled_rectangle(4, 22, 4 + bar, 27, true);
        expect!(
            epd.push_region(
                &mut spi,
                clock.data(),
                36,
                140,
                CLOCK_WIDTH as i32,
                CLOCK_HEIGHT as i32
            )
            .await,
            "Failed to push clock"
        );
        epd.mark_dirty();
        expect!(epd.refresh_if_dirty(&mut spi).await, "Failed to refresh EPD");
        Timer::after_secs(1).await;
    }

    info!("Sleeping EPD");
    let epd = expect!(epd.sleep(&mut spi).await, "Failed to put EPD to sleep");
    Timer::after_secs(4).await;

    info!("Waking EPD to clear it");
    let epd = expect!(epd.reset().await, "Failed to reset EPD");
    let mut epd = expect!(
        epd.init(&mut spi, RefreshMode::Full).await,
        "Failed to initialize EPD"
    );
    for _ in 0..2 {
        expect!(epd.clear(&mut spi, white).await, "Failed to clear EPD");
        expect!(epd.refresh(&mut spi).await, "Failed to refresh EPD");
    }
    expect!(epd.sleep(&mut spi).await, "Failed to put EPD to sleep");
    info!("Done");
}
