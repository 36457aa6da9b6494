// Status-LED: Fehleranzeige über die RGB LED (WS2812/Neopixel)
//
// Rot = Broker nicht erreichbar, aus = alles in Ordnung.

use defmt::warn;
use esp_core::FaultIndicator;
use esp_hal::Blocking;
use esp_hal::rmt::{PulseCode, Rmt};
use esp_hal::time::Rate;
use esp_hal_smartled::SmartLedsAdapter;
use rgb::RGB8;
use smart_leds_trait::SmartLedsWrite;

use crate::config::LED_BRIGHTNESS;

// Buffer-Größe für 1 LED (3 Farben * 8 Bits + 1 Reset)
pub const LED_BUFFER_SIZE: usize = 25;

/// Fehler beim Initialisieren der LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct LedInitError;

/// Fehleranzeige über eine einzelne WS2812 LED
///
/// Nutzt ESP32 RMT Peripheral für das LED-Timing.
///
/// Hinweis: Der Buffer muss 'static sein, daher wird er im Task erstellt
/// und als Parameter übergeben statt im Constructor allokiert.
pub struct StatusLed<'a> {
    led: SmartLedsAdapter<'a, LED_BUFFER_SIZE>,
    fault: bool,
}

impl<'a> StatusLed<'a> {
    /// Erstellt die Status-LED
    ///
    /// # Parameter
    /// - `pin`: GPIO für die LED-Datenleitung
    /// - `rmt_peripheral`: RMT Peripheral
    /// - `rmt_clock_mhz`: RMT Clock Frequenz in MHz (z.B. 80)
    /// - `buffer`: Buffer für LED-Daten (erstellt mit smart_led_buffer!(1) Macro)
    pub fn new(
        pin: impl esp_hal::gpio::interconnect::PeripheralOutput<'a>,
        rmt_peripheral: esp_hal::peripherals::RMT<'a>,
        rmt_clock_mhz: u32,
        buffer: &'a mut [PulseCode; LED_BUFFER_SIZE],
    ) -> Result<Self, LedInitError> {
        let rmt: Rmt<'a, Blocking> =
            Rmt::new(rmt_peripheral, Rate::from_mhz(rmt_clock_mhz)).map_err(|_| LedInitError)?;
        let led = SmartLedsAdapter::new(rmt.channel0, pin, buffer);

        let mut status = Self { led, fault: true };
        status.set_fault(false);
        Ok(status)
    }

    fn write(&mut self, color: RGB8) {
        if self.led.write([color].into_iter()).is_err() {
            warn!("LED: write failed");
        }
    }
}

impl FaultIndicator for StatusLed<'_> {
    fn set_fault(&mut self, active: bool) {
        if self.fault == active {
            return;
        }
        self.fault = active;

        let color = if active {
            RGB8 {
                r: LED_BRIGHTNESS,
                g: 0,
                b: 0,
            }
        } else {
            RGB8::default()
        };
        self.write(color);
    }
}
