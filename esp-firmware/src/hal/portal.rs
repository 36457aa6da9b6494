// Portal-Trigger: BOOT-Taster (GPIO0, aktiv low)
use core::sync::atomic::Ordering;

use defmt::info;
use esp_core::ConfigPortal;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, InputPin, Pull};

use crate::config::BUTTON_DEBOUNCE_MS;
use crate::{PORTAL_ACTIVE, PORTAL_STARTED};

/// Startet das HTTP-Portal (portal_task) per Taster oder auf Anforderung
pub struct ButtonPortal<'d> {
    button: Input<'d>,
    delay: Delay,
}

impl<'d> ButtonPortal<'d> {
    pub fn new(pin: impl InputPin + 'd) -> Self {
        let button = Input::new(pin, InputConfig::default().with_pull(Pull::Up));
        Self {
            button,
            delay: Delay::new(),
        }
    }
}

impl ConfigPortal for ButtonPortal<'_> {
    fn begin(&mut self) {
        if PORTAL_ACTIVE.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Portal: starting configuration portal");
        PORTAL_STARTED.signal(());
    }

    fn is_active(&self) -> bool {
        PORTAL_ACTIVE.load(Ordering::Acquire)
    }

    fn check_trigger(&mut self) -> bool {
        if self.is_active() || self.button.is_high() {
            return false;
        }

        // Entprellen: nach der Wartezeit immer noch gedrückt?
        self.delay.delay_millis(BUTTON_DEBOUNCE_MS);
        if self.button.is_high() {
            return false;
        }

        info!("Portal: button pressed");
        self.begin();
        true
    }
}
