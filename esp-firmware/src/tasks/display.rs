// Display Task - Sensor-Daten, Uhrzeit und Broker-Status
use embassy_time::{Duration, Instant, Timer};
use esp_core::{ConnectionState, DisplayRotation, TimeSource};

use crate::config::DISPLAY_INTERVAL_MS;
use crate::hal::ConsoleDisplay;
use crate::{CLOCK, FreshFrame, HubFrameSlot, HubSupervisor};

/// Display Task - Refresh alle 100 ms
///
/// Neue Frames vom Link Task erscheinen beim nächsten Refresh, sonst wird
/// alle 5 s zwischen letztem Frame und Uhrzeit gewechselt.
#[embassy_executor::task]
pub async fn display_task(
    slot: &'static HubFrameSlot,
    fresh: &'static FreshFrame,
    supervisor: &'static HubSupervisor,
) {
    let mut display = ConsoleDisplay::new();
    let mut rotation = DisplayRotation::new(Instant::now().as_millis());

    loop {
        rotation.refresh(
            &mut display,
            fresh.try_take(),
            slot.latest(),
            CLOCK.current_time(),
            supervisor.state() == ConnectionState::BrokerConnected,
            Instant::now().as_millis(),
        );

        Timer::after(Duration::from_millis(DISPLAY_INTERVAL_MS)).await;
    }
}
