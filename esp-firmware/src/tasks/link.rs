// Link Task - Empfängt Sensor-Frames vom Companion-Gerät
use defmt::{info, warn};
use embassy_time::{Delay, Duration, Timer};
use esp_core::WifiCredentials;
use esp_core::link::send_credentials;
use esp_core::pipeline::{ConsoleCommand, ingest_once};

use crate::config::LINK_POLL_INTERVAL_MS;
use crate::hal::{ConsoleInput, UartLink};
use crate::{FreshFrame, HubFrameSlot, ResendRequest};

/// Link Task - Ingestion alle 5 ms
///
/// - Liest vollständige 20-Byte Frames und legt sie in den Slot (latest-wins)
/// - Meldet jeden neuen Frame sofort an die Anzeige
/// - Sendet die WiFi-Credentials erneut, wenn main es anfordert oder
///   auf der Konsole `sendwifi` eingegeben wird
///
/// Der Link gehört nach dem Boot allein diesem Task.
#[embassy_executor::task]
pub async fn link_task(
    mut link: UartLink<'static>,
    mut console: ConsoleInput<'static>,
    creds: WifiCredentials<'static>,
    slot: &'static HubFrameSlot,
    fresh: &'static FreshFrame,
    resend: &'static ResendRequest,
) {
    info!("Link: Task started");
    let mut delay = Delay;

    loop {
        if let Some(frame) = ingest_once(&mut link, slot).await {
            fresh.signal(frame);
        }

        let requested = resend.try_take().is_some();
        let typed = matches!(console.poll(), Some(ConsoleCommand::SendWifi));
        if requested || typed {
            info!("Link: sending WiFi credentials");
            let status = send_credentials(&mut link, &mut delay, &creds).await;
            if status.is_success() {
                info!("Link: credentials delivered ({})", status);
            } else {
                warn!("Link: credential send failed");
            }
        }

        Timer::after(Duration::from_millis(LINK_POLL_INTERVAL_MS)).await;
    }
}
