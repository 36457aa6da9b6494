// Clock Task - SNTP Sync nach der Association, danach alle 24 h
use defmt::{info, warn};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};

use crate::config::{NTP_RESYNC_SECS, NTP_RETRY_SECS, NTP_SERVER};
use crate::hal::sntp_query;
use crate::{CLOCK, HubSupervisor};

#[embassy_executor::task]
pub async fn clock_task(stack: &'static Stack<'static>, supervisor: &'static HubSupervisor) {
    loop {
        if !supervisor.is_associated() {
            Timer::after(Duration::from_secs(1)).await;
            continue;
        }

        match sntp_query(*stack, NTP_SERVER).await {
            Ok(unix_secs) => {
                CLOCK.set_unix_time(unix_secs);
                info!("NTP: next sync in {}s", NTP_RESYNC_SECS);
                Timer::after(Duration::from_secs(NTP_RESYNC_SECS)).await;
            }
            Err(e) => {
                warn!("NTP: sync failed: {}", e);
                Timer::after(Duration::from_secs(NTP_RETRY_SECS)).await;
            }
        }
    }
}
