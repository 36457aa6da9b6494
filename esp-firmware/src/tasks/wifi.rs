// Netzwerk Tasks - Stack-Runner und DHCP-Monitor
//
// Die WiFi-Association selbst macht main über den Supervisor.
use defmt::{Debug2Format, info};
use embassy_net::{Runner, Stack};
use embassy_time::{Duration, Timer};
use esp_radio::wifi::WifiDevice;

/// Network Task
///
/// Überwacht den Netzwerk-Stack:
/// - Prozessiert Netzwerk-Pakete
/// - Managed TCP/IP Stack
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// DHCP Monitor Task
///
/// Loggt die Netzwerk-Konfiguration bei jeder neuen DHCP-Adresse
#[embassy_executor::task]
pub async fn dhcp_task(stack: &'static Stack<'static>) {
    loop {
        stack.wait_config_up().await;

        if let Some(config) = stack.config_v4() {
            info!("WiFi: Got IP address!");
            info!("  IP:      {}", Debug2Format(&config.address.address()));
            info!("  Gateway: {}", Debug2Format(&config.gateway));
            info!("  DNS:     {}", Debug2Format(&config.dns_servers));
        }

        stack.wait_config_down().await;
        info!("WiFi: IP configuration lost");
        Timer::after(Duration::from_millis(500)).await;
    }
}
