// Status-Anzeige über defmt (kein Panel angeschlossen)
use defmt::info;
use esp_core::{CalendarTime, SensorFrame, StatusDisplay};

/// Schreibt jede Anzeige als Log-Zeile
///
/// Der Broker-Status wird alle 100 ms aufgefrischt, geloggt wird nur eine Änderung.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDisplay {
    broker: Option<bool>,
}

impl ConsoleDisplay {
    pub const fn new() -> Self {
        Self { broker: None }
    }
}

impl StatusDisplay for ConsoleDisplay {
    fn show_sensor_data(&mut self, frame: &SensorFrame) {
        info!(
            "Display: {} T={}C H={}% M={}",
            frame.node_id(),
            frame.temperature,
            frame.humidity,
            frame.moisture
        );
    }

    fn show_time(&mut self, time: &CalendarTime) {
        info!(
            "Display: {}-{}-{} {}:{}:{}",
            time.year, time.month, time.day, time.hour, time.minute, time.second
        );
    }

    fn show_status(&mut self, status: &str) {
        info!("Display: {}", status);
    }

    fn show_wifi_status(&mut self, connected: bool, ssid: Option<&str>) {
        match (connected, ssid) {
            (true, Some(ssid)) => info!("Display: WiFi connected ({})", ssid),
            (true, None) => info!("Display: WiFi connected"),
            (false, _) => info!("Display: WiFi disconnected"),
        }
    }

    fn show_broker_status(&mut self, connected: bool) {
        if self.broker == Some(connected) {
            return;
        }
        self.broker = Some(connected);
        info!("Display: MQTT {}", if connected { "online" } else { "offline" });
    }
}
