//! Core Types für den UART-MQTT Hub
//!
//! Datenstrukturen ohne Hardware-Dependencies

use chrono::{Datelike, Timelike};
use heapless::String;
use serde::Serialize;

/// Default MQTT Broker Port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default Hub-Kennung, solange keine Konfiguration geladen wurde
pub const DEFAULT_HUB_ID: &str = "H-0";

// Feste Kapazitäten des Konfigurations-Records
pub const MQTT_SERVER_CAPACITY: usize = 64;
pub const MQTT_USERNAME_CAPACITY: usize = 32;
pub const MQTT_PASSWORD_CAPACITY: usize = 64;
pub const WIFI_SSID_CAPACITY: usize = 32;
pub const WIFI_PASSWORD_CAPACITY: usize = 64;
pub const HUB_ID_CAPACITY: usize = 16;

/// Länge des Node-ID Felds im Sensor-Frame (7 Zeichen + Terminator)
pub const NODE_ID_LEN: usize = 8;

/// Betreiber-Konfiguration des Hubs
///
/// Wird beim Start mit Defaults erzeugt, vom `ConfigStore` geladen und
/// über dessen Save-Pfad persistiert. Die JSON-Keys entsprechen exakt den
/// Feldnamen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubConfig {
    pub mqtt_server: String<MQTT_SERVER_CAPACITY>,
    pub mqtt_port: u16,
    pub mqtt_username: String<MQTT_USERNAME_CAPACITY>,
    pub mqtt_password: String<MQTT_PASSWORD_CAPACITY>,
    pub wifi_ssid: String<WIFI_SSID_CAPACITY>,
    pub wifi_password: String<WIFI_PASSWORD_CAPACITY>,
    pub hub_id: String<HUB_ID_CAPACITY>,
}

impl Default for HubConfig {
    fn default() -> Self {
        let mut hub_id = String::new();
        // "H-0" passt immer in HUB_ID_CAPACITY
        let _ = hub_id.push_str(DEFAULT_HUB_ID);

        Self {
            mqtt_server: String::new(),
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_username: String::new(),
            mqtt_password: String::new(),
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            hub_id,
        }
    }
}

impl HubConfig {
    /// WiFi-Zugangsdaten für Association und Credential-Frame
    pub fn wifi_credentials(&self) -> WifiCredentials<'_> {
        WifiCredentials {
            ssid: self.wifi_ssid.as_str(),
            password: self.wifi_password.as_str(),
        }
    }
}

/// WiFi-Zugangsdaten (geliehen aus der `HubConfig`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiCredentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

/// Ein Messwert-Datensatz vom Companion-Gerät
///
/// Die Node-ID wird roh (8 Bytes, NUL-terminiert) gespeichert,
/// so wie sie über die Leitung kommt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    node_id: [u8; NODE_ID_LEN],
    pub temperature: f32,
    pub humidity: f32,
    pub moisture: i32,
}

impl SensorFrame {
    /// Erstellt einen Frame; die Node-ID wird auf 7 Bytes gekürzt
    pub fn new(node_id: &str, temperature: f32, humidity: f32, moisture: i32) -> Self {
        let mut raw = [0u8; NODE_ID_LEN];
        let mut end = node_id.len().min(NODE_ID_LEN - 1);
        while !node_id.is_char_boundary(end) {
            end -= 1;
        }
        raw[..end].copy_from_slice(&node_id.as_bytes()[..end]);

        Self::from_raw(raw, temperature, humidity, moisture)
    }

    pub(crate) fn from_raw(
        node_id: [u8; NODE_ID_LEN],
        temperature: f32,
        humidity: f32,
        moisture: i32,
    ) -> Self {
        Self {
            node_id,
            temperature,
            humidity,
            moisture,
        }
    }

    /// Node-ID bis zum ersten NUL-Byte
    ///
    /// Ungültiges UTF-8 wird am ersten fehlerhaften Byte abgeschnitten.
    pub fn node_id(&self) -> &str {
        let end = self
            .node_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NODE_ID_LEN);
        let raw = &self.node_id[..end];

        match core::str::from_utf8(raw) {
            Ok(id) => id,
            Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Rohes Node-ID Feld (für das Wire-Format)
    pub fn node_id_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.node_id
    }
}

/// Kalenderzeit für den MQTT-Payload (`date` Objekt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CalendarTime {
    /// Konvertiert Unix-Sekunden plus Zeitzonen-Offset in Kalenderzeit
    ///
    /// Gibt `None` zurück wenn der Zeitpunkt außerhalb des darstellbaren
    /// Bereichs liegt (Jahr < 0 oder > 65535).
    pub fn from_unix(unix_secs: i64, utc_offset_secs: i32) -> Option<Self> {
        let local = unix_secs.checked_add(i64::from(utc_offset_secs))?;
        let dt = chrono::DateTime::from_timestamp(local, 0)?.naive_utc();

        Some(Self {
            year: u16::try_from(dt.year()).ok()?,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        })
    }
}

// ============================================================================
// defmt::Format Implementations (optional feature)
// ============================================================================

#[cfg(feature = "defmt")]
impl defmt::Format for SensorFrame {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "SensorFrame {{ node: {}, temp: {}, humidity: {}, moisture: {} }}",
            self.node_id(),
            self.temperature,
            self.humidity,
            self.moisture
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CalendarTime {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{}-{}-{} {}:{}:{}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second
        )
    }
}
