// Projekt-Konfiguration: Konstanten und Hardware-Zuordnungen
#![allow(dead_code)]

use esp_core::config_store::CONFIG_DOC_CAPACITY;

// ============================================================================
// Pin-Belegung (ESP32-S3)
// ============================================================================
//
// Die Pins selbst werden in main.rs als Peripherals übergeben,
// die Konstanten dokumentieren die Verdrahtung.

/// UART1 RX vom Companion-Gerät (ESP-NOW Empfänger)
pub const LINK_RX_GPIO_PIN: u8 = 19;

/// UART1 TX zum Companion-Gerät
pub const LINK_TX_GPIO_PIN: u8 = 20;

/// SD-Karte Chip-Select (SPI2)
pub const SD_CS_GPIO_PIN: u8 = 10;

/// SD-Karte MOSI / SCK / MISO
pub const SD_MOSI_GPIO_PIN: u8 = 11;
pub const SD_SCK_GPIO_PIN: u8 = 12;
pub const SD_MISO_GPIO_PIN: u8 = 13;

/// GPIO-Pin für die RGB Status-LED (WS2812 auf dem DevKitC-1)
pub const LED_GPIO_PIN: u8 = 48;

/// BOOT-Taster, startet das Konfigurations-Portal
pub const PORTAL_BUTTON_GPIO_PIN: u8 = 0;

/// UART0 RX der Konsole ("sendwifi")
pub const CONSOLE_RX_GPIO_PIN: u8 = 44;

// ============================================================================
// Serielle Verbindung
// ============================================================================

/// Baudrate für Companion-Link und Konsole (8N1)
pub const LINK_BAUDRATE: u32 = 115_200;

/// Lese-Timeout für einen Frame in Millisekunden
pub const LINK_READ_TIMEOUT_MS: u64 = 1000;

/// Zeilenpuffer für Konsolen-Kommandos
pub const CONSOLE_LINE_CAPACITY: usize = 32;

// ============================================================================
// Task-Intervalle
// ============================================================================

/// Ingestion: Frames vom Link lesen
pub const LINK_POLL_INTERVAL_MS: u64 = 5;

/// Publish: Slot prüfen und an MQTT senden
pub const PUBLISH_INTERVAL_MS: u64 = 50;

/// Display-Refresh
pub const DISPLAY_INTERVAL_MS: u64 = 100;

/// Überwachungs-Schleife in main
pub const SUPERVISOR_INTERVAL_MS: u64 = 10;

/// Wartezeit zwischen Portal-Save und Neustart
pub const RESTART_DELAY_MS: u64 = 1000;

// ============================================================================
// Status-LED
// ============================================================================

/// Helligkeits-Level für die LED (0-255)
/// Wert ist gedimmt für Augenschonung
pub const LED_BRIGHTNESS: u8 = 10;

/// RMT Taktfrequenz in MHz
/// 80 MHz ist optimal für WS2812 LED-Timing
pub const RMT_CLOCK_MHZ: u32 = 80;

// ============================================================================
// Speicher
// ============================================================================

/// Heap-Größe für WiFi (Bytes)
/// WiFi benötigt dynamischen Speicher für Pakete
pub const WIFI_HEAP_SIZE: usize = 65536; // 64 KB

/// Zusätzliche Heap-Größe (Bytes)
/// picoserve nutzt den Heap für Request-Bodies
pub const EXTRA_HEAP_SIZE: usize = 36864; // 36 KB

/// Dateiname der Konfiguration im Root-Verzeichnis der SD-Karte (8.3)
pub const SD_CONFIG_FILE: &str = "CONFIG.JSN";

/// SPI-Takt für die SD-Karte in kHz
pub const SD_SPI_FREQUENCY_KHZ: u32 = 400;

/// Offset des Konfigurations-Sektors im Flash (NVS-Partition)
pub const FLASH_CONFIG_OFFSET: u32 = 0x9000;

/// Größe des Flash-Sektors
pub const FLASH_SECTOR_SIZE: usize = 4096;

// ============================================================================
// Fallback-Zugangsdaten
// ============================================================================
//
// Optional zur Build-Zeit aus .env geladen. Werden nur genutzt, wenn weder
// SD-Karte noch Flash eine Konfiguration liefern, damit das Portal im
// WLAN erreichbar ist.

pub const FALLBACK_WIFI_SSID: Option<&str> = option_env!("FALLBACK_WIFI_SSID");
pub const FALLBACK_WIFI_PASSWORD: Option<&str> = option_env!("FALLBACK_WIFI_PASSWORD");
pub const FALLBACK_MQTT_BROKER: Option<&str> = option_env!("FALLBACK_MQTT_BROKER");

// ============================================================================
// MQTT Konfiguration
// ============================================================================

/// Wartezeit nach erschöpften Broker-Versuchen in Sekunden
pub const MQTT_RECONNECT_DELAY_SECS: u64 = 5;

/// MQTT Buffer-Größe in Bytes (Payload max. 256 Bytes)
pub const MQTT_BUFFER_SIZE: usize = 1024;

/// TCP Buffer-Größe für die Broker-Verbindung
pub const MQTT_TCP_BUFFER_SIZE: usize = 2048;

/// Keep-Alive in Sekunden (Ping nach der Hälfte)
pub const MQTT_KEEP_ALIVE_SECS: u16 = 30;

/// TCP Connect/Read Timeout in Sekunden
pub const MQTT_SOCKET_TIMEOUT_SECS: u64 = 10;

/// DNS Query Timeout in Sekunden
pub const DNS_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Zeit (SNTP)
// ============================================================================

/// NTP Server
pub const NTP_SERVER: &str = "pool.ntp.org";

/// NTP Port
pub const NTP_PORT: u16 = 123;

/// Zeitzone: UTC+6
pub const NTP_UTC_OFFSET_SECS: i32 = 6 * 3600;

/// Resync-Intervall (24 h)
pub const NTP_RESYNC_SECS: u64 = 86_400;

/// Wartezeit nach fehlgeschlagenem Sync
pub const NTP_RETRY_SECS: u64 = 60;

/// Antwort-Timeout in Sekunden
pub const NTP_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// HTTP Server Konfiguration (Portal)
// ============================================================================

/// HTTP Buffer-Größe in Bytes
/// Für HTTP Request/Response Headers und Body (größtes Konfigurations-Dokument)
pub const HTTP_BUFFER_SIZE: usize = 1024 + CONFIG_DOC_CAPACITY;

/// TCP RX Buffer-Größe in Bytes
/// Für eingehende TCP-Daten vom Client
pub const TCP_RX_BUFFER_SIZE: usize = 1024;

/// TCP TX Buffer-Größe in Bytes
/// Für ausgehende TCP-Daten zum Client
pub const TCP_TX_BUFFER_SIZE: usize = 1024;

/// Port des Portals
pub const PORTAL_PORT: u16 = 80;

/// Entprellzeit des Tasters
pub const BUTTON_DEBOUNCE_MS: u32 = 50;
