//! Hardware Abstraction Traits
//!
//! Diese Traits definieren Schnittstellen für Hardware-Zugriff und externe
//! Kollaborateure ohne konkrete Implementierung.
//!
//! # Implementierungen
//! - **Production:** Adapter in `esp-firmware/src/hal` (UART, SD, Flash, Radio, MQTT)
//! - **Testing:** Mocks in `esp-tests/tests/common`

#![allow(async_fn_in_trait)]

use crate::types::{CalendarTime, SensorFrame};

// ============================================================================
// Fehler-Typen
// ============================================================================

/// Fehler-Typ für Storage-Backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Backend beim Boot nicht verfügbar
    Unavailable,
    /// Keine Konfigurationsdatei vorhanden
    NotFound,
    /// Lese-/Schreibfehler auf dem Medium
    Io,
    /// Daten vorhanden aber beschädigt (Magic, Länge, CRC)
    Corrupt,
    /// Record passt nicht in den Speicherbereich
    TooLarge,
}

/// Fehler-Typ für die serielle Companion-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    ReadFailed,
    WriteFailed,
}

/// Fehler-Typ für das WiFi-Radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    ConfigRejected,
    StartFailed,
    ConnectFailed,
}

/// Fehler-Typ für die MQTT Broker-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BrokerError {
    DnsResolutionFailed,
    ConnectionFailed,
    Rejected,
    NotConnected,
    PublishFailed,
}

// ============================================================================
// Storage
// ============================================================================

/// Ein Speicher-Backend für die Konfigurationsdatei
///
/// Ein Backend hält genau ein Dokument unter einem festen Pfad.
/// `write` ist alles-oder-nichts: entweder das komplette Dokument ist
/// geschrieben, oder es wird ein Fehler gemeldet.
pub trait ConfigBackend {
    /// Name für Logs ("sd", "flash", ...)
    fn name(&self) -> &'static str;

    /// Prüft ob das Medium verfügbar ist (einmalig beim Boot)
    fn init(&mut self) -> bool;

    /// Liest das Dokument in `buf`, gibt die Länge zurück
    ///
    /// # Fehlerbehandlung
    /// `StorageError::NotFound` wenn kein Dokument existiert
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Ersetzt das Dokument vollständig
    fn write(&mut self, data: &[u8]) -> Result<(), StorageError>;
}

// ============================================================================
// Serielle Verbindung
// ============================================================================

/// Byte-orientierte Punkt-zu-Punkt Verbindung zum Companion-Gerät
pub trait SerialLink {
    /// Non-blocking: liegen Bytes im Empfangspuffer?
    fn bytes_available(&mut self) -> bool;

    /// Non-blocking: ein Byte lesen falls vorhanden
    fn try_read_byte(&mut self) -> Option<u8>;

    /// Liest bis `buf` voll ist oder das Lese-Timeout der Verbindung abläuft
    ///
    /// Gibt die Anzahl tatsächlich gelesener Bytes zurück (kann < `buf.len()` sein).
    async fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Schreibt `data`, gibt die Anzahl physisch geschriebener Bytes zurück
    async fn write(&mut self, data: &[u8]) -> Result<usize, LinkError>;

    /// Wartet bis alle Bytes gesendet sind
    async fn flush(&mut self) -> Result<(), LinkError>;
}

// ============================================================================
// Konnektivität
// ============================================================================

/// WiFi Station-Interface
pub trait WifiRadio {
    /// Startet die Association (kehrt zurück ohne auf das Ergebnis zu warten)
    async fn begin_association(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// Ist die Station verbunden und hat eine IP-Adresse?
    fn is_associated(&mut self) -> bool;
}

/// MQTT Broker-Session
///
/// Die Zugangsdaten (Client-ID, User, Passwort) kennt die Implementierung.
pub trait BrokerClient {
    /// Ein einzelner Verbindungsversuch (TCP + MQTT CONNECT)
    async fn connect(&mut self) -> Result<(), BrokerError>;

    /// Ist die Session aktuell live?
    fn is_connected(&self) -> bool;

    /// Published `payload` auf `topic` (QoS 0)
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Hält die Session am Leben (Keep-Alive Ping)
    async fn poll(&mut self) -> Result<(), BrokerError>;
}

/// Sichtbare Fehleranzeige (Status-LED)
pub trait FaultIndicator {
    fn set_fault(&mut self, active: bool);
}

// ============================================================================
// Externe Kollaborateure
// ============================================================================

/// Zeitquelle (RTC / NTP)
pub trait TimeSource {
    /// Aktuelle Kalenderzeit, `None` solange keine gültige Zeit bekannt ist
    fn current_time(&self) -> Option<CalendarTime>;
}

/// Einweg-Anzeige: Rückgabewerte werden vom Core nie ausgewertet
pub trait StatusDisplay {
    fn show_sensor_data(&mut self, frame: &SensorFrame);
    fn show_time(&mut self, time: &CalendarTime);
    fn show_status(&mut self, status: &str);
    fn show_wifi_status(&mut self, connected: bool, ssid: Option<&str>);
    fn show_broker_status(&mut self, connected: bool);
}

/// Konfigurations-Portal
pub trait ConfigPortal {
    /// Übernimmt den Betrieb (Portal-Modus)
    fn begin(&mut self);

    fn is_active(&self) -> bool;

    /// Prüft den Trigger (Taster); startet das Portal bei Betätigung
    fn check_trigger(&mut self) -> bool;
}
