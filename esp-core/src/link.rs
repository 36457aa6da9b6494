//! Binär-Protokoll zur Companion-Verbindung (UART)
//!
//! Alle Frames haben feste Größen, es gibt keine Längenpräfixe und keine
//! Resynchronisation. Ein verschobener Byte-Strom bleibt desynchronisiert
//! bis die Verbindung zurückgesetzt wird.
//!
//! # Sensor-Frame (20 Bytes, Little-Endian)
//! ```text
//! Offset  0: node_id   [u8; 8]  (NUL-terminiert)
//! Offset  8: temp      f32
//! Offset 12: humidity  f32
//! Offset 16: moisture  i32
//! ```
//!
//! # Credential-Frame (1 + 96 Bytes)
//! ```text
//! Offset  0: Sentinel  0x60 ('`')
//! Offset  1: ssid      [u8; 32] (NUL-terminiert)
//! Offset 33: password  [u8; 64] (NUL-terminiert)
//! ```

use embedded_hal_async::delay::DelayNs;

use crate::logging::{log_debug, log_info, log_warn};
use crate::traits::SerialLink;
use crate::types::{NODE_ID_LEN, SensorFrame, WifiCredentials};

/// Größe eines Sensor-Frames auf der Leitung
pub const SENSOR_FRAME_SIZE: usize = NODE_ID_LEN + 4 + 4 + 4;

/// SSID-Feld im Credential-Frame
pub const SSID_FIELD_LEN: usize = 32;

/// Passwort-Feld im Credential-Frame
pub const PASSWORD_FIELD_LEN: usize = 64;

/// Credential-Record ohne Sentinel
pub const CREDENTIAL_RECORD_SIZE: usize = SSID_FIELD_LEN + PASSWORD_FIELD_LEN;

/// Kompletter Credential-Frame inklusive Sentinel
pub const CREDENTIAL_FRAME_SIZE: usize = 1 + CREDENTIAL_RECORD_SIZE;

/// Start-Marker des Credential-Frames
pub const CREDENTIAL_SENTINEL: u8 = b'`';

/// Bestätigung des Companion-Geräts
pub const ACK_BYTE: u8 = b'W';

/// Test-Zeichen der Liveness-Probe
pub const PROBE_BYTE: u8 = b'T';

/// Wartezeit auf die Bestätigung nach einem Credential-Frame
pub const ACK_TIMEOUT_MS: u32 = 5000;

/// Wartezeit auf eine Antwort der Liveness-Probe
pub const PROBE_TIMEOUT_MS: u32 = 1000;

/// Poll-Intervall während der Wartezeiten
pub const LINK_POLL_INTERVAL_MS: u32 = 10;

/// Fehler beim Dekodieren eines Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Anzahl Bytes ungleich der festen Frame-Größe
    WrongLength { expected: usize, actual: usize },
}

/// Ergebnis eines Credential-Versands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeliveryStatus {
    /// Companion hat mit 'W' bestätigt
    Confirmed,
    /// Vollständig geschrieben, aber keine Bestätigung innerhalb des Timeouts
    Unconfirmed,
    /// Nicht vollständig geschrieben
    Failed,
}

impl DeliveryStatus {
    /// `Confirmed` und `Unconfirmed` gelten als Erfolg
    pub fn is_success(self) -> bool {
        !matches!(self, DeliveryStatus::Failed)
    }
}

// ============================================================================
// Encode / Decode
// ============================================================================

/// Dekodiert einen Sensor-Frame
///
/// Akzeptiert genau `SENSOR_FRAME_SIZE` Bytes, sonst `FrameError::WrongLength`.
pub fn decode_sensor_frame(bytes: &[u8]) -> Result<SensorFrame, FrameError> {
    let raw: &[u8; SENSOR_FRAME_SIZE] = bytes.try_into().map_err(|_| FrameError::WrongLength {
        expected: SENSOR_FRAME_SIZE,
        actual: bytes.len(),
    })?;

    let mut node_id = [0u8; NODE_ID_LEN];
    node_id.copy_from_slice(&raw[0..8]);

    Ok(SensorFrame::from_raw(
        node_id,
        f32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
        f32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        i32::from_le_bytes([raw[16], raw[17], raw[18], raw[19]]),
    ))
}

/// Kodiert einen Sensor-Frame (Gegenstück des Companion-Geräts)
pub fn encode_sensor_frame(frame: &SensorFrame) -> [u8; SENSOR_FRAME_SIZE] {
    let mut out = [0u8; SENSOR_FRAME_SIZE];
    out[0..8].copy_from_slice(frame.node_id_bytes());
    out[8..12].copy_from_slice(&frame.temperature.to_le_bytes());
    out[12..16].copy_from_slice(&frame.humidity.to_le_bytes());
    out[16..20].copy_from_slice(&frame.moisture.to_le_bytes());
    out
}

/// Kodiert den Credential-Frame inklusive Sentinel
///
/// Zu lange Werte werden abgeschnitten, das letzte Byte jedes Felds bleibt NUL.
pub fn encode_credential_frame(creds: &WifiCredentials<'_>) -> [u8; CREDENTIAL_FRAME_SIZE] {
    let mut out = [0u8; CREDENTIAL_FRAME_SIZE];
    out[0] = CREDENTIAL_SENTINEL;
    copy_terminated(creds.ssid.as_bytes(), &mut out[1..1 + SSID_FIELD_LEN]);
    copy_terminated(
        creds.password.as_bytes(),
        &mut out[1 + SSID_FIELD_LEN..CREDENTIAL_FRAME_SIZE],
    );
    out
}

fn copy_terminated(src: &[u8], field: &mut [u8]) {
    let n = src.len().min(field.len() - 1);
    field[..n].copy_from_slice(&src[..n]);
}

// ============================================================================
// Protokoll-Operationen
// ============================================================================

/// Liest einen Sensor-Frame falls Bytes anliegen (non-blocking Check)
///
/// Ein kurzer Read wird verworfen; es wird nicht resynchronisiert.
pub async fn receive_frame<L: SerialLink>(link: &mut L) -> Option<SensorFrame> {
    if !link.bytes_available() {
        return None;
    }

    let mut buf = [0u8; SENSOR_FRAME_SIZE];
    let count = match link.read_up_to(&mut buf).await {
        Ok(count) => count,
        Err(e) => {
            log_warn!("Link: read failed: {}", e);
            return None;
        }
    };

    match decode_sensor_frame(&buf[..count]) {
        Ok(frame) => Some(frame),
        Err(e) => {
            log_debug!("Link: discarding short frame: {}", e);
            None
        }
    }
}

/// Sendet die WiFi-Zugangsdaten und wartet bis zu 5 s auf 'W'
pub async fn send_credentials<L: SerialLink, D: DelayNs>(
    link: &mut L,
    delay: &mut D,
    creds: &WifiCredentials<'_>,
) -> DeliveryStatus {
    log_info!("Link: sending WiFi credentials (SSID '{}')", creds.ssid);
    let frame = encode_credential_frame(creds);

    let written = match link.write(&frame).await {
        Ok(written) => written,
        Err(e) => {
            log_warn!("Link: credential write failed: {}", e);
            return DeliveryStatus::Failed;
        }
    };
    if written != CREDENTIAL_FRAME_SIZE {
        log_warn!(
            "Link: credential frame short write ({}/{} bytes)",
            written,
            CREDENTIAL_FRAME_SIZE
        );
        return DeliveryStatus::Failed;
    }
    let _ = link.flush().await;

    // Ein Byte pro Poll-Intervall; fremde Bytes kosten ebenfalls Wartezeit
    let mut waited = 0;
    while waited < ACK_TIMEOUT_MS {
        if link.try_read_byte() == Some(ACK_BYTE) {
            log_info!("Link: credentials confirmed by companion");
            return DeliveryStatus::Confirmed;
        }
        delay.delay_ms(LINK_POLL_INTERVAL_MS).await;
        waited += LINK_POLL_INTERVAL_MS;
    }

    log_warn!("Link: credentials sent but no confirmation received");
    DeliveryStatus::Unconfirmed
}

/// Liveness-Probe: 'T' senden, irgendein Byte innerhalb 1 s gilt als Antwort
pub async fn probe<L: SerialLink, D: DelayNs>(link: &mut L, delay: &mut D) -> bool {
    // Empfangspuffer leeren
    while link.try_read_byte().is_some() {}

    if link.write(&[PROBE_BYTE]).await != Ok(1) {
        log_warn!("Link: probe write failed");
        return false;
    }
    let _ = link.flush().await;

    let mut waited = 0;
    while waited < PROBE_TIMEOUT_MS {
        if let Some(byte) = link.try_read_byte() {
            log_info!("Link: probe answered with {=u8:#x}", byte);
            return true;
        }
        delay.delay_ms(LINK_POLL_INTERVAL_MS).await;
        waited += LINK_POLL_INTERVAL_MS;
    }

    log_warn!("Link: no response from companion");
    false
}
