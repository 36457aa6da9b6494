//! Ingestion → Publish Pipeline
//!
//! Zwei Tasks teilen sich genau einen Slot. Der Ingestion-Task überschreibt
//! ihn mit jedem gültigen Frame, der Publish-Task nimmt den jeweils neuesten
//! Frame heraus. Ungelesene Frames gehen dabei verloren (latest-wins).

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use serde::Serialize;

use crate::link::receive_frame;
use crate::logging::{log_debug, log_warn};
use crate::traits::{BrokerClient, BrokerError, SerialLink, StatusDisplay};
use crate::types::{CalendarTime, SensorFrame};

/// MQTT Topic für Sensordaten
pub const TOPIC_SENSOR: &str = "topic/sensor";

/// Buffer-Größe für einen serialisierten Payload
pub const PAYLOAD_CAPACITY: usize = 256;

/// Wechsel zwischen Sensor-Daten und Uhrzeit auf der Anzeige
pub const DISPLAY_TOGGLE_MS: u64 = 5000;

// ============================================================================
// Handoff
// ============================================================================

/// Single-Slot Handoff zwischen Ingestion und Publish
///
/// `offer` überschreibt einen ungelesenen Frame, `take` leert den Slot.
/// Zusätzlich wird der zuletzt angebotene Frame für die Anzeige gehalten;
/// `latest` verändert den Slot nicht.
pub struct FrameSlot<M: RawMutex> {
    pending: Signal<M, SensorFrame>,
    latest: Mutex<M, Cell<Option<SensorFrame>>>,
}

impl<M: RawMutex> FrameSlot<M> {
    pub const fn new() -> Self {
        Self {
            pending: Signal::new(),
            latest: Mutex::new(Cell::new(None)),
        }
    }

    pub fn offer(&self, frame: SensorFrame) {
        self.latest.lock(|l| l.set(Some(frame)));
        self.pending.signal(frame);
    }

    /// Nimmt den ungelesenen Frame heraus (non-blocking)
    pub fn take(&self) -> Option<SensorFrame> {
        self.pending.try_take()
    }

    pub fn is_ready(&self) -> bool {
        self.pending.signaled()
    }

    /// Zuletzt empfangener Frame, unabhängig davon ob er schon published wurde
    pub fn latest(&self) -> Option<SensorFrame> {
        self.latest.lock(|l| l.get())
    }
}

impl<M: RawMutex> Default for FrameSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ein Ingestion-Schritt: Frame lesen und in den Slot legen
///
/// Gibt den Frame zurück, damit der Aufrufer ihn weiterreichen kann.
/// Ein verworfener Read lässt den Slot unverändert.
pub async fn ingest_once<L: SerialLink, M: RawMutex>(
    link: &mut L,
    slot: &FrameSlot<M>,
) -> Option<SensorFrame> {
    let frame = receive_frame(link).await?;
    log_debug!("Link: received {}", frame);
    slot.offer(frame);
    Some(frame)
}

// ============================================================================
// Payload
// ============================================================================

/// Fehler beim Erzeugen des JSON-Payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    BufferTooSmall,
}

/// MQTT Payload für einen Sensor-Frame
///
/// Genau eins von `date` und `uptime_ms` ist gesetzt.
#[derive(Debug, Clone, Serialize)]
pub struct SensorPayload<'a> {
    pub sensor_id: &'a str,
    pub hub_id: &'a str,
    pub temp: f32,
    pub humidity: f32,
    pub moisture: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<CalendarTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
}

impl<'a> SensorPayload<'a> {
    /// Baut den Payload; ohne gültige Zeit wird die Uptime verwendet
    pub fn from_frame(
        frame: &'a SensorFrame,
        hub_id: &'a str,
        time: Option<CalendarTime>,
        uptime_ms: u64,
    ) -> Self {
        Self {
            sensor_id: frame.node_id(),
            hub_id,
            temp: frame.temperature,
            humidity: frame.humidity,
            moisture: frame.moisture,
            uptime_ms: if time.is_none() { Some(uptime_ms) } else { None },
            date: time,
        }
    }

    pub fn to_json(&self, out: &mut [u8]) -> Result<usize, PayloadError> {
        serde_json_core::to_slice(self, out).map_err(|_| PayloadError::BufferTooSmall)
    }
}

// ============================================================================
// Publish
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishError {
    Payload(PayloadError),
    Broker(BrokerError),
}

/// Publiziert Frames aus dem Slot an den Broker
pub struct Publisher<'a> {
    hub_id: &'a str,
    topic: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(hub_id: &'a str) -> Self {
        Self {
            hub_id,
            topic: TOPIC_SENSOR,
        }
    }

    pub fn with_topic(hub_id: &'a str, topic: &'a str) -> Self {
        Self { hub_id, topic }
    }

    /// Ein Publish-Schritt
    ///
    /// Nur wenn der Broker live ist UND ein Frame bereitliegt, wird der Slot
    /// geleert und der Frame published. `Ok(false)` heißt: nichts zu tun.
    pub async fn publish_once<B: BrokerClient, M: RawMutex>(
        &self,
        broker: &mut B,
        slot: &FrameSlot<M>,
        time: Option<CalendarTime>,
        uptime_ms: u64,
    ) -> Result<bool, PublishError> {
        if !broker.is_connected() || !slot.is_ready() {
            return Ok(false);
        }
        let Some(frame) = slot.take() else {
            return Ok(false);
        };

        let payload = SensorPayload::from_frame(&frame, self.hub_id, time, uptime_ms);
        let mut buf = [0u8; PAYLOAD_CAPACITY];
        let len = payload.to_json(&mut buf).map_err(PublishError::Payload)?;

        broker
            .publish(self.topic, &buf[..len])
            .await
            .map_err(|e| {
                log_warn!("MQTT: publish failed: {}", e);
                PublishError::Broker(e)
            })?;

        log_debug!("MQTT: published {} bytes to {}", len, self.topic);
        Ok(true)
    }
}

// ============================================================================
// Anzeige
// ============================================================================

/// Abwechselnde Anzeige von letztem Sensor-Frame und Uhrzeit
///
/// Ein frisch empfangener Frame wird sofort gezeigt und bleibt ein volles
/// Intervall stehen.
pub struct DisplayRotation {
    show_frame: bool,
    last_toggle_ms: u64,
}

impl DisplayRotation {
    pub const fn new(now_ms: u64) -> Self {
        Self {
            show_frame: true,
            last_toggle_ms: now_ms,
        }
    }

    /// Ein Refresh-Schritt der Anzeige
    ///
    /// # Parameter
    /// - `fresh`: seit dem letzten Refresh empfangener Frame
    /// - `latest`: zuletzt empfangener Frame (für den Wechsel)
    /// - `time`: aktuelle Uhrzeit, falls synchronisiert
    pub fn refresh<D: StatusDisplay>(
        &mut self,
        display: &mut D,
        fresh: Option<SensorFrame>,
        latest: Option<SensorFrame>,
        time: Option<CalendarTime>,
        broker_connected: bool,
        now_ms: u64,
    ) {
        if let Some(frame) = fresh {
            display.show_sensor_data(&frame);
            self.show_frame = true;
            self.last_toggle_ms = now_ms;
        } else if now_ms.saturating_sub(self.last_toggle_ms) >= DISPLAY_TOGGLE_MS {
            self.last_toggle_ms = now_ms;
            self.show_frame = !self.show_frame;

            if self.show_frame {
                if let Some(frame) = latest {
                    display.show_sensor_data(&frame);
                }
            } else if let Some(time) = time {
                display.show_time(&time);
            }
        }

        display.show_broker_status(broker_connected);
    }
}

// ============================================================================
// Operator Console
// ============================================================================

/// Befehle über die serielle Konsole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleCommand {
    /// Credential-Frame erneut senden
    SendWifi,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "sendwifi" => Some(ConsoleCommand::SendWifi),
            _ => None,
        }
    }
}

/// Sammelt Konsolen-Bytes zu Zeilen
///
/// Zu lange Zeilen werden bis zum nächsten Zeilenende verworfen.
pub struct LineBuffer<const N: usize> {
    line: Vec<u8, N>,
    overflow: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflow: false,
        }
    }

    /// Nimmt ein Byte auf; bei Zeilenende wird die Zeile als Befehl geparst
    pub fn push(&mut self, byte: u8) -> Option<ConsoleCommand> {
        if byte == b'\n' || byte == b'\r' {
            let command = if self.overflow {
                None
            } else {
                core::str::from_utf8(&self.line)
                    .ok()
                    .and_then(ConsoleCommand::parse)
            };
            self.line.clear();
            self.overflow = false;
            return command;
        }

        if self.line.push(byte).is_err() {
            self.overflow = true;
        }
        None
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
