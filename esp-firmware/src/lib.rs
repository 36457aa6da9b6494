// Library-Root: Hardware-Adapter, Tasks und geteilter Zustand
// Keine Standard-Bibliothek (Embedded System)
#![no_std]

extern crate alloc;

// Module
pub mod config;
pub mod hal;
pub mod tasks;

use core::cell::RefCell;
use core::sync::atomic::AtomicBool;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use esp_core::config_store::CONFIG_DOC_CAPACITY;
use esp_core::{ConfigError, ConnectionSupervisor, FrameSlot, SensorFrame};

use crate::hal::NtpClock;

// ============================================================================
// Type-Aliase
// ============================================================================

/// Supervisor, geteilt zwischen main (WiFi) und MQTT Task (Broker)
pub type HubSupervisor = ConnectionSupervisor<CriticalSectionRawMutex>;

/// Handoff Ingestion → Publish (latest-wins), angelegt in main
pub type HubFrameSlot = FrameSlot<CriticalSectionRawMutex>;

/// Frisch empfangener Frame für die Anzeige (Link Task → Display Task)
pub type FreshFrame = Signal<CriticalSectionRawMutex, SensorFrame>;

/// Einmaliger Credential-Versand, ausgelöst von main, bedient vom Link Task
pub type ResendRequest = Signal<CriticalSectionRawMutex, ()>;

/// Ein JSON-Dokument vom oder für das Portal
pub type PortalDocument = heapless::Vec<u8, CONFIG_DOC_CAPACITY>;

// ============================================================================
// Geteilter Zustand zwischen Tasks
// ============================================================================

/// Uhrzeit aus SNTP, gelesen von MQTT- und Display-Task
pub static CLOCK: NtpClock = NtpClock::new();

/// Portal wurde gestartet (Taster, fehlende Konfiguration oder WiFi-Fehler)
pub static PORTAL_STARTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Portal ist aktiv, normale Überwachung pausiert
pub static PORTAL_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Aktuelle Konfiguration für GET /config (Passwort ausgeblendet)
pub static PORTAL_VIEW: Mutex<CriticalSectionRawMutex, RefCell<PortalDocument>> =
    Mutex::new(RefCell::new(heapless::Vec::new()));

/// POST /save → main (nur main besitzt den ConfigStore)
pub static PORTAL_SAVE: Channel<CriticalSectionRawMutex, PortalDocument, 1> = Channel::new();

/// Antwort von main auf PORTAL_SAVE
pub static PORTAL_SAVE_RESULT: Signal<CriticalSectionRawMutex, Result<usize, ConfigError>> =
    Signal::new();

/// Neustart anfordern (nach Save oder POST /restart)
pub static RESTART: Signal<CriticalSectionRawMutex, ()> = Signal::new();
