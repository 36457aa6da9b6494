//! Mocks für die Host-Tests
//!
//! Alle Mocks, die Zeit brauchen, teilen sich eine `VirtualClock`. `MockDelay`
//! wartet nicht wirklich, sondern stellt nur die Uhr vor. So laufen 30 s
//! Association-Timeout in Mikrosekunden ab.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal_async::delay::DelayNs;
use esp_core::storage::{decode_flash_record, encode_flash_record};
use esp_core::{
    BrokerClient, BrokerError, CalendarTime, ConfigBackend, ConfigPortal, FaultIndicator,
    LinkError, RadioError, SensorFrame, SerialLink, StatusDisplay, StorageError, TimeSource,
    WifiRadio,
};

// ============================================================================
// Virtuelle Zeit
// ============================================================================

#[derive(Clone, Default)]
pub struct VirtualClock(Rc<Cell<u64>>);

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_us(&self) -> u64 {
        self.0.get()
    }

    pub fn now_ms(&self) -> u64 {
        self.0.get() / 1000
    }

    pub fn advance_us(&self, us: u64) {
        self.0.set(self.0.get() + us);
    }
}

pub struct MockDelay {
    pub clock: VirtualClock,
}

impl MockDelay {
    pub fn new(clock: &VirtualClock) -> Self {
        Self {
            clock: clock.clone(),
        }
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_us(u64::from(ns).div_ceil(1000));
    }

    async fn delay_us(&mut self, us: u32) {
        self.clock.advance_us(u64::from(us));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_us(u64::from(ms) * 1000);
    }
}

// ============================================================================
// Serielle Verbindung
// ============================================================================

/// In-Memory UART mit zeitgesteuerten Antworten
pub struct MockLink {
    clock: VirtualClock,
    rx: VecDeque<u8>,
    scheduled: Vec<(u64, u8)>,
    pub written: Vec<u8>,
    /// Maximal physisch geschriebene Bytes pro `write`
    pub write_limit: Option<usize>,
    /// Antwort-Byte und Verzögerung nach jedem `write`
    pub reply: Option<(u64, u8)>,
    pub fail_reads: bool,
}

impl MockLink {
    pub fn new(clock: &VirtualClock) -> Self {
        Self {
            clock: clock.clone(),
            rx: VecDeque::new(),
            scheduled: Vec::new(),
            written: Vec::new(),
            write_limit: None,
            reply: None,
            fail_reads: false,
        }
    }

    /// Bytes liegen sofort im Empfangspuffer
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Bytes treffen erst zum Zeitpunkt `at_ms` ein
    pub fn feed_at(&mut self, at_ms: u64, bytes: &[u8]) {
        self.scheduled.extend(bytes.iter().map(|&b| (at_ms, b)));
    }

    pub fn pending(&mut self) -> usize {
        self.deliver();
        self.rx.len()
    }

    fn deliver(&mut self) {
        let now = self.clock.now_ms();
        let (due, later): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|&(at, _)| at <= now);
        self.scheduled = later;
        self.rx.extend(due.into_iter().map(|(_, b)| b));
    }
}

impl SerialLink for MockLink {
    fn bytes_available(&mut self) -> bool {
        self.deliver();
        !self.rx.is_empty()
    }

    fn try_read_byte(&mut self) -> Option<u8> {
        self.deliver();
        self.rx.pop_front()
    }

    async fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if self.fail_reads {
            return Err(LinkError::ReadFailed);
        }
        self.deliver();
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap_or(0);
        }
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        let n = self.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        self.written.extend_from_slice(&data[..n]);
        if let Some((after_ms, byte)) = self.reply {
            self.feed_at(self.clock.now_ms() + after_ms, &[byte]);
        }
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Backend das ein Dokument im RAM hält (SD-Karte)
pub struct MemoryBackend {
    pub name: &'static str,
    pub present: bool,
    pub file: Option<Vec<u8>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub writes: usize,
}

impl MemoryBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            present: true,
            file: None,
            fail_reads: false,
            fail_writes: false,
            writes: 0,
        }
    }

    pub fn absent(name: &'static str) -> Self {
        Self {
            present: false,
            ..Self::new(name)
        }
    }

    pub fn with_file(name: &'static str, doc: &str) -> Self {
        Self {
            file: Some(doc.as_bytes().to_vec()),
            ..Self::new(name)
        }
    }

    pub fn file_str(&self) -> Option<&str> {
        self.file.as_deref().and_then(|f| std::str::from_utf8(f).ok())
    }
}

impl ConfigBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&mut self) -> bool {
        self.present
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Io);
        }
        let file = self.file.as_ref().ok_or(StorageError::NotFound)?;
        if file.len() > buf.len() {
            return Err(StorageError::TooLarge);
        }
        buf[..file.len()].copy_from_slice(file);
        Ok(file.len())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }
        self.file = Some(data.to_vec());
        self.writes += 1;
        Ok(())
    }
}

/// Backend mit Flash-Record Framing über einem 4 KiB Sektor
pub struct MemoryFlash {
    pub sector: Vec<u8>,
}

impl MemoryFlash {
    pub fn erased() -> Self {
        Self {
            sector: vec![0xFF; 4096],
        }
    }
}

impl ConfigBackend for MemoryFlash {
    fn name(&self) -> &'static str {
        "flash"
    }

    fn init(&mut self) -> bool {
        true
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let payload = decode_flash_record(&self.sector)?;
        if payload.len() > buf.len() {
            return Err(StorageError::TooLarge);
        }
        buf[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let mut image = vec![0xFF; self.sector.len()];
        encode_flash_record(data, &mut image)?;
        self.sector = image;
        Ok(())
    }
}

// ============================================================================
// Konnektivität
// ============================================================================

pub struct MockRadio {
    /// Anzahl `is_associated` Abfragen bis die Station verbunden ist
    /// (`None` = verbindet nie)
    pub associate_after: Option<u32>,
    pub reject: bool,
    pub begin_calls: u32,
    pub last_ssid: String,
    polls: u32,
    begun: bool,
    connected: bool,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            associate_after: Some(0),
            reject: false,
            begin_calls: 0,
            last_ssid: String::new(),
            polls: 0,
            begun: false,
            connected: false,
        }
    }

    pub fn never_associates() -> Self {
        Self {
            associate_after: None,
            ..Self::new()
        }
    }

    /// Station verliert die Verbindung und muss neu assoziieren
    pub fn drop_link(&mut self) {
        self.connected = false;
        self.begun = false;
    }
}

impl WifiRadio for MockRadio {
    async fn begin_association(&mut self, ssid: &str, _password: &str) -> Result<(), RadioError> {
        self.begin_calls += 1;
        self.last_ssid = ssid.to_string();
        if self.reject {
            return Err(RadioError::ConnectFailed);
        }
        self.polls = 0;
        self.begun = true;
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        if self.connected {
            return true;
        }
        if !self.begun {
            return false;
        }
        match self.associate_after {
            Some(after) if self.polls >= after => {
                self.connected = true;
                true
            }
            Some(_) => {
                self.polls += 1;
                false
            }
            None => false,
        }
    }
}

pub struct MockBroker {
    /// Ergebnisse der nächsten `connect` Aufrufe; leer = Fehlschlag
    pub connect_results: VecDeque<Result<(), BrokerError>>,
    pub connect_attempts: u32,
    pub connected: bool,
    pub published: Vec<(String, String)>,
    pub fail_publish: bool,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            connect_results: VecDeque::new(),
            connect_attempts: 0,
            connected: false,
            published: Vec::new(),
            fail_publish: false,
        }
    }

    pub fn accepting() -> Self {
        let mut broker = Self::new();
        broker.connect_results.push_back(Ok(()));
        broker
    }

    pub fn live() -> Self {
        Self {
            connected: true,
            ..Self::new()
        }
    }
}

impl BrokerClient for MockBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.connect_attempts += 1;
        let result = self
            .connect_results
            .pop_front()
            .unwrap_or(Err(BrokerError::ConnectionFailed));
        self.connected = result.is_ok();
        result
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if self.fail_publish {
            return Err(BrokerError::PublishFailed);
        }
        self.published.push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Zeichnet Fehleranzeige-Wechsel mit Zeitstempel (ms) auf
pub struct MockFault {
    clock: VirtualClock,
    pub events: Vec<(u64, bool)>,
}

impl MockFault {
    pub fn new(clock: &VirtualClock) -> Self {
        Self {
            clock: clock.clone(),
            events: Vec::new(),
        }
    }
}

impl FaultIndicator for MockFault {
    fn set_fault(&mut self, active: bool) {
        self.events.push((self.clock.now_ms(), active));
    }
}

// ============================================================================
// Externe Kollaborateure
// ============================================================================

#[derive(Default)]
pub struct MockDisplay {
    pub statuses: Vec<String>,
    pub wifi: Vec<(bool, Option<String>)>,
    pub broker: Vec<bool>,
    pub frames: Vec<SensorFrame>,
    pub times: Vec<CalendarTime>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_status(&self) -> Option<&str> {
        self.statuses.last().map(String::as_str)
    }

    pub fn showed(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }
}

impl StatusDisplay for MockDisplay {
    fn show_sensor_data(&mut self, frame: &SensorFrame) {
        self.frames.push(*frame);
    }

    fn show_time(&mut self, time: &CalendarTime) {
        self.times.push(*time);
    }

    fn show_status(&mut self, status: &str) {
        self.statuses.push(status.to_string());
    }

    fn show_wifi_status(&mut self, connected: bool, ssid: Option<&str>) {
        self.wifi.push((connected, ssid.map(str::to_string)));
    }

    fn show_broker_status(&mut self, connected: bool) {
        self.broker.push(connected);
    }
}

#[derive(Default)]
pub struct MockPortal {
    pub active: bool,
    /// Taster wird beim nächsten `check_trigger` als gedrückt gemeldet
    pub button_pressed: bool,
    pub begin_calls: u32,
}

impl MockPortal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigPortal for MockPortal {
    fn begin(&mut self) {
        self.begin_calls += 1;
        self.active = true;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn check_trigger(&mut self) -> bool {
        if self.button_pressed {
            self.button_pressed = false;
            self.begin();
            return true;
        }
        false
    }
}

pub struct MockClock(pub Option<CalendarTime>);

impl TimeSource for MockClock {
    fn current_time(&self) -> Option<CalendarTime> {
        self.0
    }
}
