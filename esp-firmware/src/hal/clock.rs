// Uhrzeit über SNTP (RFC 4330, nur Client-Request/Transmit-Timestamp)
use core::cell::Cell;

use defmt::{Debug2Format, info, warn};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack, dns::DnsQueryType};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, with_timeout};
use esp_core::{CalendarTime, TimeSource};

use crate::config::{DNS_TIMEOUT_SECS, NTP_PORT, NTP_TIMEOUT_SECS, NTP_UTC_OFFSET_SECS};

/// Sekunden zwischen 1900-01-01 (NTP-Epoche) und 1970-01-01
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

const NTP_PACKET_SIZE: usize = 48;

/// Fehler beim Zeit-Sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SntpError {
    DnsResolutionFailed,
    SocketError,
    Timeout,
    InvalidReply,
}

/// Zeitquelle: letzter Sync (Unix-Sekunden) + vergangene Uptime
pub struct NtpClock {
    // (Unix-Sekunden, Uptime in ms zum Sync-Zeitpunkt)
    base: Mutex<CriticalSectionRawMutex, Cell<Option<(i64, u64)>>>,
}

impl NtpClock {
    pub const fn new() -> Self {
        Self {
            base: Mutex::new(Cell::new(None)),
        }
    }

    pub fn set_unix_time(&self, unix_secs: i64) {
        let now_ms = Instant::now().as_millis();
        self.base.lock(|b| b.set(Some((unix_secs, now_ms))));
    }

    pub fn unix_time(&self) -> Option<i64> {
        let (unix_secs, at_ms) = self.base.lock(|b| b.get())?;
        let elapsed = Instant::now().as_millis().saturating_sub(at_ms) / 1000;
        Some(unix_secs + elapsed as i64)
    }
}

impl Default for NtpClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for NtpClock {
    fn current_time(&self) -> Option<CalendarTime> {
        CalendarTime::from_unix(self.unix_time()?, NTP_UTC_OFFSET_SECS)
    }
}

/// Fragt einmal die Uhrzeit bei `server` ab
///
/// Gibt Unix-Sekunden (UTC) zurück.
pub async fn sntp_query(stack: Stack<'static>, server: &str) -> Result<i64, SntpError> {
    let addrs = with_timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        stack.dns_query(server, DnsQueryType::A),
    )
    .await
    .map_err(|_| SntpError::Timeout)?
    .map_err(|_| SntpError::DnsResolutionFailed)?;
    let addr: IpAddress = *addrs.first().ok_or(SntpError::DnsResolutionFailed)?;

    let mut rx_meta = [PacketMetadata::EMPTY; 1];
    let mut tx_meta = [PacketMetadata::EMPTY; 1];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(0).map_err(|_| SntpError::SocketError)?;

    // LI = 0, Version = 4, Mode = 3 (Client)
    let mut request = [0u8; NTP_PACKET_SIZE];
    request[0] = 0x23;

    let server_endpoint = IpEndpoint::new(addr, NTP_PORT);
    socket
        .send_to(&request, server_endpoint)
        .await
        .map_err(|e| {
            warn!("NTP: send failed: {}", Debug2Format(&e));
            SntpError::SocketError
        })?;

    let mut reply = [0u8; NTP_PACKET_SIZE];
    let (n, _meta) = with_timeout(
        Duration::from_secs(NTP_TIMEOUT_SECS),
        socket.recv_from(&mut reply),
    )
    .await
    .map_err(|_| SntpError::Timeout)?
    .map_err(|_| SntpError::SocketError)?;

    let unix_secs = parse_reply(&reply[..n]).ok_or(SntpError::InvalidReply)?;
    info!("NTP: synced, unix time {}", unix_secs);
    Ok(unix_secs)
}

/// Transmit-Timestamp (Sekunden, Offset 40) aus einer Server-Antwort
fn parse_reply(reply: &[u8]) -> Option<i64> {
    if reply.len() < NTP_PACKET_SIZE {
        return None;
    }
    // Mode 4 (Server), Stratum 0 = Kiss-o'-Death
    if reply[0] & 0x07 != 4 || reply[1] == 0 {
        return None;
    }

    let secs = u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]);
    if secs == 0 {
        return None;
    }
    Some(i64::from(secs) - NTP_UNIX_OFFSET)
}
