// MQTT Broker-Session über rust-mqtt
//
// Der MQTT Client besitzt seinen Transport für die gesamte Laufzeit. Ein
// Reconnect setzt deshalb nur ein Flag, der Transport baut die TCP-Verbindung
// beim nächsten Schreiben selbst neu auf.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{Debug2Format, info, warn};
use embassy_net::tcp::{self, TcpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack, dns::DnsQueryType};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, with_timeout};
use esp_core::{BrokerClient, BrokerError, HubConfig};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;
use rust_mqtt::utils::types::EncodedString;

use crate::config::{
    DNS_TIMEOUT_SECS, MQTT_BUFFER_SIZE, MQTT_KEEP_ALIVE_SECS, MQTT_SOCKET_TIMEOUT_SECS,
    MQTT_TCP_BUFFER_SIZE,
};

// ============================================================================
// Transport
// ============================================================================

/// Ziel der nächsten TCP-Verbindung, gesetzt von `MqttBroker::connect`
struct TransportTarget {
    endpoint: Mutex<CriticalSectionRawMutex, Cell<Option<IpEndpoint>>>,
    reset: AtomicBool,
}

static TARGET: TransportTarget = TransportTarget {
    endpoint: Mutex::new(Cell::new(None)),
    reset: AtomicBool::new(false),
};

/// TCP-Socket, der sich nach einem Reset neu verbindet
pub struct BrokerTransport {
    socket: TcpSocket<'static>,
}

impl BrokerTransport {
    fn new(
        stack: Stack<'static>,
        rx_buffer: &'static mut [u8],
        tx_buffer: &'static mut [u8],
    ) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(MQTT_SOCKET_TIMEOUT_SECS)));
        Self { socket }
    }

    async fn ensure_connected(&mut self) -> Result<(), tcp::Error> {
        if !TARGET.reset.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // Alte Session verwerfen (RST), danach ist der Socket wieder Closed
        self.socket.abort();
        let _ = self.socket.flush().await;

        let endpoint = TARGET
            .endpoint
            .lock(|e| e.get())
            .ok_or(tcp::Error::ConnectionReset)?;

        self.socket.connect(endpoint).await.map_err(|e| {
            warn!("MQTT: TCP connect failed: {}", Debug2Format(&e));
            tcp::Error::ConnectionReset
        })?;
        info!("MQTT: TCP connected");
        Ok(())
    }
}

impl embedded_io_async::ErrorType for BrokerTransport {
    type Error = tcp::Error;
}

impl embedded_io_async::Read for BrokerTransport {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.ensure_connected().await?;
        self.socket.read(buf).await
    }
}

impl embedded_io_async::Write for BrokerTransport {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.ensure_connected().await?;
        self.socket.write(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket.flush().await
    }
}

// ============================================================================
// Broker
// ============================================================================

/// Statische Buffer für TCP und MQTT (leben so lange wie der Client)
pub struct MqttBuffers {
    tcp_rx: [u8; MQTT_TCP_BUFFER_SIZE],
    tcp_tx: [u8; MQTT_TCP_BUFFER_SIZE],
    send: [u8; MQTT_BUFFER_SIZE],
    recv: [u8; MQTT_BUFFER_SIZE],
}

impl MqttBuffers {
    pub const fn new() -> Self {
        Self {
            tcp_rx: [0; MQTT_TCP_BUFFER_SIZE],
            tcp_tx: [0; MQTT_TCP_BUFFER_SIZE],
            send: [0; MQTT_BUFFER_SIZE],
            recv: [0; MQTT_BUFFER_SIZE],
        }
    }
}

impl Default for MqttBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// MQTT v5 Session mit den Zugangsdaten aus der Hub-Konfiguration
pub struct MqttBroker {
    client: MqttClient<'static, BrokerTransport, 5, CountingRng>,
    stack: &'static Stack<'static>,
    server: &'static str,
    port: u16,
    connected: bool,
    last_activity: Instant,
}

impl MqttBroker {
    pub fn new(
        stack: &'static Stack<'static>,
        config: &'static HubConfig,
        buffers: &'static mut MqttBuffers,
    ) -> Self {
        let transport = BrokerTransport::new(*stack, &mut buffers.tcp_rx, &mut buffers.tcp_tx);

        // Client-ID = Hub-ID
        let rng = CountingRng(20000);
        let mut client_config = ClientConfig::<5, _>::new(MqttVersion::MQTTv5, rng);
        client_config.client_id = EncodedString {
            string: config.hub_id.as_str(),
            len: config.hub_id.len() as u16,
        };
        if !config.mqtt_username.is_empty() {
            client_config.add_username(config.mqtt_username.as_str());
            client_config.add_password(config.mqtt_password.as_str());
        }
        client_config.keep_alive = MQTT_KEEP_ALIVE_SECS;
        client_config.max_packet_size = MQTT_BUFFER_SIZE as u32;

        let client = MqttClient::<_, 5, _>::new(
            transport,
            &mut buffers.send,
            MQTT_BUFFER_SIZE,
            &mut buffers.recv,
            MQTT_BUFFER_SIZE,
            client_config,
        );

        Self {
            client,
            stack,
            server: config.mqtt_server.as_str(),
            port: config.mqtt_port,
            connected: false,
            last_activity: Instant::now(),
        }
    }
}

impl BrokerClient for MqttBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;

        info!("MQTT: Resolving '{}'...", self.server);
        let broker_ip = resolve_hostname(self.stack, self.server).await?;
        info!("MQTT: Resolved to {}", Debug2Format(&broker_ip));

        TARGET.endpoint.lock(|e| {
            e.set(Some(IpEndpoint::new(IpAddress::Ipv4(broker_ip), self.port)))
        });
        TARGET.reset.store(true, Ordering::Release);

        // CONNECT: der Transport verbindet TCP beim ersten Schreiben
        self.client.connect_to_broker().await.map_err(|code| {
            warn!("MQTT: CONNECT failed: {}", Debug2Format(&code));
            match code {
                ReasonCode::NetworkError => BrokerError::ConnectionFailed,
                _ => BrokerError::Rejected,
            }
        })?;

        info!("MQTT: Connected to broker");
        self.connected = true;
        self.last_activity = Instant::now();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        if let Err(code) = self
            .client
            .send_message(topic, payload, QualityOfService::QoS0, false)
            .await
        {
            warn!("MQTT: publish failed: {}", Debug2Format(&code));
            self.connected = false;
            return Err(BrokerError::PublishFailed);
        }

        self.last_activity = Instant::now();
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }

        let ping_after = Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS) / 2);
        if self.last_activity.elapsed() < ping_after {
            return Ok(());
        }

        if self.client.send_ping().await.is_err() {
            warn!("MQTT: keep-alive ping failed");
            self.connected = false;
            return Err(BrokerError::NotConnected);
        }

        self.last_activity = Instant::now();
        Ok(())
    }
}

/// Löst Hostname zu IPv4-Adresse auf
///
/// Nutzt embassy-net DNS-Stack mit konfigurierbarem Timeout.
/// IP-Literale werden direkt übernommen.
async fn resolve_hostname(
    stack: &'static Stack<'static>,
    hostname: &str,
) -> Result<Ipv4Address, BrokerError> {
    if hostname.is_empty() {
        return Err(BrokerError::DnsResolutionFailed);
    }

    let result = with_timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        stack.dns_query(hostname, DnsQueryType::A),
    )
    .await;

    match result {
        Ok(Ok(addrs)) => {
            for addr in addrs {
                #[allow(irrefutable_let_patterns)]
                if let IpAddress::Ipv4(ipv4) = addr {
                    return Ok(ipv4);
                }
            }
            Err(BrokerError::DnsResolutionFailed)
        }
        Ok(Err(_)) | Err(_) => Err(BrokerError::DnsResolutionFailed),
    }
}
