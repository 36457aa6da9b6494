// UART-Adapter: Companion-Link (UART1) und Konsole (UART0)

use embassy_time::{Duration, Instant, with_deadline};
use esp_core::pipeline::{ConsoleCommand, LineBuffer};
use esp_core::{LinkError, SerialLink};
use esp_hal::Async;
use esp_hal::gpio::interconnect::{PeripheralInput, PeripheralOutput};
use esp_hal::uart::{Config, ConfigError, Uart, UartRx};

use crate::config::{CONSOLE_LINE_CAPACITY, LINK_BAUDRATE, LINK_READ_TIMEOUT_MS};

/// Serielle Verbindung zum Companion-Gerät (115200 8N1)
pub struct UartLink<'d> {
    uart: Uart<'d, Async>,
}

impl<'d> UartLink<'d> {
    pub fn new(
        uart: esp_hal::peripherals::UART1<'d>,
        rx: impl PeripheralInput<'d>,
        tx: impl PeripheralOutput<'d>,
    ) -> Result<Self, ConfigError> {
        let config = Config::default().with_baudrate(LINK_BAUDRATE);
        let uart = Uart::new(uart, config)?
            .with_rx(rx)
            .with_tx(tx)
            .into_async();

        Ok(Self { uart })
    }
}

impl SerialLink for UartLink<'_> {
    fn bytes_available(&mut self) -> bool {
        self.uart.read_ready()
    }

    fn try_read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.uart.read_buffered(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    async fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let deadline = Instant::now() + Duration::from_millis(LINK_READ_TIMEOUT_MS);
        let mut filled = 0;

        while filled < buf.len() {
            match with_deadline(deadline, self.uart.read_async(&mut buf[filled..])).await {
                Ok(Ok(n)) => filled += n,
                Ok(Err(_)) => return Err(LinkError::ReadFailed),
                // Timeout: Teil-Frame zurückgeben
                Err(_) => break,
            }
        }

        Ok(filled)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, LinkError> {
        let mut written = 0;

        while written < data.len() {
            match self.uart.write_async(&data[written..]).await {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(_) if written == 0 => return Err(LinkError::WriteFailed),
                Err(_) => break,
            }
        }

        Ok(written)
    }

    async fn flush(&mut self) -> Result<(), LinkError> {
        self.uart
            .flush_async()
            .await
            .map_err(|_| LinkError::WriteFailed)
    }
}

/// Operator-Konsole: nur Empfang, Zeilen werden zu Kommandos
pub struct ConsoleInput<'d> {
    rx: UartRx<'d, Async>,
    line: LineBuffer<CONSOLE_LINE_CAPACITY>,
}

impl<'d> ConsoleInput<'d> {
    pub fn new(
        uart: esp_hal::peripherals::UART0<'d>,
        rx: impl PeripheralInput<'d>,
    ) -> Result<Self, ConfigError> {
        let config = Config::default().with_baudrate(LINK_BAUDRATE);
        let rx = UartRx::new(uart, config)?.with_rx(rx).into_async();

        Ok(Self {
            rx,
            line: LineBuffer::new(),
        })
    }

    /// Non-blocking: liest vorhandene Bytes, meldet ein vollständiges Kommando
    pub fn poll(&mut self) -> Option<ConsoleCommand> {
        let mut chunk = [0u8; 16];
        let n = self.rx.read_buffered(&mut chunk).unwrap_or(0);

        let mut command = None;
        for &byte in &chunk[..n] {
            if let Some(cmd) = self.line.push(byte) {
                command = Some(cmd);
            }
        }
        command
    }
}
