// Hardware Abstraction Layer (HAL) Module
//
// Adapter, die die Traits aus esp-core auf ESP32-S3 Hardware abbilden.
// Die Logik dahinter wird in esp-tests gegen Mocks getestet.

pub mod clock;
pub mod display;
pub mod mqtt_broker;
pub mod portal;
pub mod radio;
pub mod status_led;
pub mod storage;
pub mod uart_link;

pub use clock::{NtpClock, sntp_query};
pub use display::ConsoleDisplay;
pub use mqtt_broker::{MqttBroker, MqttBuffers};
pub use portal::ButtonPortal;
pub use radio::EspRadio;
pub use status_led::{LED_BUFFER_SIZE, StatusLed};
pub use storage::{FlashBackend, SdCardBackend};
pub use uart_link::{ConsoleInput, UartLink};
