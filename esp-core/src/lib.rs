//! ESP Core - Platform-agnostic Logic and Traits
//!
//! Diese Crate enthält KEINE Hardware-Dependencies.
//! Sie definiert Traits, Protokolle und die Pipeline-Logik des Hubs.

#![cfg_attr(not(test), no_std)]

mod logging;

pub mod config_store;
pub mod coordinator;
pub mod link;
pub mod pipeline;
pub mod storage;
pub mod supervisor;
pub mod traits;
pub mod types;

// Re-exports für einfachen Zugriff
pub use config_store::{ConfigError, ConfigStore};
pub use coordinator::{BootMode, Coordinator, LoopOutcome, select_mode};
pub use link::{DeliveryStatus, FrameError};
pub use pipeline::{DisplayRotation, FrameSlot, Publisher, SensorPayload, TOPIC_SENSOR};
pub use supervisor::{ConnectError, ConnectionState, ConnectionSupervisor, RetryPolicy};
pub use traits::{
    BrokerClient, BrokerError, ConfigBackend, ConfigPortal, FaultIndicator, LinkError,
    RadioError, SerialLink, StatusDisplay, StorageError, TimeSource, WifiRadio,
};
pub use types::{CalendarTime, HubConfig, SensorFrame, WifiCredentials};
