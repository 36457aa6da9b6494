// Task-Modul: Enthält alle Embassy Tasks
//
// Jeder Task läuft asynchron und unabhängig.
// Link → MQTT über den FrameSlot, Portal ↔ main über Channel/Signal (siehe lib.rs).

pub mod clock;
pub mod display;
pub mod link;
pub mod mqtt;
pub mod portal;
pub mod wifi;

// Re-export Tasks für einfachen Import
pub use clock::clock_task;
pub use display::display_task;
pub use link::link_task;
pub use mqtt::mqtt_task;
pub use portal::portal_task;
pub use wifi::{dhcp_task, net_task};
