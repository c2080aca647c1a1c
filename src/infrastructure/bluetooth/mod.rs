//! Bluetooth Module
//!
//! BLE communication with the robotic glove.
//!
//! ## Modules
//!
//! - [`transport`] - the platform BLE boundary (btleplug in production)
//! - [`scanner`] - discovery by advertised name with fallback
//! - [`resolver`] - service/characteristic endpoint resolution
//! - [`session`] - the connection state machine and send/receive surface

pub mod resolver;
pub mod scanner;
pub mod session;
pub mod transport;

pub use session::{GloveSession, SessionConfig, SessionState};
pub use transport::{BtleTransport, DeviceIdentity, Transport};
