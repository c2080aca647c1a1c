//! Infrastructure Layer
//!
//! Everything that touches the outside world: the BLE transport and logging.

pub mod bluetooth;
pub mod logging;
