//! Error types for the glove controller.

use thiserror::Error;

/// Errors produced by the session, codec, resolver, and replay machinery.
///
/// Lifecycle failures (`ConnectFailure`, `ResolutionFailure`) always leave the
/// session in `Disconnected` with the transport closed. Per-operation
/// failures (`WriteFailure`, `ReadFailure`) leave the session state untouched.
#[derive(Debug, Error)]
pub enum GloveError {
    /// No device with the requested name answered within the scan window.
    #[error("no device named {name:?} found within {timeout_secs} s")]
    DiscoveryTimeout {
        /// Advertised name that was searched for.
        name: String,
        /// Scan window that elapsed.
        timeout_secs: u64,
    },

    /// Failure in the platform BLE stack itself (no adapter, scan refused).
    #[error("bluetooth stack error: {0}")]
    Bluetooth(String),

    /// Transport-level connection attempt failed.
    #[error("failed to connect to {identity}: {detail}")]
    ConnectFailure {
        /// The device identity that was targeted.
        identity: String,
        /// Transport-reported reason.
        detail: String,
    },

    /// A required endpoint was missing after service discovery.
    #[error("endpoint resolution failed: {missing} not found")]
    ResolutionFailure {
        /// Which identifier could not be matched.
        missing: String,
    },

    /// Out-of-range index or malformed value handed to the codec.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single characteristic write failed. The session stays usable.
    #[error("write failed: {detail}")]
    WriteFailure {
        /// Transport-reported reason.
        detail: String,
    },

    /// A single characteristic read failed. The session stays usable.
    #[error("read failed: {detail}")]
    ReadFailure {
        /// Transport-reported reason.
        detail: String,
    },

    /// `send`/`receive` was called while no endpoint exists.
    #[error("cannot {operation} while session is {state}")]
    NotReady {
        /// The operation that was refused.
        operation: &'static str,
        /// The session state at the time of the call.
        state: String,
    },

    /// A motion recording could not be loaded or parsed.
    #[error("recording error: {0}")]
    Recording(String),
}
