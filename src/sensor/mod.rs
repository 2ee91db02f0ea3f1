//! Wearable sensor access: discovery, pairing, logger control and draining.
//!
//! Both vendor surfaces are traits the host implements. [`SensorLink`]
//! covers Bluetooth discovery and connection; [`DeviceClient`] is the
//! device's URI-addressed query interface (get / put / delete with JSON
//! string bodies).

pub mod controller;
pub mod drain;
pub mod protocol;
pub mod session;

use std::fmt;

use async_trait::async_trait;

pub use controller::{ControllerSnapshot, LoggerTask, SensorController};
pub use drain::{drain_logger, DrainTask};
pub use protocol::PayloadError;
pub use session::{DiscoveredDevice, SensorSession, SessionState};

/// Failure reported by the vendor SDK for a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No connection to the addressed device.
    NotConnected,
    /// The command never reached the device or its reply was lost.
    Transport(String),
    /// The device answered with an error status.
    Rejected { status: u16, message: String },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotConnected => write!(f, "device not connected"),
            DeviceError::Transport(msg) => write!(f, "transport error: {}", msg),
            DeviceError::Rejected { status, message } => {
                write!(f, "device rejected command ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for DeviceError {}

/// Bluetooth discovery and connection management.
///
/// Devices found while discovery runs are reported by the host through
/// [`SensorController::on_device_discovered`].
#[async_trait]
pub trait SensorLink: Send + Sync {
    async fn start_discovery(&self) -> Result<(), DeviceError>;
    async fn stop_discovery(&self) -> Result<(), DeviceError>;
    /// Resolves once the connection is fully established.
    async fn connect(&self, address: &str) -> Result<(), DeviceError>;
    async fn disconnect(&self, address: &str) -> Result<(), DeviceError>;
}

/// URI-addressed query interface of a connected device.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn get(&self, uri: &str) -> Result<String, DeviceError>;
    async fn put(&self, uri: &str, body: &str) -> Result<String, DeviceError>;
    async fn delete(&self, uri: &str) -> Result<String, DeviceError>;
}
