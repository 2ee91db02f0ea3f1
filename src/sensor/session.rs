use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Disconnected,
    Scanning,
    ConnectedIdle,
    ConnectedLogging,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Disconnected
    }
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::ConnectedIdle | SessionState::ConnectedLogging
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Scanning => "scanning",
            SessionState::ConnectedIdle => "connected_idle",
            SessionState::ConnectedLogging => "connected_logging",
        }
    }
}

/// Advertisement seen while scanning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
}

impl DiscoveredDevice {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    pub fn matches(&self, pattern: &str) -> bool {
        self.name
            .to_ascii_lowercase()
            .contains(&pattern.to_ascii_lowercase())
    }
}

/// The currently paired wearable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SensorSession {
    pub id: String,
    pub name: String,
    pub address: String,
    /// Device serial used to address query URIs.
    pub serial: String,
    pub connected_at: DateTime<Utc>,
}

impl SensorSession {
    pub fn new(device: &DiscoveredDevice, name_pattern: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: device.name.clone(),
            address: device.address.clone(),
            serial: serial_from_name(&device.name, name_pattern),
            connected_at: Utc::now(),
        }
    }
}

/// Advertised names look like `Movesense 174630000192`; the serial is
/// whatever follows the product prefix.
pub fn serial_from_name(name: &str, prefix: &str) -> String {
    let trimmed = name.trim();
    match trimmed.get(..prefix.len()) {
        Some(head) if !prefix.is_empty() && head.eq_ignore_ascii_case(prefix) => {
            trimmed[prefix.len()..].trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Mutable controller state guarded by the controller's lock.
#[derive(Debug, Default)]
pub(crate) struct ControllerState {
    pub state: SessionState,
    pub discovered: Vec<DiscoveredDevice>,
    pub session: Option<SensorSession>,
}

impl ControllerState {
    /// Returns false when the address was already known.
    pub fn remember(&mut self, device: DiscoveredDevice) -> bool {
        if self.discovered.iter().any(|d| d.address == device.address) {
            return false;
        }
        self.discovered.push(device);
        true
    }

    pub fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.discovered.clear();
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_strips_product_prefix() {
        assert_eq!(serial_from_name("Movesense 174630000192", "Movesense"), "174630000192");
        assert_eq!(serial_from_name("movesense 1746", "Movesense"), "1746");
        assert_eq!(serial_from_name("Polar H10", "Movesense"), "Polar H10");
        assert_eq!(serial_from_name("Move", "Movesense"), "Move");
    }

    #[test]
    fn name_filter_is_case_insensitive() {
        assert!(DiscoveredDevice::new("MOVESENSE 1", "aa").matches("Movesense"));
        assert!(!DiscoveredDevice::new("Polar H10", "bb").matches("Movesense"));
    }

    #[test]
    fn discovered_devices_deduplicate_by_address() {
        let mut state = ControllerState::default();
        assert!(state.remember(DiscoveredDevice::new("Movesense 1", "aa")));
        assert!(!state.remember(DiscoveredDevice::new("Movesense 1 (renamed)", "aa")));
        assert!(state.remember(DiscoveredDevice::new("Movesense 2", "bb")));
        assert_eq!(state.discovered.len(), 2);
    }
}
