use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    config::SensorConfig,
    scheduler::Job,
    settings::{PairedDevice, SettingsStore},
};

use super::{
    protocol,
    session::ControllerState,
    DeviceClient, DiscoveredDevice, SensorLink, SensorSession, SessionState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub state: SessionState,
    pub session: Option<SensorSession>,
    pub discovered: Vec<DiscoveredDevice>,
}

/// Owns the pairing state machine and the paired [`SensorSession`].
///
/// Commands to the wearable are serialized by `commands`. The state lock is
/// only taken to read or transition state, so readers and
/// [`handle_disconnected`](Self::handle_disconnected) never wait on a device
/// round-trip.
#[derive(Clone)]
pub struct SensorController {
    inner: Arc<Mutex<ControllerState>>,
    commands: Arc<Mutex<()>>,
    link: Arc<dyn SensorLink>,
    client: Arc<dyn DeviceClient>,
    settings: Arc<SettingsStore>,
    config: SensorConfig,
}

/// Session a command was issued against.
struct ActiveSession {
    id: String,
    serial: String,
}

impl SensorController {
    pub fn new(
        link: Arc<dyn SensorLink>,
        client: Arc<dyn DeviceClient>,
        settings: Arc<SettingsStore>,
        config: SensorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControllerState::default())),
            commands: Arc::new(Mutex::new(())),
            link,
            client,
            settings,
            config,
        }
    }

    pub fn client(&self) -> Arc<dyn DeviceClient> {
        Arc::clone(&self.client)
    }

    /// Last paired device, persisted across restarts, for reconnecting.
    pub fn restorable_device(&self) -> Option<PairedDevice> {
        self.settings.paired_device()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn session(&self) -> Option<SensorSession> {
        self.inner.lock().await.session.clone()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let guard = self.inner.lock().await;
        ControllerSnapshot {
            state: guard.state,
            session: guard.session.clone(),
            discovered: guard.discovered.clone(),
        }
    }

    pub async fn start_scan(&self) -> Result<SessionState> {
        let _commands = self.commands.lock().await;
        let state = self.state().await;
        if state != SessionState::Disconnected {
            return Err(anyhow!("cannot scan while {}", state.as_str()));
        }

        if let Err(err) = self.link.start_discovery().await {
            log_warn!("failed to start discovery: {}", err);
            return Ok(self.state().await);
        }

        let mut guard = self.inner.lock().await;
        guard.discovered.clear();
        guard.state = SessionState::Scanning;
        log_info!("scanning for '{}' devices", self.config.device_name_pattern);
        Ok(guard.state)
    }

    /// Called by the host for every advertisement while scanning.
    ///
    /// Returns true when the device is new and passes the name filter.
    pub async fn on_device_discovered(&self, device: DiscoveredDevice) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.state != SessionState::Scanning
            || !device.matches(&self.config.device_name_pattern)
        {
            return false;
        }

        let name = device.name.clone();
        let added = guard.remember(device);
        if added {
            log_debug!("discovered {}", name);
        }
        added
    }

    pub async fn stop_scan(&self) -> Result<SessionState> {
        let _commands = self.commands.lock().await;
        let state = self.state().await;
        if state != SessionState::Scanning {
            return Ok(state);
        }

        if let Err(err) = self.link.stop_discovery().await {
            log_warn!("failed to stop discovery: {}", err);
        }

        let mut guard = self.inner.lock().await;
        if guard.state == SessionState::Scanning {
            guard.reset();
        }
        Ok(guard.state)
    }

    /// Connects to a device seen in the current scan, or to the persisted
    /// paired device when its address matches.
    pub async fn connect(&self, address: &str) -> Result<SessionState> {
        let _commands = self.commands.lock().await;
        let device = {
            let guard = self.inner.lock().await;
            if guard.state != SessionState::Scanning {
                return Err(anyhow!("cannot connect while {}", guard.state.as_str()));
            }

            guard
                .discovered
                .iter()
                .find(|d| d.address == address)
                .cloned()
                .or_else(|| {
                    self.settings
                        .paired_device()
                        .filter(|paired| paired.address == address)
                        .map(|paired| DiscoveredDevice::new(paired.name, paired.address))
                })
                .ok_or_else(|| anyhow!("unknown device address {}", address))?
        };

        if let Err(err) = self.link.stop_discovery().await {
            log_warn!("failed to stop discovery before connecting: {}", err);
        }

        if let Err(err) = self.link.connect(address).await {
            log_warn!("connection to {} failed: {}", address, err);
            let mut guard = self.inner.lock().await;
            guard.reset();
            return Ok(guard.state);
        }

        let session = SensorSession::new(&device, &self.config.device_name_pattern);
        log_info!(
            "connected to {} (serial {}, session {})",
            session.name,
            session.serial,
            session.id
        );

        if let Err(err) = self.settings.set_paired_device(Some(PairedDevice {
            name: session.name.clone(),
            address: session.address.clone(),
        })) {
            log_warn!("failed to persist paired device: {:#}", err);
        }

        let mut guard = self.inner.lock().await;
        guard.discovered.clear();
        guard.session = Some(session);
        guard.state = SessionState::ConnectedIdle;
        Ok(guard.state)
    }

    /// User-initiated disconnect; forgets the paired device.
    pub async fn disconnect(&self) -> Result<SessionState> {
        let _commands = self.commands.lock().await;
        let (state, session) = {
            let guard = self.inner.lock().await;
            (guard.state, guard.session.clone())
        };

        match state {
            SessionState::Disconnected => return Ok(state),
            SessionState::Scanning => {
                if let Err(err) = self.link.stop_discovery().await {
                    log_warn!("failed to stop discovery: {}", err);
                }
            }
            SessionState::ConnectedIdle | SessionState::ConnectedLogging => {
                if let Some(session) = session {
                    if let Err(err) = self.link.disconnect(&session.address).await {
                        log_warn!("disconnect from {} failed: {}", session.address, err);
                    }
                    log_info!("disconnected from {}", session.name);
                }
            }
        }

        if let Err(err) = self.settings.set_paired_device(None) {
            log_warn!("failed to clear paired device: {:#}", err);
        }
        let mut guard = self.inner.lock().await;
        guard.reset();
        Ok(guard.state)
    }

    /// Device-initiated disconnect reported by the host.
    ///
    /// The persisted pairing is kept so the host can reconnect later. A
    /// command still in flight for the dropped session finishes without
    /// changing state.
    pub async fn handle_disconnected(&self, address: &str) -> SessionState {
        let mut guard = self.inner.lock().await;
        let matches = guard
            .session
            .as_ref()
            .map(|session| session.address == address)
            .unwrap_or(false);

        if matches {
            log_warn!("device {} dropped the connection", address);
            guard.reset();
        }
        guard.state
    }

    /// Clears the device log and starts IMU logging.
    ///
    /// Failures deleting entries or setting the clock are logged and the
    /// sequence continues; a failed config or state push leaves the
    /// controller in `ConnectedIdle`.
    pub async fn start_logging(&self) -> Result<SessionState> {
        let _commands = self.commands.lock().await;
        let active = self.active_session().await?;
        let serial = &active.serial;

        if let Err(err) = self
            .client
            .delete(&protocol::logbook_entries_uri(serial))
            .await
        {
            log_warn!("failed to clear log entries: {}", err);
        }

        if let Err(err) = self
            .client
            .put(&protocol::time_uri(serial), &protocol::time_body(Utc::now()))
            .await
        {
            log_warn!("failed to set device time: {}", err);
        }

        if let Err(err) = self
            .client
            .put(
                &protocol::logger_config_uri(serial),
                &protocol::logger_config_body(self.config.sample_rate_hz),
            )
            .await
        {
            log_warn!("failed to push logger config: {}", err);
            return Ok(self.settle(&active, SessionState::ConnectedIdle).await);
        }

        if let Err(err) = self
            .client
            .put(
                &protocol::logger_state_uri(serial),
                &protocol::logger_state_body(true),
            )
            .await
        {
            log_warn!("failed to start logger: {}", err);
            return Ok(self.settle(&active, SessionState::ConnectedIdle).await);
        }

        let state = self.settle(&active, SessionState::ConnectedLogging).await;
        log_info!("logging started on {} ({})", serial, state.as_str());
        Ok(state)
    }

    pub async fn stop_logging(&self) -> Result<SessionState> {
        let _commands = self.commands.lock().await;
        let active = self.active_session().await?;

        match self
            .client
            .put(
                &protocol::logger_state_uri(&active.serial),
                &protocol::logger_state_body(false),
            )
            .await
        {
            Ok(_) => {
                log_info!("logging stopped on {}", active.serial);
                Ok(self.settle(&active, SessionState::ConnectedIdle).await)
            }
            Err(err) => {
                log_warn!("failed to stop logger: {}", err);
                Ok(self.state().await)
            }
        }
    }

    async fn active_session(&self) -> Result<ActiveSession> {
        let guard = self.inner.lock().await;
        match (&guard.session, guard.state.is_connected()) {
            (Some(session), true) => Ok(ActiveSession {
                id: session.id.clone(),
                serial: session.serial.clone(),
            }),
            _ => Err(anyhow!("no connected sensor ({})", guard.state.as_str())),
        }
    }

    /// Moves to `next` unless the session ended while the command ran.
    async fn settle(&self, active: &ActiveSession, next: SessionState) -> SessionState {
        let mut guard = self.inner.lock().await;
        let same_session = guard
            .session
            .as_ref()
            .map(|session| session.id == active.id)
            .unwrap_or(false);
        if same_session {
            guard.state = next;
        }
        guard.state
    }
}

/// One-shot logger configuration: start (full reset) or stop.
pub struct LoggerTask {
    controller: SensorController,
    start: bool,
}

impl LoggerTask {
    pub fn new(controller: SensorController, start: bool) -> Self {
        Self { controller, start }
    }
}

#[async_trait]
impl Job for LoggerTask {
    async fn run(&self) -> Result<()> {
        let state = if self.start {
            self.controller.start_logging().await?
        } else {
            self.controller.stop_logging().await?
        };
        log_debug!("logger task finished in state {}", state.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connected_controller, test_controller, DeviceCall, DEVICE_ADDRESS};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn scan_filters_and_deduplicates() {
        let (_dir, controller, _link, _client) = test_controller();

        assert_eq!(controller.start_scan().await.unwrap(), SessionState::Scanning);
        assert!(controller
            .on_device_discovered(DiscoveredDevice::new("Movesense 174630000192", "aa"))
            .await);
        assert!(!controller
            .on_device_discovered(DiscoveredDevice::new("Movesense 174630000192", "aa"))
            .await);
        assert!(!controller
            .on_device_discovered(DiscoveredDevice::new("Polar H10", "bb"))
            .await);

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.discovered.len(), 1);

        assert_eq!(controller.stop_scan().await.unwrap(), SessionState::Disconnected);
        assert!(controller.snapshot().await.discovered.is_empty());
    }

    #[tokio::test]
    async fn discoveries_outside_a_scan_are_ignored() {
        let (_dir, controller, _link, _client) = test_controller();
        assert!(!controller
            .on_device_discovered(DiscoveredDevice::new("Movesense 1", "aa"))
            .await);
    }

    #[tokio::test]
    async fn connect_creates_session_and_persists_pairing() {
        let (_dir, controller, link, _client) = connected_controller().await;

        let session = controller.session().await.unwrap();
        assert_eq!(session.serial, "174630000192");
        assert_eq!(controller.state().await, SessionState::ConnectedIdle);
        assert_eq!(
            controller.restorable_device().map(|d| d.address),
            Some("0C:8C:DC:3F:B2:CD".to_string())
        );
        assert!(link.calls().contains(&"stop_discovery".to_string()));
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let (_dir, controller, link, _client) = test_controller();
        link.fail_connect();

        controller.start_scan().await.unwrap();
        controller
            .on_device_discovered(DiscoveredDevice::new("Movesense 1", "aa"))
            .await;
        assert_eq!(controller.connect("aa").await.unwrap(), SessionState::Disconnected);
        assert!(controller.session().await.is_none());
        assert!(controller.restorable_device().is_none());
    }

    #[tokio::test]
    async fn connect_requires_a_scan() {
        let (_dir, controller, _link, _client) = test_controller();
        assert!(controller.connect("aa").await.is_err());
    }

    #[tokio::test]
    async fn start_logging_runs_full_sequence() {
        let (_dir, controller, _link, client) = connected_controller().await;

        assert_eq!(
            controller.start_logging().await.unwrap(),
            SessionState::ConnectedLogging
        );

        let calls = client.calls();
        let methods: Vec<(&str, &str)> = calls
            .iter()
            .map(|c| (c.method, c.uri.as_str()))
            .collect();
        assert_eq!(
            methods,
            vec![
                ("delete", "suunto://174630000192/Mem/Logbook/Entries/"),
                ("put", "suunto://174630000192/Time"),
                ("put", "suunto://174630000192/Mem/DataLogger/Config/"),
                ("put", "suunto://174630000192/Mem/DataLogger/State"),
            ]
        );
        assert_eq!(calls[3].body.as_deref(), Some(r#"{"newState":3}"#));
    }

    #[tokio::test]
    async fn failed_config_push_stays_idle() {
        let (_dir, controller, _link, client) = connected_controller().await;
        client.fail_on("put", "DataLogger/Config");

        assert_eq!(
            controller.start_logging().await.unwrap(),
            SessionState::ConnectedIdle
        );
        assert!(!client
            .calls()
            .iter()
            .any(|c: &DeviceCall| c.uri.ends_with("DataLogger/State")));
    }

    #[tokio::test]
    async fn clock_failure_does_not_abort_start() {
        let (_dir, controller, _link, client) = connected_controller().await;
        client.fail_on("put", "/Time");

        assert_eq!(
            controller.start_logging().await.unwrap(),
            SessionState::ConnectedLogging
        );
    }

    #[tokio::test]
    async fn stop_logging_error_keeps_state() {
        let (_dir, controller, _link, client) = connected_controller().await;
        controller.start_logging().await.unwrap();

        client.fail_on("put", "DataLogger/State");
        assert_eq!(
            controller.stop_logging().await.unwrap(),
            SessionState::ConnectedLogging
        );
    }

    #[tokio::test]
    async fn logging_requires_connection() {
        let (_dir, controller, _link, _client) = test_controller();
        assert!(controller.start_logging().await.is_err());
        assert!(controller.stop_logging().await.is_err());
    }

    #[tokio::test]
    async fn device_drop_keeps_pairing_but_disconnect_forgets_it() {
        let (_dir, controller, _link, _client) = connected_controller().await;

        assert_eq!(
            controller.handle_disconnected("other").await,
            SessionState::ConnectedIdle
        );
        assert_eq!(
            controller.handle_disconnected("0C:8C:DC:3F:B2:CD").await,
            SessionState::Disconnected
        );
        assert!(controller.session().await.is_none());
        assert!(controller.restorable_device().is_some());

        controller.start_scan().await.unwrap();
        assert_eq!(
            controller.connect("0C:8C:DC:3F:B2:CD").await.unwrap(),
            SessionState::ConnectedIdle
        );
        assert_eq!(controller.disconnect().await.unwrap(), SessionState::Disconnected);
        assert!(controller.restorable_device().is_none());
    }

    #[tokio::test]
    async fn pending_command_does_not_block_readers_or_drop_handling() {
        let (_dir, controller, _link, client) = connected_controller().await;
        let _gate = client.hold_on("put", "DataLogger/Config");

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start_logging().await }
        });
        sleep(Duration::from_millis(20)).await;

        let limit = Duration::from_millis(500);
        assert_eq!(
            timeout(limit, controller.state()).await.unwrap(),
            SessionState::ConnectedIdle
        );
        assert!(timeout(limit, controller.snapshot()).await.is_ok());
        assert_eq!(
            timeout(limit, controller.handle_disconnected(DEVICE_ADDRESS))
                .await
                .unwrap(),
            SessionState::Disconnected
        );
        pending.abort();
    }

    #[tokio::test]
    async fn command_finishing_after_a_drop_keeps_disconnected() {
        let (_dir, controller, _link, client) = connected_controller().await;
        let gate = client.hold_on("put", "DataLogger/Config");

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start_logging().await }
        });
        sleep(Duration::from_millis(20)).await;

        controller.handle_disconnected(DEVICE_ADDRESS).await;
        gate.notify_one();

        assert_eq!(
            pending.await.unwrap().unwrap(),
            SessionState::Disconnected
        );
        assert_eq!(controller.state().await, SessionState::Disconnected);
        assert!(controller.session().await.is_none());
    }
}
