//! `DeviceManager`: discovery scan loop, session lifecycle, disconnect
//! propagation (§4, §5, §4.9 expansion).
//!
//! An actor over a command channel: discover a device, spawn a managed
//! session for it, and listen for that session's lifecycle messages
//! (closed, needs retry) on the same channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::ConfigStore;
use crate::device_id::DeviceId;
use crate::input_router::InputRouter;
use crate::output_mapper::{EventSink, OutputMapper};
use crate::profile::Profile;
use crate::session::{parser_for_config, DeviceSession};
use crate::session_id::SessionId;
use crate::usb::UsbPort;

/// Default interval between discovery scans (§5).
const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Messages flowing back to the manager task. Sessions hold only a
/// `Sender<ManagerCommand>`, never a live pointer back to their manager
/// (§9 design notes: "back-references from sessions to their manager
/// are weak/indirect").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerCommand {
    Discovered { device_id: DeviceId },
    SessionClosed { device_id: DeviceId },
    Shutdown,
}

/// Discovers matched devices, owns their sessions, and fans disconnects
/// back into bookkeeping so the next scan can retry.
///
/// One caveat inherited from `UsbPort::list`'s shape (§4.2): it reports
/// only `(vendor_id, product_id)`, not a serial number or bus path, so
/// this manager tracks at most one live session per [`DeviceId`]. Two
/// simultaneously connected controllers of the same model are outside
/// what discovery alone can disambiguate (see DESIGN.md).
pub struct DeviceManager {
    port: Arc<dyn UsbPort>,
    config_store: Arc<ConfigStore>,
    router: Arc<InputRouter>,
    mapper: Arc<std::sync::Mutex<OutputMapper>>,
    scan_interval: Duration,
    tx: mpsc::Sender<ManagerCommand>,
    rx: AsyncMutex<mpsc::Receiver<ManagerCommand>>,
    sessions: AsyncMutex<HashMap<DeviceId, Arc<DeviceSession>>>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl DeviceManager {
    pub fn new(
        port: Arc<dyn UsbPort>,
        config_store: Arc<ConfigStore>,
        sink: Arc<dyn EventSink>,
        profile: Profile,
    ) -> Arc<Self> {
        Self::with_scan_interval(port, config_store, sink, profile, DEFAULT_SCAN_INTERVAL)
    }

    pub fn with_scan_interval(
        port: Arc<dyn UsbPort>,
        config_store: Arc<ConfigStore>,
        sink: Arc<dyn EventSink>,
        profile: Profile,
        scan_interval: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(128);
        Arc::new(Self {
            port,
            config_store,
            router: Arc::new(InputRouter::new()),
            mapper: Arc::new(std::sync::Mutex::new(OutputMapper::new(sink, profile))),
            scan_interval,
            tx,
            rx: AsyncMutex::new(rx),
            sessions: AsyncMutex::new(HashMap::new()),
            tasks: AsyncMutex::new(Vec::new()),
        })
    }

    /// Swap the active profile used by every managed session's output
    /// mapper (e.g. on a user-driven profile switch).
    pub fn set_profile(&self, profile: Profile) {
        self.mapper
            .lock()
            .expect("output mapper mutex poisoned")
            .set_profile(profile);
    }

    pub fn active_profile_name(&self) -> String {
        self.mapper
            .lock()
            .expect("output mapper mutex poisoned")
            .profile()
            .name
            .clone()
    }

    /// Number of currently managed sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Start the scan loop and the command-processing loop. Returns once
    /// both are spawned; call [`DeviceManager::shutdown`] to stop them.
    pub async fn run(self: &Arc<Self>) {
        info!(
            "device manager starting (scan interval {:?}, {} configurations loaded)",
            self.scan_interval,
            self.config_store.len()
        );
        let scan_task = {
            let manager = Arc::clone(self);
            tokio::spawn(async move { manager.scan_loop().await })
        };
        let command_task = {
            let manager = Arc::clone(self);
            tokio::spawn(async move { manager.command_loop().await })
        };
        self.tasks.lock().await.extend([scan_task, command_task]);
    }

    async fn scan_loop(self: Arc<Self>) {
        loop {
            self.scan_once().await;
            tokio::time::sleep(self.scan_interval).await;
            // `command_loop` owns the receiver and tears down the manager on
            // `Shutdown`; this loop simply stops once the sender is dropped.
            if self.tx.is_closed() {
                break;
            }
        }
    }

    /// One discovery pass: list devices, match each against `ConfigStore`,
    /// and spawn a session for anything newly matched and not already
    /// managed.
    async fn scan_once(self: &Arc<Self>) {
        let devices = self.port.list();
        debug!("scan tick: {} device(s) enumerated", devices.len());
        let mut newly_discovered = Vec::new();
        {
            let mut sessions = self.sessions.lock().await;
            for device in devices {
                let device_id = DeviceId::new(device.vendor_id, device.product_id);
                if sessions.contains_key(&device_id) {
                    continue;
                }
                let Some(config) = self.config_store.best(device.vendor_id, device.product_id).cloned() else {
                    let err = crate::error::Error::Config(crate::error::ConfigError::UnsupportedDevice(device_id));
                    debug!("{}", err.user_message());
                    continue;
                };
                info!("matched new device {device_id} to configuration \"{}\"", config.name);
                let session_id = SessionId::new(format!("{device_id}"));
                self.router.register(session_id.clone(), parser_for_config(&config), config.deadzones);

                let session = Arc::new(DeviceSession::new(
                    session_id,
                    device_id,
                    Arc::clone(&self.port),
                    config,
                    Arc::clone(&self.router),
                    Arc::clone(&self.mapper),
                    self.tx.clone(),
                ));
                let spawned = Arc::clone(&session);
                tokio::spawn(async move {
                    if let Err(err) = spawned.start().await {
                        warn!("session for {device_id} failed to start: {err}");
                    }
                });
                sessions.insert(device_id, session);
                newly_discovered.push(device_id);
            }
        }
        // Sent after releasing the sessions lock: `command_loop` takes the
        // same lock to handle `SessionClosed`, so holding it across a
        // channel send (which can block on a full channel) would risk
        // the two loops deadlocking on each other.
        for device_id in newly_discovered {
            let _ = self.tx.send(ManagerCommand::Discovered { device_id }).await;
        }
    }

    async fn command_loop(self: Arc<Self>) {
        let mut rx = self.rx.lock().await;
        while let Some(command) = rx.recv().await {
            match command {
                ManagerCommand::Discovered { device_id } => {
                    debug!("manager notified of discovery for {device_id}");
                }
                ManagerCommand::SessionClosed { device_id } => {
                    info!("session closed for {device_id}, eligible for retry on next scan");
                    self.sessions.lock().await.remove(&device_id);
                }
                ManagerCommand::Shutdown => break,
            }
        }
    }

    /// Orderly shutdown: close every managed session (releasing
    /// interfaces and balancing held keys via `release_all`), then stop
    /// the scan/command loops.
    pub async fn shutdown(self: &Arc<Self>) {
        info!("device manager shutting down ({} active session(s))", self.session_count().await);
        let sessions: Vec<Arc<DeviceSession>> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.close().await;
        }
        for session in &sessions {
            session.join().await;
        }
        self.mapper
            .lock()
            .expect("output mapper mutex poisoned")
            .release_all_global();

        let _ = self.tx.send(ManagerCommand::Shutdown).await;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfiguration, Quirks};
    use crate::output_mapper::RecordingEventSink;
    use crate::protocol::{Deadzones, ProtocolFamily};
    use crate::usb::mock::MockUsbPort;
    use crate::usb::UsbDeviceRef;

    fn xbox_config() -> DeviceConfiguration {
        DeviceConfiguration {
            device_id: DeviceId::new(0x045e, 0x02ea),
            name: "Xbox Series Controller".to_string(),
            protocol_family: ProtocolFamily::Gip,
            endpoints: None,
            report_size: 19,
            initialization: Vec::new(),
            deadzones: Deadzones::default(),
            quirks: Quirks::default(),
            priority: 0,
            report_descriptor: None,
        }
    }

    #[tokio::test]
    async fn scan_spawns_a_session_for_a_matched_device() {
        let port = Arc::new(
            MockUsbPort::new().with_device(UsbDeviceRef {
                vendor_id: 0x045e,
                product_id: 0x02ea,
            }),
        );
        let config_store = Arc::new(ConfigStore::new(vec![xbox_config()]));
        let sink = Arc::new(RecordingEventSink::new());
        let manager = DeviceManager::new(port, config_store, sink, Profile::default());

        manager.scan_once().await;
        assert_eq!(manager.session_count().await, 1);

        // A second scan with the same device already managed is a no-op.
        manager.scan_once().await;
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn scan_emits_discovered_for_a_newly_matched_device() {
        let port = Arc::new(
            MockUsbPort::new().with_device(UsbDeviceRef {
                vendor_id: 0x045e,
                product_id: 0x02ea,
            }),
        );
        let config_store = Arc::new(ConfigStore::new(vec![xbox_config()]));
        let sink = Arc::new(RecordingEventSink::new());
        let manager = DeviceManager::new(port, config_store, sink, Profile::default());

        manager.scan_once().await;

        let mut rx = manager.rx.lock().await;
        assert_eq!(
            rx.recv().await,
            Some(ManagerCommand::Discovered {
                device_id: DeviceId::new(0x045e, 0x02ea)
            })
        );
    }

    #[tokio::test]
    async fn unmatched_device_is_not_sessioned() {
        let port = Arc::new(
            MockUsbPort::new().with_device(UsbDeviceRef {
                vendor_id: 0xdead,
                product_id: 0xbeef,
            }),
        );
        let config_store = Arc::new(ConfigStore::new(vec![xbox_config()]));
        let sink = Arc::new(RecordingEventSink::new());
        let manager = DeviceManager::new(port, config_store, sink, Profile::default());

        manager.scan_once().await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_closes_every_session_and_releases_held_keys() {
        let port = Arc::new(
            MockUsbPort::new().with_device(UsbDeviceRef {
                vendor_id: 0x045e,
                product_id: 0x02ea,
            }),
        );
        let config_store = Arc::new(ConfigStore::new(vec![xbox_config()]));
        let sink = Arc::new(RecordingEventSink::new());
        let manager = DeviceManager::new(port, config_store, sink, Profile::default());
        manager.run().await;

        manager.scan_once().await;
        // Give the spawned session task a moment to reach `Running`.
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.shutdown().await;
        assert_eq!(manager.session_count().await, 0);
    }
}
