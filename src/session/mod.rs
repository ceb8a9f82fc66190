//! `DeviceSession`: the state machine owning one open device (§4.3).
//!
//! Each session is driven by one `tokio::spawn`-ed read-loop task and,
//! conditionally, a keepalive sub-task, cancelled cooperatively rather
//! than via `tokio_util::CancellationToken` — matching the dependency-
//! light style the rest of this core follows (§4.9 expansion).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::config::{DeviceConfiguration, InitStep};
use crate::device_id::DeviceId;
use crate::error::{Error, InitError, Result};
use crate::input_router::InputRouter;
use crate::manager::ManagerCommand;
use crate::output_mapper::OutputMapper;
use crate::protocol::{self, ProtocolFamily};
use crate::session_id::SessionId;
use crate::usb::{ControlRequest, PortHandle, TransferDirection, UsbPort};

const INTERRUPT_IN_TIMEOUT: Duration = Duration::from_secs(1);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);
const BULK_TIMEOUT: Duration = Duration::from_secs(5);
const CONSECUTIVE_ERROR_LIMIT: u32 = 5;
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const FALLBACK_ENDPOINT_IN: u8 = 0x81;
const FALLBACK_ENDPOINT_OUT: u8 = 0x01;

/// A vendor-agnostic default GIP keepalive packet, used only when no
/// `quirks.keepalive` parameter supplies one (§9 Open Question).
const DEFAULT_GIP_KEEPALIVE: [u8; 2] = [0x05, 0x20];

/// `Closed → Opening → Initializing → Running ↔ Paused → Closing → Closed`,
/// with `Error` reachable from any state (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Initializing,
    Running,
    Paused,
    Closing,
    Error(String),
}

impl SessionState {
    fn as_code(&self) -> u8 {
        match self {
            SessionState::Closed => 0,
            SessionState::Opening => 1,
            SessionState::Initializing => 2,
            SessionState::Running => 3,
            SessionState::Paused => 4,
            SessionState::Closing => 5,
            SessionState::Error(_) => 6,
        }
    }
}

/// Lock-free state flag for the hot path (read loop checks this every
/// iteration); the `Error` variant's message lives alongside in a small
/// async-mutex-guarded cell, set rarely.
struct StateCell {
    code: AtomicU8,
    message: AsyncMutex<Option<String>>,
}

impl StateCell {
    fn new(initial: SessionState) -> Self {
        Self {
            code: AtomicU8::new(initial.as_code()),
            message: AsyncMutex::new(None),
        }
    }

    fn set_sync(&self, state: SessionState) {
        self.code.store(state.as_code(), Ordering::SeqCst);
    }

    fn code(&self) -> u8 {
        self.code.load(Ordering::SeqCst)
    }
}

/// One open device: its USB handle, its configuration, and the two
/// long-running tasks (read loop, keepalive loop) that drive it (§4.3,
/// §5).
pub struct DeviceSession {
    session_id: SessionId,
    device_id: DeviceId,
    port: Arc<dyn UsbPort>,
    config: DeviceConfiguration,
    router: Arc<InputRouter>,
    mapper: Arc<std::sync::Mutex<OutputMapper>>,
    manager_tx: mpsc::Sender<ManagerCommand>,
    state: StateCell,
    stopping: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: AsyncMutex<Option<PortHandle>>,
    endpoints: AsyncMutex<(u8, u8)>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl DeviceSession {
    pub fn new(
        session_id: SessionId,
        device_id: DeviceId,
        port: Arc<dyn UsbPort>,
        config: DeviceConfiguration,
        router: Arc<InputRouter>,
        mapper: Arc<std::sync::Mutex<OutputMapper>>,
        manager_tx: mpsc::Sender<ManagerCommand>,
    ) -> Self {
        Self {
            session_id,
            device_id,
            port,
            config,
            router,
            mapper,
            manager_tx,
            state: StateCell::new(SessionState::Closed),
            stopping: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            handle: AsyncMutex::new(None),
            endpoints: AsyncMutex::new((FALLBACK_ENDPOINT_IN, FALLBACK_ENDPOINT_OUT)),
            tasks: AsyncMutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn state(&self) -> SessionState {
        match self.state.code() {
            0 => SessionState::Closed,
            1 => SessionState::Opening,
            2 => SessionState::Initializing,
            3 => SessionState::Running,
            4 => SessionState::Paused,
            5 => SessionState::Closing,
            _ => SessionState::Error(
                self.state
                    .message
                    .lock()
                    .await
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
        }
    }

    async fn enter_error(&self, message: String) {
        error!("session {} entered Error: {message}", self.session_id);
        *self.state.message.lock().await = Some(message.clone());
        self.state.set_sync(SessionState::Error(message));
    }

    /// Open the device, run its initialization sequence, and spawn the
    /// read/keepalive tasks. Returns once the session is `Running` (or
    /// `Error` on failure).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.state.set_sync(SessionState::Opening);
        if let Err(err) = self.open_and_initialize().await {
            self.enter_error(err.to_string()).await;
            return Err(err);
        }
        self.state.set_sync(SessionState::Running);
        self.spawn_tasks();
        Ok(())
    }

    async fn open_and_initialize(self: &Arc<Self>) -> Result<()> {
        let handle = self.port.open(self.device_id.vendor_id, self.device_id.product_id)?;
        *self.handle.lock().await = Some(handle);

        if let Err(err) = self.port.set_configuration(handle, 1) {
            warn!("set_configuration best-effort failed for {}: {err}", self.session_id);
        }
        if let Err(err) = self.port.auto_detach_kernel_driver(handle, true) {
            warn!("auto_detach_kernel_driver best-effort failed for {}: {err}", self.session_id);
        }

        self.state.set_sync(SessionState::Initializing);

        if self.port.kernel_driver_active(handle, 0).unwrap_or(false) {
            self.port
                .detach_kernel_driver(handle, 0)
                .map_err(|_| Error::Init(InitError::KernelDetachFailed))?;
        }

        self.port
            .claim_interface(handle, 0)
            .map_err(|_| Error::Init(InitError::InterfaceClaimFailed))?;

        self.discover_endpoints(handle).await;

        for (index, step) in self.config.initialization.iter().enumerate() {
            self.run_init_step(handle, step)
                .await
                .map_err(|_| Error::Init(InitError::InitStepFailed { index }))?;
        }

        self.apply_init_quirks(handle).await;

        debug!("session {} initialized ({} init steps)", self.session_id, self.config.initialization.len());
        Ok(())
    }

    async fn discover_endpoints(&self, handle: PortHandle) {
        let mut endpoints = (FALLBACK_ENDPOINT_IN, FALLBACK_ENDPOINT_OUT);
        if let Some(explicit) = &self.config.endpoints {
            if let Some(in_ep) = explicit.input {
                endpoints.0 = in_ep;
            }
            if let Some(out_ep) = explicit.output {
                endpoints.1 = out_ep;
            }
        } else if let Ok(descriptor) = self.port.active_config_descriptor(handle) {
            if let Some(in_ep) = descriptor.first_endpoint(TransferDirection::In) {
                endpoints.0 = in_ep;
            }
            let out_ep = if self.config.protocol_family == ProtocolFamily::Gip {
                descriptor.gip_out_endpoint()
            } else {
                descriptor.first_endpoint(TransferDirection::Out)
            };
            if let Some(out_ep) = out_ep {
                endpoints.1 = out_ep;
            }
        }
        *self.endpoints.lock().await = endpoints;
    }

    async fn run_init_step(&self, handle: PortHandle, step: &InitStep) -> std::result::Result<(), ()> {
        match step {
            InitStep::Control {
                request_type,
                request,
                value,
                index,
                data_bytes,
                timeout_ms,
            } => {
                let mut data = data_bytes.clone();
                let request = ControlRequest {
                    request_type: *request_type,
                    request: *request,
                    value: *value,
                    index: *index,
                };
                self.port
                    .control_transfer(handle, request, &mut data, Duration::from_millis(*timeout_ms as u64))
                    .map(|_| ())
                    .map_err(|_| ())
            }
            InitStep::Interrupt { endpoint, data_bytes, timeout_ms } => {
                let mut data = data_bytes.clone();
                self.port
                    .interrupt_transfer(handle, *endpoint, &mut data, Duration::from_millis(*timeout_ms as u64))
                    .map(|_| ())
                    .map_err(|_| ())
            }
            InitStep::Bulk { endpoint, data_bytes, timeout_ms } => {
                let mut data = data_bytes.clone();
                self.port
                    .bulk_transfer(handle, *endpoint, &mut data, Duration::from_millis(*timeout_ms as u64))
                    .map(|_| ())
                    .map_err(|_| ())
            }
            InitStep::Gip { data_bytes, timeout_ms } => {
                let (_, out_ep) = *self.endpoints.lock().await;
                let mut data = data_bytes.clone();
                self.port
                    .interrupt_transfer(handle, out_ep, &mut data, Duration::from_millis(*timeout_ms as u64))
                    .map(|_| ())
                    .map_err(|_| ())
            }
            InitStep::Delay { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms as u64)).await;
                Ok(())
            }
        }
    }

    async fn apply_init_quirks(&self, handle: PortHandle) {
        let quirks = &self.config.quirks;
        if let Some(pattern) = &quirks.vendor_specific_led {
            let (_, out_ep) = *self.endpoints.lock().await;
            let mut data = pattern.clone();
            if let Err(err) = self.port.interrupt_transfer(handle, out_ep, &mut data, Duration::from_millis(500)) {
                warn!("vendor_specific_led quirk failed for {}: {err}", self.session_id);
            }
        }
        if let Some(ms) = quirks.delay_after_init_ms {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }
    }

    fn wants_keepalive(&self) -> bool {
        if self.config.quirks.keepalive.is_some() {
            return true;
        }
        if self.config.quirks.keepalive_explicitly_disabled {
            return false;
        }
        self.config.protocol_family == ProtocolFamily::Gip
    }

    fn keepalive_packet(&self) -> Vec<u8> {
        self.config
            .quirks
            .keepalive
            .clone()
            .unwrap_or_else(|| DEFAULT_GIP_KEEPALIVE.to_vec())
    }

    fn spawn_tasks(self: &Arc<Self>) {
        let read_task = {
            let session = Arc::clone(self);
            tokio::spawn(async move { session.read_loop().await })
        };
        let mut handles = vec![read_task];
        if self.wants_keepalive() {
            let session = Arc::clone(self);
            handles.push(tokio::spawn(async move { session.keepalive_loop().await }));
        }
        if let Ok(mut guard) = self.tasks.try_lock() {
            *guard = handles;
        }
    }

    async fn read_loop(self: Arc<Self>) {
        let mut consecutive_errors: u32 = 0;
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if self.state.code() == SessionState::Paused.as_code() {
                tokio::time::sleep(READ_RETRY_DELAY).await;
                continue;
            }

            let Some(handle) = *self.handle.lock().await else {
                break;
            };
            let (in_ep, _) = *self.endpoints.lock().await;
            let report_size = self.config.report_size;
            let port = Arc::clone(&self.port);

            let result = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; report_size];
                let n = port.interrupt_transfer(handle, in_ep, &mut buf, INTERRUPT_IN_TIMEOUT);
                n.map(|n| (buf, n))
            })
            .await;

            match result {
                Ok(Ok((buf, n))) => {
                    consecutive_errors = 0;
                    if n == 0 {
                        continue;
                    }
                    let events = self.router.process(&self.session_id, &buf[..n]);
                    if !events.is_empty() {
                        let mut mapper = self.mapper.lock().expect("output mapper mutex poisoned");
                        mapper.process_events(&self.session_id, &events);
                    }
                }
                Ok(Err(transfer_err)) => {
                    consecutive_errors += 1;
                    warn!("{} read error ({consecutive_errors}/{CONSECUTIVE_ERROR_LIMIT}): {transfer_err}", self.session_id);
                    if consecutive_errors >= CONSECUTIVE_ERROR_LIMIT {
                        error!("{} exceeded consecutive read error limit, disconnecting", self.session_id);
                        break;
                    }
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
                Err(join_err) => {
                    error!("{} read task panicked: {join_err}", self.session_id);
                    break;
                }
            }
        }
        self.close().await;
    }

    async fn keepalive_loop(self: Arc<Self>) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if self.state.code() == SessionState::Running.as_code() {
                let Some(handle) = *self.handle.lock().await else {
                    break;
                };
                let (_, out_ep) = *self.endpoints.lock().await;
                let mut packet = self.keepalive_packet();
                if let Err(err) = self.port.interrupt_transfer(handle, out_ep, &mut packet, BULK_TIMEOUT) {
                    warn!("keepalive send failed for {}: {err}", self.session_id);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {}
                _ = self.notify.notified() => {}
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    /// `Running → Paused` on a system-sleep signal (§4.3). The read loop
    /// stops requesting transfers without tearing the session down.
    pub async fn pause(&self) {
        if self.state.code() == SessionState::Running.as_code() {
            self.state.set_sync(SessionState::Paused);
        }
    }

    /// `Paused → Running` on system-wake; if the device vanished while
    /// paused, transitions to `Error` instead (§4.3).
    pub async fn resume(&self) {
        if self.state.code() != SessionState::Paused.as_code() {
            return;
        }
        let Some(handle) = *self.handle.lock().await else {
            self.enter_error("no open handle to resume".to_string()).await;
            return;
        };
        if self.port.active_config_descriptor(handle).is_err() {
            self.enter_error("device unreachable on resume".to_string()).await;
            return;
        }
        self.state.set_sync(SessionState::Running);
    }

    /// Cancel the read/keepalive tasks, release the interface, and close
    /// the handle. Always invokes `release_all` on the mapper first so no
    /// `key_up` obligation is lost (§5 cancellation semantics).
    pub async fn close(&self) {
        if self.state.code() == SessionState::Closed.as_code() {
            return;
        }
        self.state.set_sync(SessionState::Closing);
        self.stopping.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();

        {
            let mut mapper = self.mapper.lock().expect("output mapper mutex poisoned");
            mapper.release_all(&self.session_id);
        }
        self.router.unregister(&self.session_id);

        if let Some(handle) = *self.handle.lock().await {
            if matches!(self.config.protocol_family, ProtocolFamily::Gip | ProtocolFamily::XInput) {
                let (_, out_ep) = *self.endpoints.lock().await;
                let mut led_off = vec![0u8; 3];
                let _ = self.port.interrupt_transfer(handle, out_ep, &mut led_off, Duration::from_millis(200));
            }
            let _ = self.port.release_interface(handle, 0);
            self.port.close(handle);
        }
        *self.handle.lock().await = None;

        self.state.set_sync(SessionState::Closed);
        let _ = self
            .manager_tx
            .send(ManagerCommand::SessionClosed { device_id: self.device_id })
            .await;
    }

    /// Await the read/keepalive task handles (used by `DeviceManager`
    /// during an orderly shutdown).
    pub async fn join(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Build the protocol parser configured for a session, honoring an
/// explicit `reportDescriptor` for the generic-HID family.
pub fn parser_for_config(config: &DeviceConfiguration) -> Box<dyn protocol::ProtocolParser> {
    if config.protocol_family == ProtocolFamily::GenericHid {
        if let Some(descriptor) = &config.report_descriptor {
            return Box::new(protocol::GenericHidParser::from_descriptor(descriptor));
        }
    }
    protocol::parser_for_family(config.protocol_family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfiguration, Quirks};
    use crate::error::UsbError;
    use crate::output_mapper::RecordingEventSink;
    use crate::profile::Profile;
    use crate::protocol::Deadzones;
    use crate::usb::mock::MockUsbPort;

    fn test_config() -> DeviceConfiguration {
        DeviceConfiguration {
            device_id: DeviceId::new(0x045e, 0x02ea),
            name: "Test Controller".to_string(),
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

    fn test_session(port: Arc<MockUsbPort>) -> (Arc<DeviceSession>, mpsc::Receiver<ManagerCommand>) {
        let (tx, rx) = mpsc::channel(8);
        let router = Arc::new(InputRouter::new());
        let sink = Arc::new(RecordingEventSink::new());
        let mapper = Arc::new(std::sync::Mutex::new(OutputMapper::new(sink, Profile::default())));
        let config = test_config();
        let session_id = SessionId::new("045e:02ea:test");
        router.register(session_id.clone(), parser_for_config(&config), config.deadzones);
        let session = Arc::new(DeviceSession::new(
            session_id,
            config.device_id,
            port,
            config,
            router,
            mapper,
            tx,
        ));
        (session, rx)
    }

    #[tokio::test]
    async fn start_transitions_to_running_and_closes_cleanly() {
        let port = Arc::new(MockUsbPort::new());
        let (session, mut rx) = test_session(port.clone());

        session.start().await.unwrap();
        assert_eq!(session.state().await, SessionState::Running);

        session.close().await;
        assert_eq!(session.state().await, SessionState::Closed);
        assert_eq!(port.closed_handles().len(), 1);
        assert_eq!(rx.recv().await, Some(ManagerCommand::SessionClosed { device_id: session.device_id }));
    }

    #[tokio::test]
    async fn gip_session_prefers_interface_zero_out_endpoint() {
        use crate::usb::{ConfigDescriptor, EndpointDescriptor, InterfaceDescriptor, TransferType};

        let descriptor = ConfigDescriptor {
            interfaces: vec![
                InterfaceDescriptor {
                    number: 0,
                    endpoints: vec![EndpointDescriptor {
                        address: 0x02,
                        transfer_type: TransferType::Interrupt,
                        direction: TransferDirection::Out,
                    }],
                },
                InterfaceDescriptor {
                    number: 1,
                    endpoints: vec![EndpointDescriptor {
                        address: 0x01,
                        transfer_type: TransferType::Interrupt,
                        direction: TransferDirection::Out,
                    }],
                },
            ],
        };
        let port = Arc::new(MockUsbPort::new().with_config_descriptor(descriptor));
        let (session, _rx) = test_session(port);

        session.start().await.unwrap();
        let (_, out_ep) = *session.endpoints.lock().await;
        assert_eq!(out_ep, 0x02);
    }

    #[tokio::test]
    async fn claim_interface_failure_enters_error_state() {
        let port = Arc::new(MockUsbPort::new().fail_claim_with(UsbError::Busy));
        let (session, _rx) = test_session(port);

        let result = session.start().await;
        assert!(result.is_err());
        assert!(matches!(session.state().await, SessionState::Error(_)));
    }

    #[tokio::test]
    async fn consecutive_timeouts_disconnect_after_five() {
        let port = Arc::new(MockUsbPort::new());
        for _ in 0..5 {
            port.queue_error(UsbError::Timeout);
        }
        let (session, mut rx) = test_session(port.clone());

        session.start().await.unwrap();
        session.join().await;

        assert_eq!(session.state().await, SessionState::Closed);
        assert_eq!(rx.recv().await, Some(ManagerCommand::SessionClosed { device_id: session.device_id }));
    }

    /// A zero-byte interrupt-IN read is not an error tick (§8 boundary
    /// case): ten empty reads ahead of the five timeouts must not bring
    /// the session any closer to its consecutive-error limit.
    #[tokio::test]
    async fn zero_byte_reads_do_not_advance_the_error_counter() {
        let port = Arc::new(MockUsbPort::new());
        for _ in 0..10 {
            port.queue_report(Vec::new());
        }
        for _ in 0..5 {
            port.queue_error(UsbError::Timeout);
        }
        let (session, mut rx) = test_session(port.clone());

        session.start().await.unwrap();
        session.join().await;

        assert_eq!(session.state().await, SessionState::Closed);
        assert_eq!(rx.recv().await, Some(ManagerCommand::SessionClosed { device_id: session.device_id }));
    }
}
