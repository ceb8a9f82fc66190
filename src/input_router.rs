//! Owns per-device [`MirrorState`] and routes raw reports through the
//! matching [`ProtocolParser`] into dirty-edge [`InputEvent`]s (§4.5).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::event::{InputEvent, Timestamp};
use crate::mirror_state::MirrorState;
use crate::protocol::{Deadzones, ProtocolParser};
use crate::session_id::SessionId;

struct DeviceRuntime {
    parser: Box<dyn ProtocolParser>,
    mirror: MirrorState,
    deadzones: Deadzones,
}

/// Process-wide registry of per-device parser/mirror state. Safe to
/// share across session tasks: each session only ever touches the entry
/// keyed by its own `SessionId`, so there is no real cross-task
/// contention even though the map itself is guarded by a `Mutex`
/// (§5: "mirrors... owned by exactly one task").
pub struct InputRouter {
    devices: Mutex<HashMap<SessionId, DeviceRuntime>>,
    start: Instant,
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            start: Instant::now(),
        }
    }

    pub fn register(&self, session_id: SessionId, parser: Box<dyn ProtocolParser>, deadzones: Deadzones) {
        let mut devices = self.devices.lock().expect("input router mutex poisoned");
        devices.insert(
            session_id,
            DeviceRuntime {
                parser,
                mirror: MirrorState::new(),
                deadzones,
            },
        );
    }

    pub fn unregister(&self, session_id: &SessionId) {
        self.devices
            .lock()
            .expect("input router mutex poisoned")
            .remove(session_id);
    }

    fn now_ts(&self) -> Timestamp {
        self.start.elapsed().as_micros() as Timestamp
    }

    /// Decode `bytes` for `session_id` and return the resulting
    /// dirty-edge events, in dirty-class order (buttons, axes, triggers,
    /// dpads, hats), ready to route to the `OutputMapper`.
    pub fn process(&self, session_id: &SessionId, bytes: &[u8]) -> Vec<InputEvent> {
        let ts = self.now_ts();
        let mut devices = self.devices.lock().expect("input router mutex poisoned");
        let Some(runtime) = devices.get_mut(session_id) else {
            return Vec::new();
        };
        runtime.parser.parse(bytes, &mut runtime.mirror, &runtime.deadzones, ts);
        runtime.mirror.emit_dirty()
    }
}
