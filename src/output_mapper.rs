//! Applies the active [`Profile`] to normalized [`InputEvent`]s and
//! drives the host [`EventSink`], tracking which keys are currently
//! held so releases are always balanced (§4.6, §3 `active_inputs`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::event::{Axis, DPadDir, InputEvent, Trigger};
use crate::profile::{ButtonMapping, KeyModifier, PointerAxis, Profile};
use crate::session_id::SessionId;

/// A host-level mouse button, used only by [`EventSink::mouse_click`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Host input synthesis boundary (§1). This core ships no OS-level
/// implementation; [`RecordingEventSink`] is the in-process reference
/// used by tests and demos.
pub trait EventSink: Send + Sync {
    fn key_down(&self, code: u16, modifier: KeyModifier) -> Result<()>;
    fn key_up(&self, code: u16, modifier: KeyModifier) -> Result<()>;
    fn mouse_move(&self, dx: f32, dy: f32) -> Result<()>;
    fn mouse_click(&self, button: MouseButton) -> Result<()>;
    fn mouse_scroll(&self, dx: f32, dy: f32) -> Result<()>;
}

/// One recorded call to a [`RecordingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    KeyDown(u16, KeyModifier),
    KeyUp(u16, KeyModifier),
    MouseMove(f32, f32),
    MouseClick(MouseButton),
    MouseScroll(f32, f32),
}

/// In-process reference `EventSink`: records every call rather than
/// touching the host OS. Used by this crate's own tests and by the
/// `demos/` CLI; not a real host integration (§6 expansion note).
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    calls: std::sync::Mutex<Vec<SinkCall>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("recording sink mutex poisoned").clone()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().expect("recording sink mutex poisoned").push(call);
    }
}

impl EventSink for RecordingEventSink {
    fn key_down(&self, code: u16, modifier: KeyModifier) -> Result<()> {
        self.record(SinkCall::KeyDown(code, modifier));
        Ok(())
    }

    fn key_up(&self, code: u16, modifier: KeyModifier) -> Result<()> {
        self.record(SinkCall::KeyUp(code, modifier));
        Ok(())
    }

    fn mouse_move(&self, dx: f32, dy: f32) -> Result<()> {
        self.record(SinkCall::MouseMove(dx, dy));
        Ok(())
    }

    fn mouse_click(&self, button: MouseButton) -> Result<()> {
        self.record(SinkCall::MouseClick(button));
        Ok(())
    }

    fn mouse_scroll(&self, dx: f32, dy: f32) -> Result<()> {
        self.record(SinkCall::MouseScroll(dx, dy));
        Ok(())
    }
}

pub struct OutputMapper {
    sink: Arc<dyn EventSink>,
    profile: Profile,
    /// Split, trimmed chord components per `button_mappings` index.
    mapping_components: Vec<Vec<String>>,
    /// component identifier -> indices of mappings that include it.
    chord_index: HashMap<String, Vec<usize>>,
    active_inputs: HashMap<(SessionId, String), bool>,
    pressed: HashMap<SessionId, HashSet<String>>,
    trigger_pressed: HashMap<(SessionId, Trigger), bool>,
    dpad_prev: HashMap<(SessionId, u8), (DPadDir, DPadDir)>,
    warned_sink_error: HashSet<SessionId>,
}

fn split_components(identifier: &str) -> Vec<String> {
    identifier
        .split('+')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl OutputMapper {
    pub fn new(sink: Arc<dyn EventSink>, profile: Profile) -> Self {
        let mut mapper = Self {
            sink,
            profile: Profile::default(),
            mapping_components: Vec::new(),
            chord_index: HashMap::new(),
            active_inputs: HashMap::new(),
            pressed: HashMap::new(),
            trigger_pressed: HashMap::new(),
            dpad_prev: HashMap::new(),
            warned_sink_error: HashSet::new(),
        };
        mapper.set_profile(profile);
        mapper
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: Profile) {
        let mut mapping_components = Vec::with_capacity(profile.button_mappings.len());
        let mut chord_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, mapping) in profile.button_mappings.iter().enumerate() {
            let components = split_components(&mapping.button_identifier);
            for component in &components {
                chord_index.entry(component.clone()).or_default().push(idx);
            }
            mapping_components.push(components);
        }
        self.profile = profile;
        self.mapping_components = mapping_components;
        self.chord_index = chord_index;
    }

    /// Apply one batch of events (everything decoded from a single
    /// report) for `session_id`, in the order they were emitted.
    pub fn process_events(&mut self, session_id: &SessionId, events: &[InputEvent]) {
        for event in events {
            match *event {
                InputEvent::ButtonPress { button, .. } => {
                    self.on_component_pressed(session_id, button.identifier());
                }
                InputEvent::ButtonRelease { button, .. } => {
                    self.on_component_released(session_id, button.identifier());
                }
                InputEvent::AxisMove { axis, value, .. } => {
                    self.on_axis_move(session_id, axis, value);
                }
                InputEvent::TriggerMove { trigger, is_pressed, .. } => {
                    self.on_trigger_move(session_id, trigger, is_pressed);
                }
                InputEvent::DPadMove {
                    dpad_id,
                    horizontal,
                    vertical,
                    ..
                } => {
                    self.on_dpad_move(session_id, dpad_id, horizontal, vertical);
                }
                // HatSwitch has no button-mapping semantics in this core; it is
                // surfaced for UI/diagnostics only (see DESIGN.md Open Question).
                InputEvent::HatSwitch { .. } => {}
            }
        }
    }

    fn on_component_pressed(&mut self, session_id: &SessionId, name: &str) {
        let pressed = self.pressed.entry(session_id.clone()).or_default();
        pressed.insert(name.to_string());

        let Some(indices) = self.chord_index.get(name).cloned() else {
            return;
        };
        for idx in indices {
            let components = &self.mapping_components[idx];
            let pressed = self.pressed.get(session_id).expect("just inserted above");
            let complete = components.iter().all(|c| pressed.contains(c));
            if !complete {
                continue;
            }
            let mapping = self.profile.button_mappings[idx].clone();
            let key = (session_id.clone(), mapping.button_identifier.clone());
            if self.active_inputs.get(&key).copied().unwrap_or(false) {
                continue;
            }
            self.active_inputs.insert(key, true);
            self.call_sink(session_id, |sink| sink.key_down(mapping.key_code, mapping.modifier));
        }
    }

    fn on_component_released(&mut self, session_id: &SessionId, name: &str) {
        if let Some(pressed) = self.pressed.get_mut(session_id) {
            pressed.remove(name);
        }

        let Some(indices) = self.chord_index.get(name).cloned() else {
            return;
        };
        for idx in indices {
            let mapping = self.profile.button_mappings[idx].clone();
            let key = (session_id.clone(), mapping.button_identifier.clone());
            if !self.active_inputs.get(&key).copied().unwrap_or(false) {
                continue;
            }
            self.active_inputs.insert(key, false);
            self.call_sink(session_id, |sink| sink.key_up(mapping.key_code, mapping.modifier));
        }
    }

    fn on_axis_move(&mut self, session_id: &SessionId, axis: Axis, value: f32) {
        let Some(mapping) = self
            .profile
            .axis_mappings
            .iter()
            .find(|m| m.axis == axis.identifier())
            .cloned()
        else {
            return;
        };
        if value.abs() <= mapping.mouse_deadzone {
            return;
        }
        let delta = value * mapping.sensitivity * 10.0;
        let (dx, dy) = match mapping.pointer_axis {
            PointerAxis::X => (delta, 0.0),
            PointerAxis::Y => (0.0, delta),
        };
        self.call_sink(session_id, |sink| sink.mouse_move(dx, dy));
    }

    fn on_trigger_move(&mut self, session_id: &SessionId, trigger: Trigger, is_pressed: bool) {
        let key = (session_id.clone(), trigger);
        let was_pressed = self.trigger_pressed.get(&key).copied().unwrap_or(false);
        if was_pressed == is_pressed {
            return;
        }
        self.trigger_pressed.insert(key, is_pressed);
        if is_pressed {
            self.on_component_pressed(session_id, trigger.identifier());
        } else {
            self.on_component_released(session_id, trigger.identifier());
        }
    }

    fn on_dpad_move(&mut self, session_id: &SessionId, dpad_id: u8, horizontal: DPadDir, vertical: DPadDir) {
        let key = (session_id.clone(), dpad_id);
        let prev = self.dpad_prev.get(&key).copied().unwrap_or((DPadDir::Neutral, DPadDir::Neutral));
        self.dpad_prev.insert(key, (horizontal, vertical));
        self.transition_axis(session_id, prev.0, horizontal, "DpadLeft", "DpadRight");
        self.transition_axis(session_id, prev.1, vertical, "DpadDown", "DpadUp");
    }

    fn transition_axis(
        &mut self,
        session_id: &SessionId,
        prev: DPadDir,
        new: DPadDir,
        negative_name: &str,
        positive_name: &str,
    ) {
        if prev == new {
            return;
        }
        match prev {
            DPadDir::Negative => self.on_component_released(session_id, negative_name),
            DPadDir::Positive => self.on_component_released(session_id, positive_name),
            DPadDir::Neutral => {}
        }
        match new {
            DPadDir::Negative => self.on_component_pressed(session_id, negative_name),
            DPadDir::Positive => self.on_component_pressed(session_id, positive_name),
            DPadDir::Neutral => {}
        }
    }

    /// For every held entry belonging to `session_id`, issue `key_up`
    /// and clear it (§3, §5 cancellation semantics).
    pub fn release_all(&mut self, session_id: &SessionId) {
        let held_keys: Vec<(SessionId, String)> = self
            .active_inputs
            .iter()
            .filter(|((sid, _), held)| sid == session_id && **held)
            .map(|(k, _)| k.clone())
            .collect();
        for key in held_keys {
            if let Some(idx) = self
                .profile
                .button_mappings
                .iter()
                .position(|m| m.button_identifier == key.1)
            {
                let mapping = self.profile.button_mappings[idx].clone();
                self.call_sink(session_id, |sink| sink.key_up(mapping.key_code, mapping.modifier));
            }
            self.active_inputs.insert(key, false);
        }
        self.pressed.remove(session_id);
        self.trigger_pressed.retain(|(sid, _), _| sid != session_id);
        self.dpad_prev.retain(|(sid, _), _| sid != session_id);
        self.warned_sink_error.remove(session_id);
    }

    /// Release every still-held key across every device (manager
    /// shutdown, §5).
    pub fn release_all_global(&mut self) {
        let sessions: HashSet<SessionId> = self.active_inputs.keys().map(|(sid, _)| sid.clone()).collect();
        for session_id in sessions {
            self.release_all(&session_id);
        }
    }

    fn call_sink(&mut self, session_id: &SessionId, f: impl FnOnce(&Arc<dyn EventSink>) -> Result<()>) {
        match f(&self.sink) {
            Ok(()) => {
                self.warned_sink_error.remove(session_id);
            }
            Err(err) => {
                if self.warned_sink_error.insert(session_id.clone()) {
                    log::warn!("event sink error for {session_id}: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(identifier: &str, code: u16) -> ButtonMapping {
        ButtonMapping {
            button_identifier: identifier.to_string(),
            key_code: code,
            modifier: KeyModifier::None,
        }
    }

    #[test]
    fn press_then_release_balances_active_inputs() {
        let sink = Arc::new(RecordingEventSink::new());
        let mut profile = Profile::default();
        profile.button_mappings.push(mapping("A", 0x04));
        let mut mapper = OutputMapper::new(sink.clone(), profile);
        let session = SessionId::new("dev1");

        mapper.on_component_pressed(&session, "A");
        mapper.on_component_pressed(&session, "A"); // idempotent
        assert_eq!(
            sink.calls(),
            vec![SinkCall::KeyDown(0x04, KeyModifier::None)]
        );

        mapper.on_component_released(&session, "A");
        mapper.on_component_released(&session, "A"); // idempotent
        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::KeyDown(0x04, KeyModifier::None),
                SinkCall::KeyUp(0x04, KeyModifier::None)
            ]
        );
    }

    #[test]
    fn chord_fires_once_on_completing_transition() {
        let sink = Arc::new(RecordingEventSink::new());
        let mut profile = Profile::default();
        profile.button_mappings.push(mapping("LB+RB", 0x31));
        let mut mapper = OutputMapper::new(sink.clone(), profile);
        let session = SessionId::new("dev1");

        mapper.on_component_pressed(&session, "LB");
        assert!(sink.calls().is_empty());
        mapper.on_component_pressed(&session, "RB");
        assert_eq!(sink.calls(), vec![SinkCall::KeyDown(0x31, KeyModifier::None)]);

        mapper.on_component_pressed(&session, "RB"); // already held, no-op
        assert_eq!(sink.calls().len(), 1);

        mapper.on_component_released(&session, "LB");
        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::KeyDown(0x31, KeyModifier::None),
                SinkCall::KeyUp(0x31, KeyModifier::None)
            ]
        );
    }

    #[test]
    fn release_all_clears_every_held_entry() {
        let sink = Arc::new(RecordingEventSink::new());
        let mut profile = Profile::default();
        profile.button_mappings.push(mapping("A", 0x04));
        profile.button_mappings.push(mapping("B", 0x05));
        let mut mapper = OutputMapper::new(sink.clone(), profile);
        let session = SessionId::new("dev1");

        mapper.on_component_pressed(&session, "A");
        mapper.on_component_pressed(&session, "B");
        mapper.release_all(&session);

        let calls = sink.calls();
        assert!(calls.contains(&SinkCall::KeyUp(0x04, KeyModifier::None)));
        assert!(calls.contains(&SinkCall::KeyUp(0x05, KeyModifier::None)));
        assert!(!mapper.active_inputs.values().any(|held| *held));
    }

    #[test]
    fn dpad_move_synthesizes_button_edges() {
        let sink = Arc::new(RecordingEventSink::new());
        let mut profile = Profile::default();
        profile.button_mappings.push(mapping("DpadRight", 0x07));
        let mut mapper = OutputMapper::new(sink.clone(), profile);
        let session = SessionId::new("dev1");

        mapper.on_dpad_move(&session, 0, DPadDir::Positive, DPadDir::Neutral);
        assert_eq!(sink.calls(), vec![SinkCall::KeyDown(0x07, KeyModifier::None)]);

        mapper.on_dpad_move(&session, 0, DPadDir::Neutral, DPadDir::Neutral);
        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::KeyDown(0x07, KeyModifier::None),
                SinkCall::KeyUp(0x07, KeyModifier::None)
            ]
        );
    }
}
