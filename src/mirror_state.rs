//! Per-device authoritative input state with dirty-edge emission.
//!
//! `MirrorState` is the only place that decides whether a report byte
//! produced something worth telling the rest of the system about. A
//! parser mutates the mirror through `update_*`; an `update_*` call
//! queues an event only when the new value differs from what was last
//! observed (§3, §4.5). Calling [`MirrorState::emit_dirty`] drains and
//! clears that queue — after the call returns, nothing is pending.

use std::collections::HashMap;

use crate::event::{Axis, Button, DPadDir, InputEvent, Timestamp, Trigger};

/// Minimum analog delta treated as a real change (§3).
const ANALOG_EPSILON: f32 = 1e-3;

/// Deflection (as `max(|x|, |y|)`) above which a stick's derived
/// "stick-as-button" state is considered pressed (§4.5).
const DEFAULT_STICK_BUTTON_THRESHOLD: f32 = 0.9;

/// Analog value above which a trigger's derived `is_pressed` is true.
const TRIGGER_PRESS_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
struct AxisCell {
    value: f32,
    raw: i16,
}

#[derive(Debug, Clone, Copy, Default)]
struct TriggerCell {
    value: f32,
    raw: u8,
    is_pressed: bool,
}

/// Per-device mirrored state. One instance per connected device, owned
/// by that device's session task (§5: "mirrors... owned by exactly one
/// task").
#[derive(Debug)]
pub struct MirrorState {
    buttons: HashMap<Button, bool>,
    axes: HashMap<Axis, AxisCell>,
    triggers: HashMap<Trigger, TriggerCell>,
    dpads: HashMap<u8, (DPadDir, DPadDir)>,
    hats: HashMap<u8, i16>,
    stick_button_threshold: f32,
    pending: Vec<InputEvent>,
}

impl Default for MirrorState {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorState {
    pub fn new() -> Self {
        Self {
            buttons: HashMap::new(),
            axes: HashMap::new(),
            triggers: HashMap::new(),
            dpads: HashMap::new(),
            hats: HashMap::new(),
            stick_button_threshold: DEFAULT_STICK_BUTTON_THRESHOLD,
            pending: Vec::new(),
        }
    }

    pub fn with_stick_button_threshold(mut self, threshold: f32) -> Self {
        self.stick_button_threshold = threshold;
        self
    }

    /// Current value of a button, `false` if never observed.
    pub fn button(&self, button: Button) -> bool {
        self.buttons.get(&button).copied().unwrap_or(false)
    }

    /// Current value of an axis, `0.0` if never observed.
    pub fn axis(&self, axis: Axis) -> f32 {
        self.axes.get(&axis).map(|c| c.value).unwrap_or(0.0)
    }

    pub fn update_button(&mut self, button: Button, pressed: bool, ts: Timestamp) {
        let prev = self.buttons.get(&button).copied().unwrap_or(false);
        if prev == pressed {
            return;
        }
        self.buttons.insert(button, pressed);
        self.pending.push(if pressed {
            InputEvent::ButtonPress { button, ts }
        } else {
            InputEvent::ButtonRelease { button, ts }
        });
    }

    /// Update both axes of one stick together (deadzone shaping needs
    /// both components at once) and recompute the stick's derived
    /// "stick-as-button" state if either axis actually changed.
    #[allow(clippy::too_many_arguments)]
    pub fn update_stick(
        &mut self,
        x_axis: Axis,
        y_axis: Axis,
        raw_x: i16,
        raw_y: i16,
        value_x: f32,
        value_y: f32,
        ts: Timestamp,
    ) {
        let x_changed = self.update_axis_cell(x_axis, raw_x, value_x, ts);
        let y_changed = self.update_axis_cell(y_axis, raw_y, value_y, ts);
        if x_changed || y_changed {
            let ui_button = match (x_axis, y_axis) {
                (Axis::LeftStickX, Axis::LeftStickY) => Button::LeftStickUi,
                (Axis::RightStickX, Axis::RightStickY) => Button::RightStickUi,
                _ => return,
            };
            let deflected = value_x.abs().max(value_y.abs()) >= self.stick_button_threshold;
            self.update_button(ui_button, deflected, ts);
        }
    }

    /// Update a single axis with no stick-pair/derived-button handling,
    /// for descriptor-driven generic HID fields that don't necessarily
    /// arrive in `(x, y)` pairs.
    pub fn update_axis(&mut self, axis: Axis, raw: i16, value: f32, ts: Timestamp) {
        self.update_axis_cell(axis, raw, value, ts);
    }

    fn update_axis_cell(&mut self, axis: Axis, raw: i16, value: f32, ts: Timestamp) -> bool {
        let prev = self.axes.get(&axis).copied().unwrap_or_default();
        if (value - prev.value).abs() < ANALOG_EPSILON {
            return false;
        }
        self.axes.insert(axis, AxisCell { value, raw });
        self.pending.push(InputEvent::AxisMove { axis, value, raw, ts });
        true
    }

    pub fn update_trigger(&mut self, trigger: Trigger, raw: u8, value: f32, ts: Timestamp) {
        let prev = self.triggers.get(&trigger).copied().unwrap_or_default();
        if (value - prev.value).abs() < ANALOG_EPSILON {
            return;
        }
        let is_pressed = value > TRIGGER_PRESS_THRESHOLD;
        self.triggers.insert(
            trigger,
            TriggerCell {
                value,
                raw,
                is_pressed,
            },
        );
        self.pending.push(InputEvent::TriggerMove {
            trigger,
            value,
            raw,
            is_pressed,
            ts,
        });
    }

    pub fn update_dpad(&mut self, dpad_id: u8, horizontal: DPadDir, vertical: DPadDir, ts: Timestamp) {
        let prev = self.dpads.get(&dpad_id).copied();
        if prev == Some((horizontal, vertical)) {
            return;
        }
        self.dpads.insert(dpad_id, (horizontal, vertical));
        self.pending.push(InputEvent::DPadMove {
            dpad_id,
            horizontal,
            vertical,
            ts,
        });
    }

    pub fn update_hat(&mut self, hat_id: u8, angle: i16, ts: Timestamp) {
        let prev = self.hats.get(&hat_id).copied();
        if prev == Some(angle) {
            return;
        }
        self.hats.insert(hat_id, angle);
        self.pending.push(InputEvent::HatSwitch { hat_id, angle, ts });
    }

    /// Drain and return every event queued since the last call, ordered
    /// by dirty class (buttons, axes, triggers, dpads, hats) rather than
    /// by parser push order, per §4.5/§5's ordering guarantee; events
    /// within a class keep their relative push order. The dirty-set is
    /// always empty immediately after this returns.
    pub fn emit_dirty(&mut self) -> Vec<InputEvent> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(Self::class_rank);
        pending
    }

    fn class_rank(event: &InputEvent) -> u8 {
        match event {
            InputEvent::ButtonPress { .. } | InputEvent::ButtonRelease { .. } => 0,
            InputEvent::AxisMove { .. } => 1,
            InputEvent::TriggerMove { .. } => 2,
            InputEvent::DPadMove { .. } => 3,
            InputEvent::HatSwitch { .. } => 4,
        }
    }
}
