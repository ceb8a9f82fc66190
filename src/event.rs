//! Normalized input events emitted by [`crate::mirror_state::MirrorState`].
//!
//! Every protocol family decodes into this one vocabulary so that
//! everything above the parser layer — dirty-edge tracking, output
//! mapping — is vendor-agnostic.

/// Monotonic microseconds since process start. Set once per report and
/// shared by every event emitted from that report (§4.5).
pub type Timestamp = u64;

/// A normalized digital button, shared across all protocol families.
///
/// `LeftStickUi`/`RightStickUi` are not physical buttons: they are
/// synthesized by [`crate::mirror_state::MirrorState`] when a stick's
/// deflection crosses `stick_button_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Menu,
    View,
    Guide,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    LeftStickUi,
    RightStickUi,
}

impl Button {
    /// Canonical string identifier used in `Profile`/`ButtonMapping`
    /// (§3) and as the component name in "+"-joined chords.
    pub fn identifier(&self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::LeftBumper => "LB",
            Button::RightBumper => "RB",
            Button::Menu => "Menu",
            Button::View => "View",
            Button::Guide => "Guide",
            Button::DpadUp => "DpadUp",
            Button::DpadDown => "DpadDown",
            Button::DpadLeft => "DpadLeft",
            Button::DpadRight => "DpadRight",
            Button::LeftStickUi => "LeftStickUi",
            Button::RightStickUi => "RightStickUi",
        }
    }
}

/// A normalized analog stick axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
}

impl Axis {
    pub fn identifier(&self) -> &'static str {
        match self {
            Axis::LeftStickX => "LeftStickX",
            Axis::LeftStickY => "LeftStickY",
            Axis::RightStickX => "RightStickX",
            Axis::RightStickY => "RightStickY",
        }
    }
}

/// A normalized analog trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Left,
    Right,
}

impl Trigger {
    pub fn identifier(&self) -> &'static str {
        match self {
            Trigger::Left => "LeftTrigger",
            Trigger::Right => "RightTrigger",
        }
    }
}

/// Direction of one D-pad axis.
///
/// The same variant set is reused for both the horizontal axis
/// (`Negative` = West, `Positive` = East) and the vertical axis
/// (`Negative` = South, `Positive` = North), matching how a single
/// dirty-edge comparison (`PartialEq`) is sufficient for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DPadDir {
    Neutral,
    Negative,
    Positive,
}

/// One normalized input event. Every variant carries the [`Timestamp`]
/// of the report it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    ButtonPress {
        button: Button,
        ts: Timestamp,
    },
    ButtonRelease {
        button: Button,
        ts: Timestamp,
    },
    AxisMove {
        axis: Axis,
        value: f32,
        raw: i16,
        ts: Timestamp,
    },
    TriggerMove {
        trigger: Trigger,
        value: f32,
        raw: u8,
        is_pressed: bool,
        ts: Timestamp,
    },
    DPadMove {
        dpad_id: u8,
        horizontal: DPadDir,
        vertical: DPadDir,
        ts: Timestamp,
    },
    HatSwitch {
        hat_id: u8,
        angle: i16,
        ts: Timestamp,
    },
}

impl InputEvent {
    pub fn ts(&self) -> Timestamp {
        match *self {
            InputEvent::ButtonPress { ts, .. }
            | InputEvent::ButtonRelease { ts, .. }
            | InputEvent::AxisMove { ts, .. }
            | InputEvent::TriggerMove { ts, .. }
            | InputEvent::DPadMove { ts, .. }
            | InputEvent::HatSwitch { ts, .. } => ts,
        }
    }
}
