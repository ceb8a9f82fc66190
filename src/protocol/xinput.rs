//! Legacy XInput-class HID report decoder: a fixed 14-byte report
//! behind a 2-byte header (§4.4, GLOSSARY).

use crate::event::{Axis, Button, DPadDir};
use crate::protocol::common::{
    apply_deadzone, normalize_stick, normalize_trigger, read_i16_le, Deadzones, ProtocolFamily,
    ProtocolParser,
};
use crate::{event::Timestamp, mirror_state::MirrorState};

const EXPECTED_HEADER: [u8; 2] = [0x00, 0x0F];
const MIN_LEN: usize = 14;

// Bit values mirror the well-known XINPUT_GAMEPAD button layout.
const DPAD_UP: u16 = 0x0001;
const DPAD_DOWN: u16 = 0x0002;
const DPAD_LEFT: u16 = 0x0004;
const DPAD_RIGHT: u16 = 0x0008;
const START: u16 = 0x0010;
const BACK: u16 = 0x0020;
const LEFT_THUMB: u16 = 0x0040;
const RIGHT_THUMB: u16 = 0x0080;
const LEFT_SHOULDER: u16 = 0x0100;
const RIGHT_SHOULDER: u16 = 0x0200;
const GUIDE: u16 = 0x0400;
const BTN_A: u16 = 0x1000;
const BTN_B: u16 = 0x2000;
const BTN_X: u16 = 0x4000;
const BTN_Y: u16 = 0x8000;

#[derive(Debug, Default)]
pub struct XInputParser;

impl XInputParser {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolParser for XInputParser {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::XInput
    }

    fn parse(&mut self, report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
        if report.len() < MIN_LEN {
            return;
        }
        // Header mismatch is tolerated (lenient per "expected", §4.4), just logged.
        if report[0..2] != EXPECTED_HEADER {
            log::trace!(
                "xinput report header {:02x?} did not match expected {:02x?}",
                &report[0..2],
                EXPECTED_HEADER
            );
        }

        let buttons = u16::from_le_bytes([report[2], report[3]]);
        mirror.update_button(Button::A, buttons & BTN_A != 0, ts);
        mirror.update_button(Button::B, buttons & BTN_B != 0, ts);
        mirror.update_button(Button::X, buttons & BTN_X != 0, ts);
        mirror.update_button(Button::Y, buttons & BTN_Y != 0, ts);
        mirror.update_button(Button::LeftBumper, buttons & LEFT_SHOULDER != 0, ts);
        mirror.update_button(Button::RightBumper, buttons & RIGHT_SHOULDER != 0, ts);
        mirror.update_button(Button::Menu, buttons & START != 0, ts);
        mirror.update_button(Button::View, buttons & BACK != 0, ts);
        mirror.update_button(Button::Guide, buttons & GUIDE != 0, ts);
        mirror.update_button(Button::LeftStickUi, buttons & LEFT_THUMB != 0, ts);
        mirror.update_button(Button::RightStickUi, buttons & RIGHT_THUMB != 0, ts);

        let horizontal = if buttons & DPAD_LEFT != 0 {
            DPadDir::Negative
        } else if buttons & DPAD_RIGHT != 0 {
            DPadDir::Positive
        } else {
            DPadDir::Neutral
        };
        let vertical = if buttons & DPAD_UP != 0 {
            DPadDir::Positive
        } else if buttons & DPAD_DOWN != 0 {
            DPadDir::Negative
        } else {
            DPadDir::Neutral
        };
        mirror.update_dpad(0, horizontal, vertical, ts);

        let lt = normalize_trigger(report[4]);
        let rt = normalize_trigger(report[5]);
        mirror.update_trigger(crate::event::Trigger::Left, report[4], lt, ts);
        mirror.update_trigger(crate::event::Trigger::Right, report[5], rt, ts);

        if let (Some(lx), Some(ly), Some(rx), Some(ry)) = (
            read_i16_le(report, 6),
            read_i16_le(report, 8),
            read_i16_le(report, 10),
            read_i16_le(report, 12),
        ) {
            let (vx, vy) =
                apply_deadzone(normalize_stick(lx), normalize_stick(ly), deadzones.left_stick);
            mirror.update_stick(Axis::LeftStickX, Axis::LeftStickY, lx, ly, vx, vy, ts);
            let (vx, vy) =
                apply_deadzone(normalize_stick(rx), normalize_stick(ry), deadzones.right_stick);
            mirror.update_stick(Axis::RightStickX, Axis::RightStickY, rx, ry, vx, vy, ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputEvent;

    #[test]
    fn decodes_a_button_and_right_dpad() {
        let mut parser = XInputParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let mut report = vec![0u8; 14];
        report[0] = 0x00;
        report[1] = 0x0F;
        let buttons: u16 = BTN_A | DPAD_RIGHT;
        report[2..4].copy_from_slice(&buttons.to_le_bytes());

        parser.parse(&report, &mut mirror, &deadzones, 1);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { button: Button::A, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            InputEvent::DPadMove {
                horizontal: DPadDir::Positive,
                ..
            }
        )));
    }

    #[test]
    fn short_report_is_ignored() {
        let mut parser = XInputParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        parser.parse(&[0x00, 0x0F, 0x01], &mut mirror, &deadzones, 1);
        assert!(mirror.emit_dirty().is_empty());
    }
}
