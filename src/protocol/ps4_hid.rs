//! DualShock 4-style HID report decoder (report type `0x01`, §4.4).
//!
//! Face buttons follow the common cross-vendor digital-button mapping
//! (Cross→A, Circle→B, Square→X, Triangle→Y) so the rest of the core
//! never has to special-case PlayStation naming.

use crate::event::{Axis, Button, Timestamp};
use crate::mirror_state::MirrorState;
use crate::protocol::common::{
    apply_deadzone, apply_deadzone_1d, centered_byte_to_raw, normalize_stick, normalize_trigger,
    Deadzones, ProtocolFamily, ProtocolParser,
};
use crate::protocol::switch_hid::hat_nibble_to_dpad;

const REPORT_TYPE: u8 = 0x01;
const MIN_LEN: usize = 10;

pub(crate) fn decode(report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
    let (horizontal, vertical) = hat_nibble_to_dpad(report[5] & 0x0F);
    mirror.update_dpad(0, horizontal, vertical, ts);

    let face = (report[5] >> 4) & 0x0F;
    mirror.update_button(Button::X, face & 0x01 != 0, ts); // Square
    mirror.update_button(Button::A, face & 0x02 != 0, ts); // Cross
    mirror.update_button(Button::B, face & 0x04 != 0, ts); // Circle
    mirror.update_button(Button::Y, face & 0x08 != 0, ts); // Triangle

    let b6 = report[6];
    mirror.update_button(Button::LeftBumper, b6 & 0x01 != 0, ts);
    mirror.update_button(Button::RightBumper, b6 & 0x02 != 0, ts);
    mirror.update_button(Button::View, b6 & 0x10 != 0, ts); // Share
    mirror.update_button(Button::Menu, b6 & 0x20 != 0, ts); // Options

    let lx = centered_byte_to_raw(report[1]);
    let ly = centered_byte_to_raw(report[2]);
    let rx = centered_byte_to_raw(report[3]);
    let ry = centered_byte_to_raw(report[4]);
    let (vx, vy) = apply_deadzone(normalize_stick(lx), normalize_stick(ly), deadzones.left_stick);
    mirror.update_stick(Axis::LeftStickX, Axis::LeftStickY, lx, ly, vx, vy, ts);
    let (vx, vy) = apply_deadzone(normalize_stick(rx), normalize_stick(ry), deadzones.right_stick);
    mirror.update_stick(Axis::RightStickX, Axis::RightStickY, rx, ry, vx, vy, ts);

    let lt = apply_deadzone_1d(normalize_trigger(report[8]), deadzones.triggers);
    let rt = apply_deadzone_1d(normalize_trigger(report[9]), deadzones.triggers);
    mirror.update_trigger(crate::event::Trigger::Left, report[8], lt, ts);
    mirror.update_trigger(crate::event::Trigger::Right, report[9], rt, ts);
}

#[derive(Debug, Default)]
pub struct Ps4HidParser;

impl Ps4HidParser {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolParser for Ps4HidParser {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Ps4Hid
    }

    fn parse(&mut self, report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
        if report.len() < MIN_LEN || report.first() != Some(&REPORT_TYPE) {
            return;
        }
        decode(report, mirror, deadzones, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputEvent;

    #[test]
    fn centered_sticks_produce_no_axis_move_past_initial_sync() {
        let mut parser = Ps4HidParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let report = vec![0x01, 0x80, 0x80, 0x80, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00];

        parser.parse(&report, &mut mirror, &deadzones, 1);
        let first = mirror.emit_dirty();
        assert!(!first
            .iter()
            .any(|e| matches!(e, InputEvent::AxisMove { .. })));

        parser.parse(&report, &mut mirror, &deadzones, 2);
        let second = mirror.emit_dirty();
        assert!(second.is_empty());
    }

    #[test]
    fn short_report_is_ignored() {
        let mut parser = Ps4HidParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        parser.parse(&[0x01, 0x80], &mut mirror, &deadzones, 1);
        assert!(mirror.emit_dirty().is_empty());
    }
}
