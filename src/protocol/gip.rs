//! Gamepad Interface Protocol (Xbox family) decoder.
//!
//! Framed by a report-type byte. The "full input" report (`0x20`) is the
//! steady-state report emitted on every physical change; `0x03`/`0x01`
//! and `0x07` are auxiliary reports some firmwares also send (brief
//! face-button echoes and the standalone guide-button press). A legacy
//! `0x06` layout exists on some older Xbox One firmware revisions
//! (§4.4).

use crate::event::{Axis, Button, DPadDir, Timestamp};
use crate::mirror_state::MirrorState;
use crate::protocol::common::{
    apply_deadzone, apply_deadzone_1d, normalize_stick, normalize_trigger, read_i16_le,
    read_u16_le, Deadzones, ProtocolFamily, ProtocolParser,
};

#[derive(Debug, Default)]
pub struct GipParser;

impl GipParser {
    pub fn new() -> Self {
        Self
    }
}

/// Bits 0..3 of a GIP button byte encode the D-pad: up, down, left, right.
fn decode_dpad_bits(byte: u8) -> (DPadDir, DPadDir) {
    let up = byte & 0x01 != 0;
    let down = byte & 0x02 != 0;
    let left = byte & 0x04 != 0;
    let right = byte & 0x08 != 0;
    let horizontal = if left {
        DPadDir::Negative
    } else if right {
        DPadDir::Positive
    } else {
        DPadDir::Neutral
    };
    let vertical = if up {
        DPadDir::Positive
    } else if down {
        DPadDir::Negative
    } else {
        DPadDir::Neutral
    };
    (horizontal, vertical)
}

fn apply_face_buttons(byte4: u8, mirror: &mut MirrorState, ts: Timestamp) {
    mirror.update_button(Button::A, byte4 & 0x10 != 0, ts);
    mirror.update_button(Button::B, byte4 & 0x20 != 0, ts);
    mirror.update_button(Button::X, byte4 & 0x40 != 0, ts);
    mirror.update_button(Button::Y, byte4 & 0x80 != 0, ts);
    mirror.update_button(Button::Menu, byte4 & 0x04 != 0, ts);
    mirror.update_button(Button::View, byte4 & 0x08 != 0, ts);
}

fn parse_full(report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
    apply_face_buttons(report[4], mirror, ts);
    mirror.update_button(Button::LeftBumper, report[5] & 0x10 != 0, ts);
    mirror.update_button(Button::RightBumper, report[5] & 0x20 != 0, ts);
    let (horizontal, vertical) = decode_dpad_bits(report[5]);
    mirror.update_dpad(0, horizontal, vertical, ts);

    if let (Some(lt), Some(rt)) = (read_u16_le(report, 6), read_u16_le(report, 8)) {
        let lt = apply_deadzone_1d(lt as f32 / 1023.0, deadzones.triggers);
        let rt = apply_deadzone_1d(rt as f32 / 1023.0, deadzones.triggers);
        mirror.update_trigger(crate::event::Trigger::Left, (lt * 255.0) as u8, lt, ts);
        mirror.update_trigger(crate::event::Trigger::Right, (rt * 255.0) as u8, rt, ts);
    }

    update_sticks(report, 10, 12, 14, 16, mirror, deadzones, ts);
}

fn update_sticks(
    report: &[u8],
    lx_off: usize,
    ly_off: usize,
    rx_off: usize,
    ry_off: usize,
    mirror: &mut MirrorState,
    deadzones: &Deadzones,
    ts: Timestamp,
) {
    if let (Some(lx), Some(ly)) = (read_i16_le(report, lx_off), read_i16_le(report, ly_off)) {
        let (vx, vy) = apply_deadzone(normalize_stick(lx), normalize_stick(ly), deadzones.left_stick);
        mirror.update_stick(Axis::LeftStickX, Axis::LeftStickY, lx, ly, vx, vy, ts);
    }
    if let (Some(rx), Some(ry)) = (read_i16_le(report, rx_off), read_i16_le(report, ry_off)) {
        let (vx, vy) = apply_deadzone(normalize_stick(rx), normalize_stick(ry), deadzones.right_stick);
        mirror.update_stick(Axis::RightStickX, Axis::RightStickY, rx, ry, vx, vy, ts);
    }
}

fn parse_legacy(report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
    if report.len() < 0x10 {
        return;
    }
    apply_face_buttons(report[0x04], mirror, ts);
    mirror.update_button(Button::LeftBumper, report[0x05] & 0x10 != 0, ts);
    mirror.update_button(Button::RightBumper, report[0x05] & 0x20 != 0, ts);
    let (horizontal, vertical) = decode_dpad_bits(report[0x05]);
    mirror.update_dpad(0, horizontal, vertical, ts);

    let lt = apply_deadzone_1d(normalize_trigger(report[0x06]), deadzones.triggers);
    let rt = apply_deadzone_1d(normalize_trigger(report[0x07]), deadzones.triggers);
    mirror.update_trigger(crate::event::Trigger::Left, report[0x06], lt, ts);
    mirror.update_trigger(crate::event::Trigger::Right, report[0x07], rt, ts);

    update_sticks(report, 0x08, 0x0A, 0x0C, 0x0E, mirror, deadzones, ts);
}

impl ProtocolParser for GipParser {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Gip
    }

    fn parse(&mut self, report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
        let Some(&report_type) = report.first() else {
            return;
        };
        match report_type {
            0x20 if report.len() >= 19 => parse_full(report, mirror, deadzones, ts),
            0x03 if report.get(1) == Some(&0x01) && report.len() >= 5 => {
                apply_face_buttons(report[4], mirror, ts);
            }
            0x07 if report.len() >= 5 => {
                mirror.update_button(Button::Guide, report[4] == 1, ts);
            }
            0x06 => parse_legacy(report, mirror, deadzones, ts),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputEvent;

    fn hex(s: &str) -> Vec<u8> {
        s.split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect()
    }

    #[test]
    fn full_report_button_a_press_then_repeat_then_release() {
        let mut parser = GipParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let report = hex("20 00 00 00 10 00 00 00 00 00 00 00 80 80 80 80 80 80 00");

        parser.parse(&report, &mut mirror, &deadzones, 1);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { button: Button::A, .. })));

        parser.parse(&report, &mut mirror, &deadzones, 2);
        let events = mirror.emit_dirty();
        assert!(!events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { .. } | InputEvent::ButtonRelease { .. })));

        let released = hex("20 00 00 00 00 00 00 00 00 00 00 00 80 80 80 80 80 80 00");
        parser.parse(&released, &mut mirror, &deadzones, 3);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonRelease { button: Button::A, .. })));
    }

    #[test]
    fn short_report_type_0x03_is_ignored_without_panic() {
        let mut parser = GipParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let report = hex("03 01 00 00");
        parser.parse(&report, &mut mirror, &deadzones, 1);
        assert!(mirror.emit_dirty().is_empty());
    }

    #[test]
    fn guide_button_report() {
        let mut parser = GipParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let report = hex("07 00 00 00 01");
        parser.parse(&report, &mut mirror, &deadzones, 1);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { button: Button::Guide, .. })));
    }

    #[test]
    fn unrecognized_report_type_emits_nothing() {
        let mut parser = GipParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let report = hex("ff 00 00 00 00");
        parser.parse(&report, &mut mirror, &deadzones, 1);
        assert!(mirror.emit_dirty().is_empty());
    }
}
