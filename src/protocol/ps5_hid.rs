//! DualSense-style HID report decoder.
//!
//! Mirrors the PS4 decoder's button topology and field offsets; this
//! core only differentiates DualSense by its larger report length,
//! since rumble/adaptive-trigger/touchpad payloads beyond the shared
//! core are out of scope (§4.4).

use crate::event::Timestamp;
use crate::mirror_state::MirrorState;
use crate::protocol::common::{Deadzones, ProtocolFamily, ProtocolParser};
use crate::protocol::ps4_hid;

const REPORT_TYPE: u8 = 0x01;
const MIN_LEN: usize = 12;

#[derive(Debug, Default)]
pub struct Ps5HidParser;

impl Ps5HidParser {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolParser for Ps5HidParser {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Ps5Hid
    }

    fn parse(&mut self, report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
        if report.len() < MIN_LEN || report.first() != Some(&REPORT_TYPE) {
            return;
        }
        ps4_hid::decode(report, mirror, deadzones, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Button, InputEvent};

    #[test]
    fn decodes_cross_button_like_ps4() {
        let mut parser = Ps5HidParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let mut report = vec![0x80u8; 12];
        report[0] = 0x01;
        report[5] = 0x20; // Cross bit in the high nibble
        report[6] = 0x00;
        report[8] = 0x00;
        report[9] = 0x00;

        parser.parse(&report, &mut mirror, &deadzones, 1);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { button: Button::A, .. })));
    }

    #[test]
    fn below_minimum_length_is_ignored() {
        let mut parser = Ps5HidParser::new();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        parser.parse(&[0x01; 4], &mut mirror, &deadzones, 1);
        assert!(mirror.emit_dirty().is_empty());
    }
}
