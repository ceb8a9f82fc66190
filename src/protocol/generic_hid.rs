//! Descriptor-driven generic HID decoder.
//!
//! When a `DeviceConfiguration` supplies a `reportDescriptor` (§6), this
//! parser walks its field list directly. Without one, it falls back to
//! a low-fidelity heuristic layout (first four bytes as the two stick
//! axis pairs, a sequential button bitmask starting at byte 2) good
//! enough to get an unrecognized HID gamepad moving before someone
//! writes it a real descriptor.

use serde::{Deserialize, Serialize};

use crate::event::{Axis, Button, Timestamp};
use crate::mirror_state::MirrorState;
use crate::protocol::common::{
    apply_deadzone, centered_byte_to_raw, normalize_stick, read_i16_le, Deadzones,
    ProtocolFamily, ProtocolParser,
};

/// On-disk shape of a generic HID report descriptor (§6). Axis/button
/// names are resolved against [`Axis::identifier`]/[`Button::identifier`];
/// [`validate_descriptor`] rejects an unrecognized name at configuration
/// load time (§7 `InvalidReportDescriptor`), so [`GenericHidParser::from_descriptor`]
/// only ever sees descriptors that are already known-good.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDescriptor {
    #[serde(default)]
    pub axis_fields: Vec<AxisField>,
    #[serde(default)]
    pub button_fields: Vec<ButtonField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisField {
    pub byte_offset: usize,
    /// Field width in bytes: 1 (centered at 128) or 2 (little-endian signed).
    pub size: u8,
    pub axis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonField {
    pub byte_offset: usize,
    pub bit: u8,
    pub button: String,
}

/// Checked at configuration load time: every field in a `reportDescriptor`
/// must name a recognized axis/button identifier, else the whole
/// descriptor is rejected rather than silently dropping fields at
/// runtime (§6, §7 `InvalidReportDescriptor`).
pub fn validate_descriptor(descriptor: &ReportDescriptor) -> Result<(), String> {
    for field in &descriptor.axis_fields {
        if resolve_axis(&field.axis).is_none() {
            return Err(format!("unrecognized axis identifier \"{}\"", field.axis));
        }
    }
    for field in &descriptor.button_fields {
        if resolve_button(&field.button).is_none() {
            return Err(format!("unrecognized button identifier \"{}\"", field.button));
        }
    }
    Ok(())
}

fn resolve_axis(name: &str) -> Option<Axis> {
    [
        Axis::LeftStickX,
        Axis::LeftStickY,
        Axis::RightStickX,
        Axis::RightStickY,
    ]
    .into_iter()
    .find(|a| a.identifier() == name)
}

fn resolve_button(name: &str) -> Option<Button> {
    [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LeftBumper,
        Button::RightBumper,
        Button::Menu,
        Button::View,
        Button::Guide,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
    ]
    .into_iter()
    .find(|b| b.identifier() == name)
}

struct ResolvedAxisField {
    byte_offset: usize,
    size: u8,
    axis: Axis,
}

struct ResolvedButtonField {
    byte_offset: usize,
    bit: u8,
    button: Button,
}

pub struct GenericHidParser {
    axis_fields: Vec<ResolvedAxisField>,
    button_fields: Vec<ResolvedButtonField>,
    has_descriptor: bool,
}

impl GenericHidParser {
    pub fn fallback() -> Self {
        Self {
            axis_fields: Vec::new(),
            button_fields: Vec::new(),
            has_descriptor: false,
        }
    }

    pub fn from_descriptor(descriptor: &ReportDescriptor) -> Self {
        let axis_fields = descriptor
            .axis_fields
            .iter()
            .filter_map(|f| {
                resolve_axis(&f.axis).map(|axis| ResolvedAxisField {
                    byte_offset: f.byte_offset,
                    size: f.size,
                    axis,
                })
            })
            .collect();
        let button_fields = descriptor
            .button_fields
            .iter()
            .filter_map(|f| {
                resolve_button(&f.button).map(|button| ResolvedButtonField {
                    byte_offset: f.byte_offset,
                    bit: f.bit,
                    button,
                })
            })
            .collect();
        Self {
            axis_fields,
            button_fields,
            has_descriptor: true,
        }
    }

    fn parse_with_descriptor(&self, report: &[u8], mirror: &mut MirrorState, ts: Timestamp) {
        for field in &self.axis_fields {
            let raw = match field.size {
                1 => match report.get(field.byte_offset) {
                    Some(&b) => centered_byte_to_raw(b),
                    None => continue,
                },
                _ => match read_i16_le(report, field.byte_offset) {
                    Some(v) => v,
                    None => continue,
                },
            };
            mirror.update_axis(field.axis, raw, normalize_stick(raw), ts);
        }
        for field in &self.button_fields {
            let Some(&byte) = report.get(field.byte_offset) else {
                continue;
            };
            mirror.update_button(field.button, byte & (1 << field.bit) != 0, ts);
        }
    }

    fn parse_fallback(&self, report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
        if report.len() >= 4 {
            let lx = centered_byte_to_raw(report[0]);
            let ly = centered_byte_to_raw(report[1]);
            let rx = centered_byte_to_raw(report[2]);
            let ry = centered_byte_to_raw(report[3]);
            let (vx, vy) = apply_deadzone(normalize_stick(lx), normalize_stick(ly), deadzones.left_stick);
            mirror.update_stick(Axis::LeftStickX, Axis::LeftStickY, lx, ly, vx, vy, ts);
            let (vx, vy) = apply_deadzone(normalize_stick(rx), normalize_stick(ry), deadzones.right_stick);
            mirror.update_stick(Axis::RightStickX, Axis::RightStickY, rx, ry, vx, vy, ts);
        }

        const SEQUENCE: [Button; 9] = [
            Button::A,
            Button::B,
            Button::X,
            Button::Y,
            Button::LeftBumper,
            Button::RightBumper,
            Button::Menu,
            Button::View,
            Button::Guide,
        ];
        for (i, button) in SEQUENCE.into_iter().enumerate() {
            let byte_offset = 2 + (i / 8);
            let bit = i % 8;
            let Some(&byte) = report.get(byte_offset) else {
                continue;
            };
            mirror.update_button(button, byte & (1 << bit) != 0, ts);
        }
    }
}

impl ProtocolParser for GenericHidParser {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::GenericHid
    }

    fn parse(&mut self, report: &[u8], mirror: &mut MirrorState, deadzones: &Deadzones, ts: Timestamp) {
        if self.has_descriptor {
            self.parse_with_descriptor(report, mirror, ts);
        } else {
            self.parse_fallback(report, mirror, deadzones, ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputEvent;

    #[test]
    fn fallback_decodes_first_axis_and_a_button() {
        let mut parser = GenericHidParser::fallback();
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let mut report = vec![128u8; 8];
        report[0] = 255; // left stick X pushed hard right
        report[2] = 0x01; // bit 0 at byte offset 2 -> Button::A

        parser.parse(&report, &mut mirror, &deadzones, 1);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::AxisMove { axis: Axis::LeftStickX, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { button: Button::A, .. })));
    }

    #[test]
    fn descriptor_driven_field_resolves_by_identifier() {
        let descriptor = ReportDescriptor {
            axis_fields: vec![AxisField {
                byte_offset: 1,
                size: 2,
                axis: "RightStickY".to_string(),
            }],
            button_fields: vec![ButtonField {
                byte_offset: 0,
                bit: 3,
                button: "Menu".to_string(),
            }],
        };
        let mut parser = GenericHidParser::from_descriptor(&descriptor);
        let mut mirror = MirrorState::new();
        let deadzones = Deadzones::default();
        let mut report = vec![0u8; 4];
        report[0] = 0b0000_1000;
        report[1..3].copy_from_slice(&16000i16.to_le_bytes());

        parser.parse(&report, &mut mirror, &deadzones, 1);
        let events = mirror.emit_dirty();
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::AxisMove { axis: Axis::RightStickY, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, InputEvent::ButtonPress { button: Button::Menu, .. })));
    }

    #[test]
    fn unresolvable_field_name_is_dropped() {
        let descriptor = ReportDescriptor {
            axis_fields: vec![AxisField {
                byte_offset: 0,
                size: 1,
                axis: "NotAnAxis".to_string(),
            }],
            button_fields: vec![],
        };
        let parser = GenericHidParser::from_descriptor(&descriptor);
        assert!(parser.axis_fields.is_empty());
    }

    #[test]
    fn validate_descriptor_rejects_unrecognized_names() {
        let bad_axis = ReportDescriptor {
            axis_fields: vec![AxisField {
                byte_offset: 0,
                size: 1,
                axis: "NotAnAxis".to_string(),
            }],
            button_fields: vec![],
        };
        assert!(validate_descriptor(&bad_axis).is_err());

        let bad_button = ReportDescriptor {
            axis_fields: vec![],
            button_fields: vec![ButtonField {
                byte_offset: 0,
                bit: 0,
                button: "NotAButton".to_string(),
            }],
        };
        assert!(validate_descriptor(&bad_button).is_err());

        let good = ReportDescriptor {
            axis_fields: vec![AxisField {
                byte_offset: 0,
                size: 1,
                axis: "LeftStickX".to_string(),
            }],
            button_fields: vec![ButtonField {
                byte_offset: 2,
                bit: 0,
                button: "A".to_string(),
            }],
        };
        assert!(validate_descriptor(&good).is_ok());
    }
}
