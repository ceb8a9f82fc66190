//! Per-family protocol parsers (§4.4).
//!
//! Each submodule decodes one vendor wire format into the normalized
//! [`crate::event::InputEvent`] vocabulary by driving a
//! [`crate::mirror_state::MirrorState`]. [`common`] holds the shared
//! normalization math and the [`common::ProtocolParser`] trait object
//! boundary.

pub mod common;
pub mod generic_hid;
pub mod gip;
pub mod ps4_hid;
pub mod ps5_hid;
pub mod switch_hid;
pub mod xinput;

pub use common::{Deadzones, ProtocolFamily, ProtocolParser};
pub use generic_hid::{GenericHidParser, ReportDescriptor};
pub use gip::GipParser;
pub use ps4_hid::Ps4HidParser;
pub use ps5_hid::Ps5HidParser;
pub use switch_hid::SwitchHidParser;
pub use xinput::XInputParser;

/// Construct the parser matching a configured protocol family. Generic
/// HID uses the fallback heuristic layout unless a report descriptor is
/// supplied separately via [`GenericHidParser::from_descriptor`].
pub fn parser_for_family(family: ProtocolFamily) -> Box<dyn ProtocolParser> {
    match family {
        ProtocolFamily::Gip => Box::new(GipParser::new()),
        ProtocolFamily::XInput => Box::new(XInputParser::new()),
        ProtocolFamily::GenericHid => Box::new(GenericHidParser::fallback()),
        ProtocolFamily::SwitchHid => Box::new(SwitchHidParser::new()),
        ProtocolFamily::Ps4Hid => Box::new(Ps4HidParser::new()),
        ProtocolFamily::Ps5Hid => Box::new(Ps5HidParser::new()),
    }
}
