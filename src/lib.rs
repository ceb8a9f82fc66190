//! A user-level gamepad driver core: vendor protocol parsing, device
//! lifecycle management, and profile-driven key/mouse output.
//!
//! This crate owns everything between "bytes arrived on a USB endpoint"
//! and "a synthetic key or mouse event was handed to the host" — USB
//! transport is abstracted behind [`usb::UsbPort`] and host input
//! synthesis behind [`output_mapper::EventSink`], so this crate itself
//! never touches a kernel driver or an OS input API directly.
//!
//! Start at [`manager::DeviceManager`]: it owns discovery, session
//! lifecycle, input routing, and output mapping end to end. Most
//! applications only need to construct one, call
//! [`manager::DeviceManager::run`], and load a [`profile::Profile`].

pub mod config;
pub mod device_id;
pub mod error;
pub mod event;
pub mod input_router;
pub mod manager;
pub mod mirror_state;
pub mod output_mapper;
pub mod profile;
pub mod protocol;
pub mod session;
pub mod session_id;
pub mod usb;

pub use config::{ConfigStore, DeviceConfiguration};
pub use device_id::DeviceId;
pub use error::{Error, ErrorReport, Result};
pub use event::InputEvent;
pub use manager::{DeviceManager, ManagerCommand};
pub use output_mapper::EventSink;
pub use profile::Profile;
pub use session_id::SessionId;
pub use usb::UsbPort;

/// Test and demo doubles: a scriptable [`usb::UsbPort`] fake and an
/// in-process [`output_mapper::EventSink`] that records rather than
/// acts. Available under `cargo test` unconditionally, and to
/// downstream crates via the `test-util` feature (see Cargo.toml).
#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    pub use crate::output_mapper::{RecordingEventSink, SinkCall};
    pub use crate::usb::mock::MockUsbPort;
}
