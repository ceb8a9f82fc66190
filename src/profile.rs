//! Profile: a device's button→key/modifier mapping (§3, §6).
//!
//! Profiles are plain JSON files; persistence itself is out of scope
//! per the core's charter (the GUI/CLI own the user-facing save flow),
//! but the shape and the round-trip guarantee (§8) live here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device_id::DeviceId;
use crate::error::{Error, ProfileError, Result};

const CURRENT_PROFILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyModifier {
    None,
    Command,
    Control,
    Option,
    Shift,
}

impl Default for KeyModifier {
    fn default() -> Self {
        KeyModifier::None
    }
}

/// One binding. `button_identifier` is either a single [`crate::event::Button`]
/// identifier or a `"+"`-joined chord (e.g. `"LB+RB"`), matched against
/// [`crate::event::Button::identifier`]/[`crate::event::Trigger::identifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonMapping {
    pub button_identifier: String,
    pub key_code: u16,
    #[serde(default)]
    pub modifier: KeyModifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerAxis {
    X,
    Y,
}

/// Stick-to-pointer-motion mapping, implementing §4.6's
/// `AxisMove`→`mouse_move` formula (`dx = value * sensitivity * 10`);
/// see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    /// [`crate::event::Axis`] identifier this mapping reads from.
    pub axis: String,
    pub pointer_axis: PointerAxis,
    #[serde(default = "AxisMapping::default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "AxisMapping::default_mouse_deadzone")]
    pub mouse_deadzone: f32,
}

impl AxisMapping {
    fn default_sensitivity() -> f32 {
        1.0
    }
    fn default_mouse_deadzone() -> f32 {
        0.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub device_id: Option<DeviceId>,
    pub button_mappings: Vec<ButtonMapping>,
    #[serde(default)]
    pub axis_mappings: Vec<AxisMapping>,
    #[serde(default = "Profile::default_version")]
    pub version: String,
}

impl Profile {
    fn default_version() -> String {
        CURRENT_PROFILE_VERSION.to_string()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Profile(ProfileError::InvalidFormat(e.to_string())))?;
        fs::write(path, json).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn load_from_file(path: &Path) -> Result<Profile> {
        let text = fs::read_to_string(path).map_err(|_| Error::Profile(ProfileError::NotFound))?;
        let profile: Profile = serde_json::from_str(&text)
            .map_err(|e| Error::Profile(ProfileError::InvalidFormat(e.to_string())))?;
        if profile.version != CURRENT_PROFILE_VERSION {
            return Err(Error::Profile(ProfileError::VersionMismatch(profile.version)));
        }
        Ok(profile)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            device_id: None,
            button_mappings: Vec::new(),
            axis_mappings: Vec::new(),
            version: CURRENT_PROFILE_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("padbridge-profile-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("p.json");

        let profile = Profile {
            name: "p".to_string(),
            device_id: Some(DeviceId::new(0x045E, 0x02EA)),
            button_mappings: vec![ButtonMapping {
                button_identifier: "A".to_string(),
                key_code: 0x00,
                modifier: KeyModifier::None,
            }],
            axis_mappings: Vec::new(),
            version: CURRENT_PROFILE_VERSION.to_string(),
        };
        profile.save_to_file(&path).unwrap();
        let loaded = Profile::load_from_file(&path).unwrap();
        assert_eq!(profile, loaded);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = std::env::temp_dir().join("padbridge-profile-version-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("p.json");
        fs::write(&path, r#"{"name":"p","device_id":null,"button_mappings":[],"version":"0.1"}"#).unwrap();

        let err = Profile::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Profile(ProfileError::VersionMismatch(_))));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_not_found() {
        let path = std::env::temp_dir().join("padbridge-profile-does-not-exist.json");
        let err = Profile::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Profile(ProfileError::NotFound)));
    }
}
