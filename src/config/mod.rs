//! `ConfigStore`: loaded device configurations, matched by (VID, PID)
//! with priority ordering (§4.1, §6).

pub mod preprocess;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device_id::DeviceId;
use crate::error::{ConfigError, Error, ParseError, Result};
use crate::protocol::common::{Deadzones, ProtocolFamily};
use crate::protocol::generic_hid::{validate_descriptor, ReportDescriptor};

const CONFIG_SCHEMA_VERSION: &str = "1.0";

/// One `initialization` step (§6). Field names mirror the on-disk
/// `camelCase` JSON shape via `serde(rename_all)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InitStep {
    Control {
        #[serde(rename = "requestType")]
        request_type: u8,
        request: u8,
        #[serde(default)]
        value: u16,
        #[serde(default)]
        index: u16,
        #[serde(default, rename = "dataBytes")]
        data_bytes: Vec<u8>,
        #[serde(default = "InitStep::default_timeout_ms", rename = "timeoutMs")]
        timeout_ms: u32,
    },
    Interrupt {
        endpoint: u8,
        #[serde(default, rename = "dataBytes")]
        data_bytes: Vec<u8>,
        #[serde(default = "InitStep::default_timeout_ms", rename = "timeoutMs")]
        timeout_ms: u32,
    },
    Bulk {
        endpoint: u8,
        #[serde(default, rename = "dataBytes")]
        data_bytes: Vec<u8>,
        #[serde(default = "InitStep::default_timeout_ms", rename = "timeoutMs")]
        timeout_ms: u32,
    },
    /// Auto-routes to the discovered GIP OUT endpoint; no endpoint field.
    Gip {
        #[serde(default, rename = "dataBytes")]
        data_bytes: Vec<u8>,
        #[serde(default = "InitStep::default_timeout_ms", rename = "timeoutMs")]
        timeout_ms: u32,
    },
    Delay {
        #[serde(rename = "delayMs")]
        delay_ms: u32,
    },
}

impl InitStep {
    fn default_timeout_ms() -> u32 {
        2_000
    }
}

/// A named quirk toggle with optional parameters, e.g.
/// `{"name": "keepalive", "enabled": true, "parameters": {"packet": [...]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuirkEntry {
    pub name: String,
    #[serde(default = "QuirkEntry::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl QuirkEntry {
    fn default_enabled() -> bool {
        true
    }
}

/// The enabled subset of a configuration's quirks, resolved once at
/// load time for cheap lookup (§4.3 step 6).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quirks {
    pub keepalive: Option<Vec<u8>>,
    pub delay_after_init_ms: Option<u32>,
    pub vendor_specific_led: Option<Vec<u8>>,
    /// A single override threshold applied to all three deadzone groups
    /// (left stick, right stick, triggers). Folded into the loaded
    /// `DeviceConfiguration.deadzones` by `TryFrom` so parsers never have
    /// to consult `Quirks` directly; kept here too so the raw quirk value
    /// remains inspectable (§4.3 step 6).
    pub apply_deadzone: Option<f32>,
    /// Set when a `keepalive` quirk entry is present with `enabled: false`,
    /// i.e. an explicit opt-out rather than mere absence. `DeviceSession`
    /// uses this to distinguish "no opinion" from "vendor default
    /// suppressed" for GIP's implicit keepalive (§9 Open Question).
    pub keepalive_explicitly_disabled: bool,
}

impl Quirks {
    fn from_entries(entries: &[QuirkEntry]) -> Self {
        let mut quirks = Quirks::default();
        for entry in entries {
            if !entry.enabled {
                if entry.name == "keepalive" {
                    quirks.keepalive_explicitly_disabled = true;
                }
                continue;
            }
            match entry.name.as_str() {
                "keepalive" => {
                    quirks.keepalive = entry
                        .parameters
                        .get("packet")
                        .and_then(|v| v.as_array())
                        .map(|arr| arr.iter().filter_map(|b| b.as_u64()).map(|b| b as u8).collect())
                        .or_else(|| Some(Vec::new()));
                }
                "delay_after_init" => {
                    quirks.delay_after_init_ms =
                        entry.parameters.get("ms").and_then(|v| v.as_u64()).map(|v| v as u32);
                }
                "vendor_specific_led" => {
                    quirks.vendor_specific_led = entry
                        .parameters
                        .get("pattern")
                        .and_then(|v| v.as_array())
                        .map(|arr| arr.iter().filter_map(|b| b.as_u64()).map(|b| b as u8).collect())
                        .or_else(|| Some(Vec::new()));
                }
                "apply_deadzone" => {
                    quirks.apply_deadzone =
                        entry.parameters.get("value").and_then(|v| v.as_f64()).map(|v| v as f32);
                }
                // Unknown quirks are ignored (§4.3 step 6).
                _ => {}
            }
        }
        quirks
    }
}

/// Explicit endpoint override; absent fields fall back to runtime
/// discovery (§4.3 step 4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverride {
    #[serde(rename = "in")]
    pub input: Option<u8>,
    #[serde(rename = "out")]
    pub output: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDeviceConfiguration {
    #[serde(rename = "schemaVersion")]
    schema_version: String,
    #[serde(rename = "deviceId")]
    device_id: DeviceId,
    name: String,
    #[serde(rename = "protocolFamily")]
    protocol_family: ProtocolFamily,
    #[serde(default)]
    endpoints: Option<EndpointOverride>,
    #[serde(rename = "reportSize")]
    report_size: usize,
    initialization: Vec<InitStep>,
    #[serde(default)]
    deadzones: Option<Deadzones>,
    #[serde(default)]
    quirks: Vec<QuirkEntry>,
    #[serde(default = "RawDeviceConfiguration::default_priority")]
    priority: i32,
    #[serde(default, rename = "reportDescriptor")]
    report_descriptor: Option<ReportDescriptor>,
}

impl RawDeviceConfiguration {
    fn default_priority() -> i32 {
        0
    }
}

/// A fully loaded, immutable device configuration (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfiguration {
    pub device_id: DeviceId,
    pub name: String,
    pub protocol_family: ProtocolFamily,
    pub endpoints: Option<EndpointOverride>,
    pub report_size: usize,
    pub initialization: Vec<InitStep>,
    pub deadzones: Deadzones,
    pub quirks: Quirks,
    pub priority: i32,
    pub report_descriptor: Option<ReportDescriptor>,
}

impl TryFrom<RawDeviceConfiguration> for DeviceConfiguration {
    type Error = Error;

    fn try_from(raw: RawDeviceConfiguration) -> Result<Self> {
        if raw.schema_version != CONFIG_SCHEMA_VERSION {
            return Err(Error::Config(ConfigError::SchemaMismatch(raw.schema_version)));
        }
        if let Some(descriptor) = &raw.report_descriptor {
            if let Err(reason) = validate_descriptor(descriptor) {
                return Err(Error::Parse(ParseError::InvalidReportDescriptor(reason)));
            }
        }
        let mut deadzones = raw.deadzones.unwrap_or_default();
        let quirks = Quirks::from_entries(&raw.quirks);
        if let Some(value) = quirks.apply_deadzone {
            deadzones.left_stick = value;
            deadzones.right_stick = value;
            deadzones.triggers = value;
        }

        Ok(DeviceConfiguration {
            device_id: raw.device_id,
            name: raw.name,
            protocol_family: raw.protocol_family,
            endpoints: raw.endpoints,
            report_size: raw.report_size,
            initialization: raw.initialization,
            deadzones,
            quirks,
            priority: raw.priority,
            report_descriptor: raw.report_descriptor,
        })
    }
}

/// Optional controller index (§6): maps device identities to per-device
/// config file paths, enabled records sorted by descending priority.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerIndex {
    pub schema: String,
    pub version: String,
    pub controllers: Vec<ControllerIndexEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerIndexEntry {
    pub id: String,
    pub path: PathBuf,
    #[serde(rename = "vendorId")]
    pub vendor_id: u16,
    #[serde(rename = "productId")]
    pub product_id: u16,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "ControllerIndexEntry::default_enabled")]
    pub enabled: bool,
}

impl ControllerIndexEntry {
    fn default_enabled() -> bool {
        true
    }
}

/// Loaded, read-only-after-load set of device configurations (§4.1).
#[derive(Debug, Default)]
pub struct ConfigStore {
    configurations: Vec<DeviceConfiguration>,
}

impl ConfigStore {
    pub fn new(configurations: Vec<DeviceConfiguration>) -> Self {
        Self { configurations }
    }

    /// Reads every `*.json`/`*.jsonc` file directly under `dir`, tolerating
    /// comments and trailing commas in each.
    pub fn load_all(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            Error::Config(ConfigError::FileNotFound(format!("{}: {e}", dir.display())))
        })?;

        let mut configurations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Other(e.to_string()))?;
            let path = entry.path();
            let is_config = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "json" || ext == "jsonc")
                .unwrap_or(false);
            if !is_config {
                continue;
            }
            configurations.push(Self::load_file(&path)?);
        }

        if configurations.is_empty() {
            return Err(Error::Config(ConfigError::NoConfigurations));
        }
        Ok(Self::new(configurations))
    }

    pub fn load_file(path: &Path) -> Result<DeviceConfiguration> {
        let raw_text = fs::read_to_string(path)
            .map_err(|e| Error::Config(ConfigError::FileNotFound(format!("{}: {e}", path.display()))))?;
        let text = preprocess::strip_jsonc(&raw_text);
        let raw: RawDeviceConfiguration = serde_json::from_str(&text)
            .map_err(|e| Error::Config(ConfigError::InvalidJson(e.to_string())))?;
        DeviceConfiguration::try_from(raw)
    }

    /// The enabled match with the highest `priority` for `(vendor_id, product_id)`.
    pub fn lookup(&self, vendor_id: u16, product_id: u16) -> Option<&DeviceConfiguration> {
        self.configurations
            .iter()
            .filter(|cfg| cfg.device_id.vendor_id == vendor_id && cfg.device_id.product_id == product_id)
            .max_by_key(|cfg| cfg.priority)
    }

    /// Alias used by the session (§4.1).
    pub fn best(&self, vendor_id: u16, product_id: u16) -> Option<&DeviceConfiguration> {
        self.lookup(vendor_id, product_id)
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}

/// Index of `DeviceId -> priority` pulled from an optional controller
/// index file, for environments that split configs into many small files.
pub fn enabled_index_by_priority(index: &ControllerIndex) -> HashMap<DeviceId, i32> {
    index
        .controllers
        .iter()
        .filter(|entry| entry.enabled)
        .map(|entry| (DeviceId::new(entry.vendor_id, entry.product_id), entry.priority))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(priority: i32) -> String {
        format!(
            r#"{{
                // a device configuration
                "schemaVersion": "1.0",
                "deviceId": {{"vendorId": 1118, "productId": 746}},
                "name": "Xbox Series Controller",
                "protocolFamily": "GIP",
                "reportSize": 19,
                "initialization": [
                    {{"type": "delay", "delayMs": 50}},
                ],
                "quirks": [
                    {{"name": "keepalive", "enabled": true, "parameters": {{"packet": [1, 2]}}}},
                ],
                "priority": {priority},
            }}"#
        )
    }

    #[test]
    fn load_file_strips_comments_and_parses() {
        let dir = std::env::temp_dir().join(format!("padbridge-config-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device.jsonc");
        fs::write(&path, sample_json(5)).unwrap();

        let cfg = ConfigStore::load_file(&path).unwrap();
        assert_eq!(cfg.device_id, DeviceId::new(1118, 746));
        assert_eq!(cfg.report_size, 19);
        assert_eq!(cfg.quirks.keepalive, Some(vec![1, 2]));
        assert_eq!(cfg.priority, 5);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn lookup_picks_highest_priority_match() {
        let low = DeviceConfiguration::try_from(
            serde_json::from_str::<RawDeviceConfiguration>(&preprocess::strip_jsonc(&sample_json(1))).unwrap(),
        )
        .unwrap();
        let high = DeviceConfiguration::try_from(
            serde_json::from_str::<RawDeviceConfiguration>(&preprocess::strip_jsonc(&sample_json(9))).unwrap(),
        )
        .unwrap();
        let store = ConfigStore::new(vec![low, high.clone()]);
        assert_eq!(store.best(1118, 746), Some(&high));
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let text = r#"{
            "schemaVersion": "0.1",
            "deviceId": {"vendorId": 1, "productId": 2},
            "name": "n",
            "protocolFamily": "GIP",
            "reportSize": 10,
            "initialization": []
        }"#;
        let raw: RawDeviceConfiguration = serde_json::from_str(text).unwrap();
        let err = DeviceConfiguration::try_from(raw).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::SchemaMismatch(_))));
    }

    #[test]
    fn apply_deadzone_quirk_overrides_configured_deadzones() {
        let text = r#"{
            "schemaVersion": "1.0",
            "deviceId": {"vendorId": 1, "productId": 2},
            "name": "n",
            "protocolFamily": "GIP",
            "reportSize": 10,
            "initialization": [],
            "deadzones": {"left_stick": 0.24, "right_stick": 0.27, "triggers": 0.0},
            "quirks": [
                {"name": "apply_deadzone", "enabled": true, "parameters": {"value": 0.5}}
            ]
        }"#;
        let raw: RawDeviceConfiguration = serde_json::from_str(text).unwrap();
        let cfg = DeviceConfiguration::try_from(raw).unwrap();

        assert_eq!(cfg.quirks.apply_deadzone, Some(0.5));
        assert_eq!(cfg.deadzones.left_stick, 0.5);
        assert_eq!(cfg.deadzones.right_stick, 0.5);
        assert_eq!(cfg.deadzones.triggers, 0.5);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let err = ConfigStore::load_all(Path::new("/does/not/exist/padbridge")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn unrecognized_report_descriptor_field_is_rejected() {
        let text = r#"{
            "schemaVersion": "1.0",
            "deviceId": {"vendorId": 1, "productId": 2},
            "name": "n",
            "protocolFamily": "GenericHID",
            "reportSize": 10,
            "initialization": [],
            "reportDescriptor": {
                "axisFields": [{"byteOffset": 0, "size": 1, "axis": "NotAnAxis"}],
                "buttonFields": []
            }
        }"#;
        let raw: RawDeviceConfiguration = serde_json::from_str(text).unwrap();
        let err = DeviceConfiguration::try_from(raw).unwrap_err();
        assert!(matches!(err, Error::Parse(crate::error::ParseError::InvalidReportDescriptor(_))));
        assert!(!err.user_message().is_retryable);
    }
}
