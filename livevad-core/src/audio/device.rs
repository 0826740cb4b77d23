//! Audio input device enumeration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Device name reported by the OS.
    pub name: String,
    pub is_default: bool,
}

/// List available input devices, the system default first.
///
/// Returns an empty `Vec` if cpal is not compiled in or enumeration fails.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            return Vec::new();
        }
    };

    let mut list: Vec<DeviceInfo> = devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            let is_default = default_name.as_deref() == Some(name.as_str());
            DeviceInfo { name, is_default }
        })
        .collect();
    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Default device first, then by case-insensitive name.
pub fn sort_devices(list: &mut [DeviceInfo]) {
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// Case-insensitive exact match first, then substring match.
pub fn match_device_name<'a>(names: &'a [String], wanted: &str) -> Option<&'a str> {
    let wanted = wanted.trim().to_ascii_lowercase();
    if wanted.is_empty() {
        return None;
    }
    names
        .iter()
        .find(|n| n.to_ascii_lowercase() == wanted)
        .or_else(|| names.iter().find(|n| n.to_ascii_lowercase().contains(&wanted)))
        .map(String::as_str)
}
