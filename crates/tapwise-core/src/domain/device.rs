//! Pointing-device identity and classification.
//!
//! Classification is a best-effort heuristic over the metadata the HID
//! subsystem reports. It is ordered and deterministic but not authoritative:
//! unusual devices can be misclassified, which is why callers may supply an
//! explicit per-device override table.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// USB vendor id assigned to Apple.
pub const APPLE_USB_VENDOR_ID: u32 = 0x05AC;

/// Bluetooth SIG company id for Apple, reported by Bluetooth accessories.
pub const APPLE_BLUETOOTH_VENDOR_ID: u32 = 0x004C;

/// Coarse device categories that drive per-device behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    Mouse,
    Trackpad,
    MagicMouse,
    Keyboard,
    Unknown,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Mouse => "mouse",
            DeviceType::Trackpad => "trackpad",
            DeviceType::MagicMouse => "magicMouse",
            DeviceType::Keyboard => "keyboard",
            DeviceType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Stable device identifier derived from vendor, product and location.
///
/// Formatted as `vvvv:pppp:llllllll` in lowercase hex so that it can be used
/// directly as a key in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn from_parts(vendor_id: u32, product_id: u32, location_id: u32) -> Self {
        Self(format!("{vendor_id:04x}:{product_id:04x}:{location_id:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_ascii_lowercase())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw metadata reported by the HID subsystem for a newly attached device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    pub vendor_id: u32,
    pub product_id: u32,
    pub location_id: u32,
    pub product_name: String,
    pub transport: String,
    pub is_builtin: bool,
}

impl DeviceDescriptor {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::from_parts(self.vendor_id, self.product_id, self.location_id)
    }
}

/// A classified device as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub device_type: DeviceType,
    pub vendor_id: u32,
    pub product_id: u32,
    pub display_name: String,
    pub is_builtin: bool,
    /// `false` once the device has been unplugged. Disconnected devices are
    /// retained so that their settings survive a replug.
    pub connected: bool,
}

impl Device {
    /// Builds a connected device from its descriptor, applying `overrides`
    /// before the classification heuristic.
    pub fn from_descriptor(desc: &DeviceDescriptor, overrides: &HashMap<DeviceId, DeviceType>) -> Self {
        let id = desc.device_id();
        let device_type = overrides
            .get(&id)
            .copied()
            .unwrap_or_else(|| classify_device(desc));
        Self {
            id,
            device_type,
            vendor_id: desc.vendor_id,
            product_id: desc.product_id,
            display_name: desc.product_name.clone(),
            is_builtin: desc.is_builtin,
            connected: true,
        }
    }
}

/// Known Apple product ids.
fn lookup_known_product(vendor_id: u32, product_id: u32) -> Option<DeviceType> {
    if vendor_id != APPLE_USB_VENDOR_ID && vendor_id != APPLE_BLUETOOTH_VENDOR_ID {
        return None;
    }
    match product_id {
        0x030D | 0x0269 => Some(DeviceType::MagicMouse),
        0x030E | 0x0265 => Some(DeviceType::Trackpad),
        0x0267 => Some(DeviceType::Keyboard),
        _ => None,
    }
}

/// Classifies a device in fixed order:
///
/// 1. vendor/product table
/// 2. product-name substrings
/// 3. built-in devices are trackpads
/// 4. anything else is a mouse
pub fn classify_device(desc: &DeviceDescriptor) -> DeviceType {
    if let Some(known) = lookup_known_product(desc.vendor_id, desc.product_id) {
        return known;
    }

    let name = desc.product_name.to_lowercase();
    if name.contains("magic mouse") {
        return DeviceType::MagicMouse;
    }
    if name.contains("trackpad") {
        return DeviceType::Trackpad;
    }
    if name.contains("keyboard") {
        return DeviceType::Keyboard;
    }
    if name.contains("mouse") {
        return DeviceType::Mouse;
    }

    if desc.is_builtin {
        return DeviceType::Trackpad;
    }
    DeviceType::Mouse
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(vendor: u32, product: u32, name: &str, builtin: bool) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: vendor,
            product_id: product,
            location_id: 0x1420_0000,
            product_name: name.to_string(),
            transport: "USB".to_string(),
            is_builtin: builtin,
        }
    }

    #[test]
    fn test_device_id_is_lowercase_hex_triplet() {
        let id = DeviceId::from_parts(0x05AC, 0x0269, 0x1420_0000);
        assert_eq!(id.as_str(), "05ac:0269:14200000");
    }

    #[test]
    fn test_device_id_from_str_normalizes_case() {
        assert_eq!(DeviceId::from("05AC:0269:14200000"), DeviceId::from_parts(0x5ac, 0x269, 0x1420_0000));
    }

    #[test]
    fn test_classify_uses_product_table_before_name() {
        // Table says Magic Mouse even though the name says trackpad.
        let desc = descriptor(APPLE_BLUETOOTH_VENDOR_ID, 0x0269, "Trackpad-ish", false);
        assert_eq!(classify_device(&desc), DeviceType::MagicMouse);
    }

    #[test]
    fn test_classify_magic_trackpad_by_table() {
        let desc = descriptor(APPLE_USB_VENDOR_ID, 0x0265, "", false);
        assert_eq!(classify_device(&desc), DeviceType::Trackpad);
    }

    #[test]
    fn test_classify_by_name_substring() {
        assert_eq!(classify_device(&descriptor(0x046D, 0xC52B, "USB Trackpad", false)), DeviceType::Trackpad);
        assert_eq!(classify_device(&descriptor(0x046D, 0xC52B, "MX Master 3 Mouse", false)), DeviceType::Mouse);
        assert_eq!(classify_device(&descriptor(0x1234, 0x0001, "Magic Mouse", false)), DeviceType::MagicMouse);
    }

    #[test]
    fn test_classify_builtin_without_hints_is_trackpad() {
        let desc = descriptor(APPLE_USB_VENDOR_ID, 0x0343, "Apple Internal Keyboard / Trackpad", true);
        // The name mentions "trackpad" before "keyboard" is considered.
        assert_eq!(classify_device(&desc), DeviceType::Trackpad);

        let anonymous = descriptor(APPLE_USB_VENDOR_ID, 0x0343, "", true);
        assert_eq!(classify_device(&anonymous), DeviceType::Trackpad);
    }

    #[test]
    fn test_classify_falls_back_to_mouse() {
        let desc = descriptor(0x093A, 0x2510, "USB OPTICAL", false);
        assert_eq!(classify_device(&desc), DeviceType::Mouse);
    }

    #[test]
    fn test_from_descriptor_applies_override_first() {
        // Arrange
        let desc = descriptor(0x093A, 0x2510, "USB OPTICAL", false);
        let mut overrides = HashMap::new();
        overrides.insert(desc.device_id(), DeviceType::Trackpad);

        // Act
        let device = Device::from_descriptor(&desc, &overrides);

        // Assert
        assert_eq!(device.device_type, DeviceType::Trackpad);
        assert!(device.connected);
        assert_eq!(device.display_name, "USB OPTICAL");
    }

    #[test]
    fn test_device_type_serializes_camel_case() {
        #[derive(Serialize)]
        struct Wrapper {
            kind: DeviceType,
        }
        let text = toml::to_string(&Wrapper { kind: DeviceType::MagicMouse }).expect("serialize");
        assert_eq!(text.trim(), "kind = \"magicMouse\"");
    }
}
