//! BLE GATT layout of the provisioning service
//!
//! The vent advertises under a fixed name and exposes one primary service with
//! two characteristics: a confirmed-write configuration characteristic and a
//! readable characteristic carrying the address it obtained on the network.

use uuid::Uuid;

/// Advertised name the scanner matches exactly
pub const DEVICE_NAME: &str = "ESP32_SmartWindow";

/// Primary provisioning service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Configuration characteristic (write with response)
pub const CONFIG_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Network address characteristic (read)
pub const ADDRESS_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_1234567890ab);

/// Separator between provisioning payload fields
pub const DELIMITER: char = ';';
