//! SmartVent wire protocol
//!
//! Everything that crosses a boundary lives here: the BLE GATT layout used to
//! provision an un-networked vent, the provisioning payload codec, and the
//! JSON bodies spoken by the device's HTTP control plane once it has joined
//! the network.

pub mod address;
pub mod ble;
pub mod codec;
pub mod window;

pub use address::{AddressParseError, ServerAddress};
pub use codec::{
    CharacteristicValue, CodecError, ProvisioningPayload, Thresholds, decode_address,
    decode_text, encode_payload,
};
pub use window::{ControlRequest, ControlResponse, DeviceState, ThresholdSet, WindowAction};

/// TCP port of the device control plane
pub const HTTP_PORT: u16 = 3001;

/// `GET` returns the current [`DeviceState`]
pub const STATUS_PATH: &str = "/api/window/status";

/// `POST` a [`ControlRequest`], answered with a [`ControlResponse`]
pub const CONTROL_PATH: &str = "/api/window/control";
