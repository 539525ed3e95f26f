//! Provisioning payload codec
//!
//! The configuration characteristic carries one line of UTF-8 text:
//!
//! ```text
//! ssid;password;lat;lon[;ipOverride][;tempMax;tempMin;aqiMax;aqiMin]
//! ```
//!
//! Characteristic values are handled in their binary-safe (base64) form,
//! [`CharacteristicValue`]; the radio backend turns them into raw bytes at the
//! last moment. Field contents are not validated here: a field containing the
//! delimiter produces a malformed payload, not an error.

use data_encoding::BASE64;

use crate::ble::DELIMITER;

/// Operating thresholds pushed with the network configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub temp_max: f64,
    pub temp_min: f64,
    pub aqi_max: i32,
    pub aqi_min: i32,
}

/// Everything the vent needs to join the network and run unattended
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProvisioningPayload {
    pub ssid: String,
    pub password: String,
    /// Decimal degrees, kept as entered
    pub latitude: String,
    pub longitude: String,
    pub address_override: Option<String>,
    pub thresholds: Option<Thresholds>,
}

impl ProvisioningPayload {
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
            address_override: None,
            thresholds: None,
        }
    }

    pub fn with_address_override(mut self, address: impl Into<String>) -> Self {
        self.address_override = Some(address.into());
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// The delimiter-joined text, before transport encoding
    pub fn to_wire_string(&self) -> String {
        let mut fields = vec![
            self.ssid.clone(),
            self.password.clone(),
            self.latitude.clone(),
            self.longitude.clone(),
        ];
        if let Some(address) = &self.address_override {
            fields.push(address.clone());
        }
        if let Some(t) = &self.thresholds {
            fields.push(t.temp_max.to_string());
            fields.push(t.temp_min.to_string());
            fields.push(t.aqi_max.to_string());
            fields.push(t.aqi_min.to_string());
        }
        fields.join(&DELIMITER.to_string())
    }
}

/// A characteristic value in its base64 transport form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicValue(String);

impl CharacteristicValue {
    /// Wrap a value that is already base64 encoded
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encode raw bytes as read from the radio
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self(BASE64.encode(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes to put on the air
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(BASE64.decode(self.0.as_bytes())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 value: {0}")]
    Encoding(#[from] data_encoding::DecodeError),
    #[error("value is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn encode_payload(payload: &ProvisioningPayload) -> CharacteristicValue {
    CharacteristicValue::from_bytes(payload.to_wire_string().as_bytes())
}

/// Reverse the transport encoding of a text characteristic
pub fn decode_text(value: &CharacteristicValue) -> Result<String, CodecError> {
    Ok(String::from_utf8(value.to_bytes()?)?)
}

/// Recover the dotted-quad the device reports.
///
/// Firmware may pad the characteristic with NULs or a trailing newline; those
/// are stripped. The sentinel `0.0.0.0` comes back unchanged.
pub fn decode_address(value: &CharacteristicValue) -> Result<String, CodecError> {
    let text = decode_text(value)?;
    Ok(text.trim_end_matches('\0').trim().to_string())
}
