//! JSON bodies of the HTTP control plane

use serde::{Deserialize, Serialize};

/// Thresholds as reported in a status body.
///
/// Every field is optional: the relay server omits all of them and older
/// firmware omits `aqiMin`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(rename = "tMax", default, skip_serializing_if = "Option::is_none")]
    pub temp_max: Option<f64>,
    #[serde(rename = "tMin", default, skip_serializing_if = "Option::is_none")]
    pub temp_min: Option<f64>,
    #[serde(rename = "aqiMax", default, skip_serializing_if = "Option::is_none")]
    pub aqi_max: Option<i32>,
    #[serde(rename = "aqiMin", default, skip_serializing_if = "Option::is_none")]
    pub aqi_min: Option<i32>,
}

/// Authoritative state of the vent, as the device reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// `targetAngle > 0` on the device side
    pub is_open: bool,
    #[serde(rename = "temp")]
    pub temperature: f64,
    pub aqi: i32,
    /// 0 (closed) to 90 (fully open)
    pub target_angle: i32,
    pub auto_mode: bool,
    #[serde(default)]
    pub safety_lockout: bool,
    #[serde(default)]
    pub current_load: f64,
    #[serde(flatten)]
    pub thresholds: ThresholdSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAction {
    Open,
    Close,
}

/// Body of `POST /api/window/control`; absent fields are left untouched
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<WindowAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_safety: Option<bool>,
    #[serde(flatten)]
    pub thresholds: ThresholdSet,
}

impl ControlRequest {
    /// Open or close, leaving automatic mode
    pub fn action(action: WindowAction) -> Self {
        Self {
            action: Some(action),
            auto_mode: Some(false),
            ..Self::default()
        }
    }

    /// Move to `angle` degrees, leaving automatic mode
    pub fn angle(angle: i32) -> Self {
        Self {
            angle: Some(angle),
            auto_mode: Some(false),
            ..Self::default()
        }
    }

    pub fn auto_mode(enabled: bool) -> Self {
        Self {
            auto_mode: Some(enabled),
            ..Self::default()
        }
    }

    pub fn reset_safety() -> Self {
        Self {
            reset_safety: Some(true),
            ..Self::default()
        }
    }

    pub fn thresholds(thresholds: ThresholdSet) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }
}

/// Reply to a control request. `state` is absent on devices that only
/// acknowledge; the caller then has to read the status itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DeviceState>,
}
