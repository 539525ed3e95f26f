//! Control-plane client
//!
//! Every mutating operation goes through [`ControlClient::reconcile`]: post
//! the request, then trust the state the device sends back, or read the
//! status if it sent none. Nothing is applied to the [`StateStore`] before the
//! device has answered.
//!
//! Mutating operations resolve to `Ok(None)` when the device accepted the
//! request but the follow-up status read failed: the command took effect, only
//! the new state is unknown.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use smartvent_proto::{
    CONTROL_PATH, ControlRequest, ControlResponse, DeviceState, HTTP_PORT, STATUS_PATH,
    ServerAddress, ThresholdSet, WindowAction,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::http::{self, HttpClient};
use crate::{ControlError, StateStore};

/// A message the user has to see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// The device could not be reached at the configured address
    Unreachable,
    CommandFailed {
        action: &'static str,
        reason: String,
    },
    /// Raised after every successful safety reset
    SafetyReset,
    ThresholdsSaved,
    ThresholdsFailed(String),
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::Unreachable => write!(f, "Can't reach the device. Check the address."),
            Advisory::CommandFailed { action, reason } => write!(f, "{action} failed: {reason}"),
            Advisory::SafetyReset => write!(
                f,
                "Safety lockout reset. Make sure nothing is blocking the window."
            ),
            Advisory::ThresholdsSaved => write!(f, "Thresholds saved"),
            Advisory::ThresholdsFailed(reason) => {
                write!(f, "Failed to save thresholds: {reason}")
            }
        }
    }
}

pub struct ControlClient {
    address: ServerAddress,
    port: u16,
    http: HttpClient,
    store: StateStore,
    advisories: mpsc::UnboundedSender<Advisory>,
    saving: AtomicBool,
    request_timeout: Duration,
}

impl ControlClient {
    /// Client for the device at `address`. Advisories arrive on the returned
    /// receiver.
    pub fn new(
        address: ServerAddress,
        store: StateStore,
    ) -> (Self, mpsc::UnboundedReceiver<Advisory>) {
        let (advisories, rx) = mpsc::unbounded_channel();
        let client = Self {
            address,
            port: HTTP_PORT,
            http: http::client(),
            store,
            advisories,
            saving: AtomicBool::new(false),
            request_timeout: Duration::from_secs(10),
        };
        (client, rx)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn address(&self) -> ServerAddress {
        self.address
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Whether a threshold update is in flight
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Best-effort status refresh: failures are logged, the store is left as is
    pub async fn fetch_state(&self) -> Result<DeviceState, ControlError> {
        match self.get_state().await {
            Ok(state) => {
                self.store.replace(state.clone());
                Ok(state)
            }
            Err(e) => {
                warn!("status refresh failed: {e}");
                Err(e)
            }
        }
    }

    pub async fn send_command(
        &self,
        action: WindowAction,
    ) -> Result<Option<DeviceState>, ControlError> {
        let label = match action {
            WindowAction::Open => "Open",
            WindowAction::Close => "Close",
        };
        self.dispatch(label, ControlRequest::action(action)).await
    }

    /// Move to `angle` degrees, rounded to the nearest whole degree. Range
    /// clamping is left to the device.
    pub async fn send_angle(&self, angle: f64) -> Result<Option<DeviceState>, ControlError> {
        if !angle.is_finite() {
            return Err(ControlError::Validation {
                field: "angle",
                value: angle.to_string(),
            });
        }
        self.dispatch("Move", ControlRequest::angle(angle.round() as i32)).await
    }

    pub async fn toggle_auto_mode(
        &self,
        enabled: bool,
    ) -> Result<Option<DeviceState>, ControlError> {
        self.dispatch("Auto mode", ControlRequest::auto_mode(enabled)).await
    }

    pub async fn reset_safety_lockout(&self) -> Result<Option<DeviceState>, ControlError> {
        let state = self
            .dispatch("Safety reset", ControlRequest::reset_safety())
            .await?;
        self.advise(Advisory::SafetyReset);
        Ok(state)
    }

    /// Push new operating thresholds. All four values must be numbers; nothing
    /// is sent otherwise.
    pub async fn update_thresholds(
        &self,
        temp_max: &str,
        temp_min: &str,
        aqi_max: &str,
        aqi_min: &str,
    ) -> Result<Option<DeviceState>, ControlError> {
        let thresholds = ThresholdSet {
            temp_max: Some(number("tMax", temp_max)?),
            temp_min: Some(number("tMin", temp_min)?),
            aqi_max: Some(number("aqiMax", aqi_max)?.round() as i32),
            aqi_min: Some(number("aqiMin", aqi_min)?.round() as i32),
        };

        let _saving = Saving::start(&self.saving);
        info!(?thresholds, "updating thresholds");
        match self.reconcile(&ControlRequest::thresholds(thresholds)).await {
            Ok(state) => {
                self.advise(Advisory::ThresholdsSaved);
                Ok(state)
            }
            Err(e) => {
                warn!("threshold update failed: {e}");
                self.advise(Advisory::ThresholdsFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn get_state(&self) -> Result<DeviceState, ControlError> {
        let uri = self.uri(STATUS_PATH)?;
        self.timed(http::get_json(&self.http, uri)).await
    }

    async fn dispatch(
        &self,
        action: &'static str,
        request: ControlRequest,
    ) -> Result<Option<DeviceState>, ControlError> {
        info!(action, "sending control request");
        self.reconcile(&request).await.inspect_err(|e| {
            warn!(action, "control request failed: {e}");
            self.advise(if e.is_connectivity() {
                Advisory::Unreachable
            } else {
                Advisory::CommandFailed {
                    action,
                    reason: e.to_string(),
                }
            });
        })
    }

    /// Post `request`; the device's answer replaces the store. A bare
    /// acknowledgement triggers a status read instead, whose failure leaves
    /// the request accepted.
    async fn reconcile(
        &self,
        request: &ControlRequest,
    ) -> Result<Option<DeviceState>, ControlError> {
        let uri = self.uri(CONTROL_PATH)?;
        let response: ControlResponse = self
            .timed(http::post_json(&self.http, uri, request))
            .await?;

        match response.state {
            Some(state) => {
                self.store.replace(state.clone());
                Ok(Some(state))
            }
            None if response.success => Ok(self.fetch_state().await.ok()),
            None => Err(ControlError::Rejected),
        }
    }

    fn uri(&self, path: &str) -> Result<hyper::Uri, ControlError> {
        let ip = self.address.ip().ok_or(ControlError::AddressUnknown)?;
        format!("http://{ip}:{}{path}", self.port)
            .parse::<hyper::Uri>()
            .map_err(|e| ControlError::Request(e.into()))
    }

    async fn timed<T>(
        &self,
        request: impl Future<Output = Result<T, ControlError>>,
    ) -> Result<T, ControlError> {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| ControlError::Network("request timed out".to_string()))?
    }

    fn advise(&self, advisory: Advisory) {
        // nobody listening is fine
        let _ = self.advisories.send(advisory);
    }
}

fn number(field: &'static str, value: &str) -> Result<f64, ControlError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ControlError::Validation {
            field,
            value: value.to_string(),
        })
}

/// Holds the in-flight flag until dropped
struct Saving<'a>(&'a AtomicBool);

impl<'a> Saving<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Saving(flag)
    }
}

impl Drop for Saving<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_must_be_finite() {
        assert_eq!(number("tMax", " 27.5 ").unwrap(), 27.5);
        assert!(matches!(
            number("tMax", "NaN"),
            Err(ControlError::Validation { field: "tMax", .. })
        ));
        assert!(number("aqiMin", "").is_err());
    }

    #[tokio::test]
    async fn sentinel_address_sends_nothing() {
        let (client, mut advisories) =
            ControlClient::new(ServerAddress::UNKNOWN, StateStore::new());

        assert!(matches!(
            client.fetch_state().await,
            Err(ControlError::AddressUnknown)
        ));
        assert!(advisories.try_recv().is_err());

        assert!(matches!(
            client.send_command(WindowAction::Open).await,
            Err(ControlError::AddressUnknown)
        ));
        assert_eq!(advisories.try_recv().unwrap(), Advisory::Unreachable);
        assert_eq!(client.store().current(), None);
    }

    #[tokio::test]
    async fn non_finite_angle_is_rejected() {
        let (client, _advisories) =
            ControlClient::new("10.0.0.7".parse().unwrap(), StateStore::new());
        assert!(matches!(
            client.send_angle(f64::NAN).await,
            Err(ControlError::Validation { field: "angle", .. })
        ));
    }

    #[test]
    fn advisory_text() {
        assert_eq!(
            Advisory::CommandFailed {
                action: "Open",
                reason: "device answered HTTP 500".to_string(),
            }
            .to_string(),
            "Open failed: device answered HTTP 500"
        );
    }
}
