//! Provisioning facade
//!
//! The entry point the application talks to. Wraps the [`Orchestrator`] with
//! input validation and status text, and composes the full handoff: write the
//! configuration, give the device time to reboot onto the network, then read
//! back the address it was given.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use smartvent_proto::{ProvisioningPayload, ServerAddress};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::session::{Orchestrator, Outcome, Phase, SessionConfig, SessionError, Stage};
use crate::transport::Radio;

const JOINING: &str = "Joining Wi-Fi network...";
const NOT_JOINED: &str = "Device has not joined the network yet";

#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub session: SessionConfig,
    /// Time the device gets to reboot and join the network after a write
    pub reboot_delay: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            reboot_delay: Duration::from_secs(5),
        }
    }
}

/// Rejected user input; no radio operation was started
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("Network name is empty")]
    EmptySsid,
    #[error("Invalid {field}: {value:?}")]
    NotANumber { field: &'static str, value: String },
    #[error("Invalid address override: {0:?}")]
    InvalidAddress(String),
    #[error("Threshold {field} must be a finite number")]
    NonFiniteThreshold { field: &'static str },
}

/// Why a successful configure did not end with a usable address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressIssue {
    /// The device still reports `0.0.0.0`
    Sentinel,
    Malformed(String),
    Session(SessionError),
}

/// Result of [`Provisioner::configure_device`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// Another session was active; nothing happened
    Busy,
    Invalid(ProvisionError),
    Failed(SessionError),
    /// The configuration was written but the device is not reachable yet
    AddressUnavailable(AddressIssue),
    /// The device joined the network; the control plane can take over
    Ready(ServerAddress),
}

pub struct Provisioner<R> {
    orchestrator: Orchestrator<R>,
    reboot_delay: Duration,
    /// Held for a whole configure-wait-read composition
    composing: AtomicBool,
    /// Overrides the phase-derived status text
    notice: watch::Sender<Option<String>>,
}

impl<R: Radio> Provisioner<R> {
    pub fn new(radio: R, config: ProvisionerConfig) -> Self {
        let (notice, _) = watch::channel(None);
        Self {
            orchestrator: Orchestrator::new(radio, config.session),
            reboot_delay: config.reboot_delay,
            composing: AtomicBool::new(false),
            notice,
        }
    }

    /// Configure the device, then read back its address.
    ///
    /// The read-back runs exactly once, after the reboot delay, and only if
    /// the write succeeded.
    pub async fn configure_device(&self, payload: &ProvisioningPayload) -> Handoff {
        let Some(_latch) = Latch::acquire(&self.composing) else {
            info!("provisioning already in progress, request dropped");
            return Handoff::Busy;
        };

        if let Err(e) = validate(payload) {
            warn!("rejected provisioning input: {e}");
            self.notice.send_replace(Some(e.to_string()));
            return Handoff::Invalid(e);
        }
        self.notice.send_replace(None);

        match self.orchestrator.configure(payload).await {
            None => return Handoff::Busy,
            Some(Err(e)) => return Handoff::Failed(e),
            Some(Ok(_)) => {}
        }

        info!(delay = ?self.reboot_delay, "waiting for device to join the network");
        self.notice.send_replace(Some(JOINING.to_string()));
        tokio::time::sleep(self.reboot_delay).await;
        self.notice.send_replace(None);

        let raw = match self.orchestrator.read_address().await {
            None => return Handoff::Busy,
            Some(Err(e)) => return Handoff::AddressUnavailable(AddressIssue::Session(e)),
            Some(Ok(outcome)) => outcome.address().unwrap_or_default().to_string(),
        };

        match raw.parse::<ServerAddress>() {
            Ok(address) if address.is_unknown() => {
                warn!("device reported no address after configuration");
                self.notice.send_replace(Some(NOT_JOINED.to_string()));
                Handoff::AddressUnavailable(AddressIssue::Sentinel)
            }
            Ok(address) => {
                info!(%address, "device joined the network");
                Handoff::Ready(address)
            }
            Err(_) => {
                warn!(%raw, "device reported a malformed address");
                self.notice
                    .send_replace(Some(format!("Unexpected address: {raw:?}")));
                Handoff::AddressUnavailable(AddressIssue::Malformed(raw))
            }
        }
    }

    /// One address read-back session. `None` when busy.
    pub async fn fetch_device_address(&self) -> Option<Result<String, SessionError>> {
        let _latch = Latch::acquire(&self.composing)?;
        self.notice.send_replace(None);
        self.orchestrator.read_address().await.map(|result| {
            result.map(|outcome| outcome.address().unwrap_or_default().to_string())
        })
    }

    pub fn is_busy(&self) -> bool {
        self.composing.load(Ordering::Acquire) || self.orchestrator.is_busy()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.orchestrator.subscribe()
    }

    /// Status overrides that are not session phases, such as the reboot wait
    pub fn subscribe_notices(&self) -> watch::Receiver<Option<String>> {
        self.notice.subscribe()
    }

    /// One line for the user
    pub fn status(&self) -> String {
        if let Some(notice) = self.notice.borrow().as_ref() {
            return notice.clone();
        }
        describe(&self.orchestrator.phase())
    }
}

/// Status line for a session phase
pub fn describe(phase: &Phase) -> String {
    match phase {
        Phase::Idle => "Idle".to_string(),
        Phase::Active(stage) => match stage {
            Stage::Scanning => "Searching for device...",
            Stage::Connecting => "Connecting...",
            Stage::NegotiatingCapabilities => "Discovering services...",
            Stage::WritingPayload => "Sending configuration...",
            Stage::ReadingAddress => "Reading address...",
            Stage::ClosingAfterWrite | Stage::ClosingAfterRead => "Closing connection...",
        }
        .to_string(),
        Phase::Succeeded(Outcome::Configured) => "Configuration sent".to_string(),
        Phase::Succeeded(Outcome::Address(address)) => format!("Address found: {address}"),
        Phase::Failed(e) => describe_failure(e),
    }
}

fn describe_failure(e: &SessionError) -> String {
    match e {
        SessionError::Timeout {
            during: Stage::Scanning,
        } => "No device found".to_string(),
        SessionError::Timeout { during } => format!("Timed out while {during}"),
        SessionError::Transport { during, source } => match during {
            Stage::Scanning => format!("Scan failed: {source}"),
            Stage::Connecting => format!("Connection failed: {source}"),
            Stage::NegotiatingCapabilities => format!("Service discovery failed: {source}"),
            Stage::WritingPayload | Stage::ClosingAfterWrite => format!("Write failed: {source}"),
            Stage::ReadingAddress | Stage::ClosingAfterRead => format!("Read failed: {source}"),
        },
        SessionError::CharacteristicNotFound(uuid) => {
            format!("Device does not expose characteristic {uuid}")
        }
        SessionError::Decode(e) => format!("Read failed: {e}"),
    }
}

fn validate(payload: &ProvisioningPayload) -> Result<(), ProvisionError> {
    if payload.ssid.trim().is_empty() {
        return Err(ProvisionError::EmptySsid);
    }
    coordinate("latitude", &payload.latitude)?;
    coordinate("longitude", &payload.longitude)?;

    if let Some(address) = &payload.address_override {
        address
            .parse::<ServerAddress>()
            .map_err(|_| ProvisionError::InvalidAddress(address.clone()))?;
    }
    if let Some(t) = &payload.thresholds {
        for (field, value) in [("tMax", t.temp_max), ("tMin", t.temp_min)] {
            if !value.is_finite() {
                return Err(ProvisionError::NonFiniteThreshold { field });
            }
        }
    }
    Ok(())
}

fn coordinate(field: &'static str, value: &str) -> Result<f64, ProvisionError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProvisionError::NotANumber {
            field,
            value: value.to_string(),
        })
}

/// Set while alive, cleared on drop
struct Latch<'a>(&'a AtomicBool);

impl<'a> Latch<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Latch(flag))
    }
}

impl Drop for Latch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
