//! Provisioning session orchestrator
//!
//! A session is an explicit state machine driven by one transition function:
//!
//! ```text
//! Scanning -> Connecting -> NegotiatingCapabilities -> WritingPayload -> ClosingAfterWrite -> Success
//!                                                  \-> ReadingAddress -> ClosingAfterRead  -> Success(address)
//! ```
//!
//! Every transition runs against one session-wide deadline, so the deadline can
//! interrupt any phase. The radio sits behind a mutex that is only ever
//! `try_lock`ed: holding the guard *is* the single-flight latch, and dropping
//! it on any exit path releases both the radio and the latch.

use std::fmt;
use std::time::Duration;

use smartvent_proto::ble::{ADDRESS_CHAR_UUID, CONFIG_CHAR_UUID, DEVICE_NAME};
use smartvent_proto::{CharacteristicValue, CodecError, ProvisioningPayload, codec};
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::scanner::{self, ScanError};
use crate::transport::{DeviceDescriptor, Radio, RadioLink, TransportError};

/// Upper bound on best-effort cleanup calls
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scanning,
    Connecting,
    NegotiatingCapabilities,
    WritingPayload,
    ClosingAfterWrite,
    ReadingAddress,
    ClosingAfterRead,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Scanning => "scanning",
            Stage::Connecting => "connecting",
            Stage::NegotiatingCapabilities => "discovering services",
            Stage::WritingPayload => "writing configuration",
            Stage::ClosingAfterWrite => "closing after write",
            Stage::ReadingAddress => "reading address",
            Stage::ClosingAfterRead => "closing after read",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload acknowledged; the device is expected to reboot
    Configured,
    /// Decoded address characteristic, possibly the `0.0.0.0` sentinel
    Address(String),
}

impl Outcome {
    /// The address read back; `None` for a configure outcome
    pub fn address(&self) -> Option<&str> {
        match self {
            Outcome::Address(address) => Some(address),
            Outcome::Configured => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("timed out while {during}")]
    Timeout { during: Stage },
    #[error("{during} failed: {source}")]
    Transport {
        during: Stage,
        source: TransportError,
    },
    #[error("device does not expose characteristic {0}")]
    CharacteristicNotFound(Uuid),
    #[error("unreadable address value: {0}")]
    Decode(#[from] CodecError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Active(Stage),
    Succeeded(Outcome),
    Failed(SessionError),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Exact advertised name of the target
    pub device_name: String,
    pub configure_deadline: Duration,
    pub address_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            configure_deadline: Duration::from_secs(15),
            address_deadline: Duration::from_secs(10),
        }
    }
}

/// Runs provisioning sessions, one at a time
pub struct Orchestrator<R> {
    radio: Mutex<R>,
    config: SessionConfig,
    phase: watch::Sender<Phase>,
}

impl<R: Radio> Orchestrator<R> {
    pub fn new(radio: R, config: SessionConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            radio: Mutex::new(radio),
            config,
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Current phase, or the terminal phase of the last session
    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.radio.try_lock().is_err()
    }

    /// Write `payload` to the configuration characteristic.
    ///
    /// Returns `None` without touching the radio when a session is already
    /// running.
    pub async fn configure(
        &self,
        payload: &ProvisioningPayload,
    ) -> Option<Result<Outcome, SessionError>> {
        self.run(Flow::Configure(payload), self.config.configure_deadline).await
    }

    /// Read back the address the device obtained on the network
    pub async fn read_address(&self) -> Option<Result<Outcome, SessionError>> {
        self.run(Flow::ReadAddress, self.config.address_deadline).await
    }

    async fn run(
        &self,
        flow: Flow<'_>,
        deadline: Duration,
    ) -> Option<Result<Outcome, SessionError>> {
        let Ok(radio) = self.radio.try_lock() else {
            info!("provisioning session already active, request dropped");
            return None;
        };

        let mut session = Session {
            radio: &*radio,
            flow,
            device_name: &self.config.device_name,
            scan_window: deadline,
            link: None,
            phase: &self.phase,
        };
        let result = session.drive(deadline).await;

        self.phase.send_replace(match &result {
            Ok(outcome) => Phase::Succeeded(outcome.clone()),
            Err(e) => Phase::Failed(e.clone()),
        });
        Some(result)
    }
}

#[derive(Clone, Copy)]
enum Flow<'p> {
    Configure(&'p ProvisioningPayload),
    ReadAddress,
}

enum Step {
    Scan,
    Connect(DeviceDescriptor),
    Negotiate,
    Write(CharacteristicValue),
    CloseAfterWrite,
    Read,
    CloseAfterRead(String),
}

impl Step {
    fn stage(&self) -> Stage {
        match self {
            Step::Scan => Stage::Scanning,
            Step::Connect(_) => Stage::Connecting,
            Step::Negotiate => Stage::NegotiatingCapabilities,
            Step::Write(_) => Stage::WritingPayload,
            Step::CloseAfterWrite => Stage::ClosingAfterWrite,
            Step::Read => Stage::ReadingAddress,
            Step::CloseAfterRead(_) => Stage::ClosingAfterRead,
        }
    }

    /// What the session has already achieved once this step only tears down
    fn settled(&self) -> Option<Outcome> {
        match self {
            Step::CloseAfterWrite => Some(Outcome::Configured),
            Step::CloseAfterRead(address) => Some(Outcome::Address(address.clone())),
            _ => None,
        }
    }
}

enum Next {
    Step(Step),
    Done(Outcome),
}

struct Session<'a, R: Radio> {
    radio: &'a R,
    flow: Flow<'a>,
    device_name: &'a str,
    scan_window: Duration,
    link: Option<R::Link>,
    phase: &'a watch::Sender<Phase>,
}

impl<R: Radio> Session<'_, R> {
    async fn drive(&mut self, deadline: Duration) -> Result<Outcome, SessionError> {
        let deadline = Instant::now() + deadline;
        let mut step = Step::Scan;

        loop {
            let stage = step.stage();
            let settled = step.settled();
            info!(%stage, "provisioning");
            self.phase.send_replace(Phase::Active(stage));

            match tokio::time::timeout_at(deadline, self.transition(step)).await {
                Ok(Ok(Next::Step(next))) => step = next,
                Ok(Ok(Next::Done(outcome))) => return Ok(outcome),
                Ok(Err(e)) => {
                    warn!("provisioning failed: {e}");
                    self.close().await;
                    return Err(e);
                }
                Err(_) => {
                    warn!(%stage, "provisioning deadline exceeded");
                    if stage == Stage::Scanning {
                        self.stop_scan().await;
                    }
                    // a cancelled disconnect leaves the link in place, close it again
                    self.close().await;
                    return match settled {
                        Some(outcome) => Ok(outcome),
                        None => Err(SessionError::Timeout { during: stage }),
                    };
                }
            }
        }
    }

    async fn transition(&mut self, step: Step) -> Result<Next, SessionError> {
        let stage = step.stage();
        let fail = move |source: TransportError| SessionError::Transport {
            during: stage,
            source,
        };

        let next = match step {
            Step::Scan => {
                let device = scanner::scan(self.radio, self.device_name, self.scan_window)
                    .await
                    .map_err(|e| match e {
                        ScanError::Timeout(_) => SessionError::Timeout { during: stage },
                        ScanError::Transport(source) => fail(source),
                    })?;
                info!(address = %device.address, "found {}", device.name);
                Step::Connect(device)
            }
            Step::Connect(device) => {
                self.link = Some(self.radio.connect(&device).await.map_err(fail)?);
                Step::Negotiate
            }
            Step::Negotiate => {
                let available = self.link(stage)?.discover().await.map_err(fail)?;
                let (wanted, next) = match self.flow {
                    Flow::Configure(payload) => {
                        (CONFIG_CHAR_UUID, Step::Write(codec::encode_payload(payload)))
                    }
                    Flow::ReadAddress => (ADDRESS_CHAR_UUID, Step::Read),
                };
                if !available.contains(&wanted) {
                    return Err(SessionError::CharacteristicNotFound(wanted));
                }
                next
            }
            Step::Write(value) => {
                self.link(stage)?
                    .write(CONFIG_CHAR_UUID, &value)
                    .await
                    .map_err(fail)?;
                Step::CloseAfterWrite
            }
            Step::CloseAfterWrite => {
                self.close().await;
                return Ok(Next::Done(Outcome::Configured));
            }
            Step::Read => {
                let value = self
                    .link(stage)?
                    .read(ADDRESS_CHAR_UUID)
                    .await
                    .map_err(fail)?;
                Step::CloseAfterRead(codec::decode_address(&value)?)
            }
            Step::CloseAfterRead(address) => {
                self.close().await;
                return Ok(Next::Done(Outcome::Address(address)));
            }
        };
        Ok(Next::Step(next))
    }

    fn link(&mut self, stage: Stage) -> Result<&mut R::Link, SessionError> {
        self.link.as_mut().ok_or_else(|| SessionError::Transport {
            during: stage,
            source: TransportError::new("link is not open"),
        })
    }

    /// Best-effort teardown; failures are logged and swallowed.
    ///
    /// The link is only released once `disconnect` has run to completion, so
    /// a close interrupted by the deadline can be issued again.
    async fn close(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let closed = tokio::time::timeout(TEARDOWN_TIMEOUT, link.disconnect()).await;
        self.link = None;
        match closed {
            Ok(Ok(())) => info!("link closed"),
            Ok(Err(e)) => warn!("failed to close link (ignored): {e}"),
            Err(_) => warn!("closing link timed out (ignored)"),
        }
    }

    async fn stop_scan(&self) {
        match tokio::time::timeout(TEARDOWN_TIMEOUT, self.radio.stop_scan()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to stop scan (ignored): {e}"),
            Err(_) => warn!("stopping scan timed out (ignored)"),
        }
    }
}
