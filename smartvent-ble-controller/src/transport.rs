//! Radio transport seam
//!
//! The orchestrator only talks to these traits. [`crate::BleRadio`] implements
//! them on top of btleplug; tests use a scripted in-memory radio.

use futures::Stream;
use smartvent_proto::CharacteristicValue;
use uuid::Uuid;

/// One advertisement seen while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub name: Option<String>,
    /// Local-name field from the scan response, when it differs from `name`
    pub local_name: Option<String>,
    pub address: String,
}

impl Advertisement {
    /// Exact match on either name field
    pub fn matches(&self, target: &str) -> bool {
        self.name.as_deref() == Some(target) || self.local_name.as_deref() == Some(target)
    }
}

/// A device picked out of a scan, valid for the current session only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The radio adapter. Owned by the orchestrator for the duration of a session.
#[allow(async_fn_in_trait)]
pub trait Radio {
    type Link: RadioLink;
    type Advertisements: Stream<Item = Result<Advertisement, TransportError>> + Unpin;

    /// Start listening; advertisements arrive on the returned stream until
    /// [`Radio::stop_scan`] is called.
    async fn start_scan(&self) -> Result<Self::Advertisements, TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn connect(&self, device: &DeviceDescriptor) -> Result<Self::Link, TransportError>;
}

/// An open connection to one device
#[allow(async_fn_in_trait)]
pub trait RadioLink {
    /// Discover services and return the characteristics the device exposes
    async fn discover(&mut self) -> Result<Vec<Uuid>, TransportError>;

    /// Confirmed write
    async fn write(
        &mut self,
        characteristic: Uuid,
        value: &CharacteristicValue,
    ) -> Result<(), TransportError>;

    async fn read(&mut self, characteristic: Uuid) -> Result<CharacteristicValue, TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
