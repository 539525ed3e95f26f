//! SmartVent BLE Controller
//!
//! Provisions a SmartVent over BLE: finds the device by its advertised name,
//! writes Wi-Fi credentials, location and thresholds, then reads back the
//! address the device obtained once it joined the network.
//!
//! # Example
//!
//! ```ignore
//! use smartvent_ble_controller::{BleRadio, Handoff, Provisioner, ProvisionerConfig};
//! use smartvent_proto::ProvisioningPayload;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = BleRadio::new().await?;
//!     let provisioner = Provisioner::new(radio, ProvisionerConfig::default());
//!
//!     let payload = ProvisioningPayload::new("MySSID", "MyPassword", "45.188", "5.724");
//!     match provisioner.configure_device(&payload).await {
//!         Handoff::Ready(address) => println!("device is at {address}"),
//!         other => println!("{}", provisioner.status()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod provisioner;
pub mod scanner;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use ble::BleRadio;
pub use provisioner::{
    AddressIssue, Handoff, ProvisionError, Provisioner, ProvisionerConfig, describe,
};
pub use scanner::{ScanError, scan};
pub use session::{Orchestrator, Outcome, Phase, SessionConfig, SessionError, Stage};
pub use transport::{Advertisement, DeviceDescriptor, Radio, RadioLink, TransportError};
