//! SmartVent control plane
//!
//! Once a vent has joined the network it is driven over plain HTTP. The
//! [`ControlClient`] issues commands and status reads against the device,
//! treats whatever the device answers as the truth, and publishes that truth
//! through a [`StateStore`]. The last known device address survives restarts
//! through an [`AddressStore`].

mod client;
mod error;
pub mod http;
mod settings;
mod store;

pub use client::{Advisory, ControlClient};
pub use error::{ControlError, StoreError};
pub use settings::{AddressStore, FileStore, SERVER_ADDRESS_KEY};
pub use smartvent_proto::ServerAddress;
pub use store::StateStore;
