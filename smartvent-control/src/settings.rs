//! Persisted client settings
//!
//! A small JSON document in the SmartVent home directory. Only the device
//! address lives there today; unknown keys are preserved on write.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use smartvent_proto::ServerAddress;
use tracing::warn;

use crate::StoreError;

/// Key of the device address in `settings.json`
pub const SERVER_ADDRESS_KEY: &str = "server_ip";

/// Where the last known device address is kept between runs
pub trait AddressStore {
    /// [`ServerAddress::UNKNOWN`] when nothing was stored yet
    fn load(&self) -> Result<ServerAddress, StoreError>;

    fn save(&self, address: ServerAddress) -> Result<(), StoreError>;
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            path: home.as_ref().join("settings.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let data = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl AddressStore for FileStore {
    fn load(&self) -> Result<ServerAddress, StoreError> {
        let settings = self.read()?;
        let Some(raw) = settings.get(SERVER_ADDRESS_KEY).and_then(Value::as_str) else {
            return Ok(ServerAddress::UNKNOWN);
        };
        Ok(raw.parse().unwrap_or_else(|e| {
            warn!("ignoring stored address: {e}");
            ServerAddress::UNKNOWN
        }))
    }

    fn save(&self, address: ServerAddress) -> Result<(), StoreError> {
        let mut settings = self.read()?;
        settings.insert(
            SERVER_ADDRESS_KEY.to_string(),
            Value::String(address.to_string()),
        );
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&settings)?)?;
        Ok(())
    }
}
