use std::sync::Arc;

use smartvent_proto::DeviceState;
use tokio::sync::watch;

/// Last synchronised device state.
///
/// Every update replaces the whole state; whichever response lands last wins.
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<Option<DeviceState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn replace(&self, state: DeviceState) {
        self.tx.send_replace(Some(state));
    }

    /// `None` until the first successful read
    pub fn current(&self) -> Option<DeviceState> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceState>> {
        self.tx.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
