//! Discovery: find the one device with a given advertised name

use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::transport::{Advertisement, DeviceDescriptor, Radio, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("no matching device within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Listen until an advertisement named `filter_name` shows up.
///
/// The first match wins; signal strength is not considered. The scan is
/// stopped on every exit path, and a failure to stop it is only logged.
pub async fn scan<R: Radio>(
    radio: &R,
    filter_name: &str,
    timeout: Duration,
) -> Result<DeviceDescriptor, ScanError> {
    let mut adverts = radio.start_scan().await?;

    let found = tokio::time::timeout(timeout, first_match(&mut adverts, filter_name)).await;

    drop(adverts);
    if let Err(e) = radio.stop_scan().await {
        warn!("failed to stop scan: {e}");
    }

    match found {
        Ok(Ok(device)) => Ok(device),
        Ok(Err(e)) => Err(ScanError::Transport(e)),
        Err(_) => Err(ScanError::Timeout(timeout)),
    }
}

async fn first_match<S>(
    adverts: &mut S,
    filter_name: &str,
) -> Result<DeviceDescriptor, TransportError>
where
    S: Stream<Item = Result<Advertisement, TransportError>> + Unpin,
{
    while let Some(advert) = adverts.next().await {
        let advert = advert?;
        if advert.matches(filter_name) {
            return Ok(DeviceDescriptor {
                name: filter_name.to_string(),
                address: advert.address,
            });
        }
        debug!(name = ?advert.name, address = %advert.address, "ignoring advertisement");
    }
    Err(TransportError::new("advertisement stream ended"))
}
