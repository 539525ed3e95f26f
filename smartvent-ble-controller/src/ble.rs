//! btleplug backend for the radio transport

use std::fmt::Debug;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::{BoxStream, StreamExt};
use smartvent_proto::CharacteristicValue;
use smartvent_proto::ble::SERVICE_UUID;
use tracing::debug;
use uuid::Uuid;

use crate::transport::{Advertisement, DeviceDescriptor, Radio, RadioLink, TransportError};

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        TransportError::new(e.to_string())
    }
}

/// The host's default Bluetooth adapter
pub struct BleRadio {
    adapter: Adapter,
}

impl BleRadio {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::new("No Bluetooth adapter found"))?;
        Ok(Self { adapter })
    }
}

async fn advertisement(
    adapter: &Adapter,
    id: &PeripheralId,
) -> Result<Option<Advertisement>, TransportError> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(props) = peripheral.properties().await? else {
        return Ok(None);
    };
    Ok(Some(Advertisement {
        name: props.local_name,
        local_name: None,
        address: peripheral.address().to_string(),
    }))
}

/// A peripheral can vanish between the event and the lookup; that only loses
/// this one advertisement, the scan keeps running
fn discovered(
    id: &impl Debug,
    lookup: Result<Option<Advertisement>, TransportError>,
) -> Option<Result<Advertisement, TransportError>> {
    match lookup {
        Ok(advert) => advert.map(Ok),
        Err(e) => {
            debug!(?id, "skipping advertisement: {e}");
            None
        }
    }
}

impl Radio for BleRadio {
    type Link = BleLink;
    type Advertisements = BoxStream<'static, Result<Advertisement, TransportError>>;

    async fn start_scan(&self) -> Result<Self::Advertisements, TransportError> {
        // subscribe before scanning so the first advertisement is not missed
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let adverts = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        discovered(&id, advertisement(&adapter, &id).await)
                    }
                    _ => None,
                }
            }
        });
        Ok(adverts.boxed())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, device: &DeviceDescriptor) -> Result<BleLink, TransportError> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.address().to_string() != device.address {
                continue;
            }
            // some platforms hide the real address, so the name has to agree too
            let name = peripheral
                .properties()
                .await?
                .and_then(|p| p.local_name)
                .unwrap_or_default();
            if name == device.name {
                peripheral.connect().await?;
                return Ok(BleLink { peripheral });
            }
        }
        Err(TransportError::new(format!(
            "{} ({}) is no longer visible",
            device.name, device.address
        )))
    }
}

/// Connection to one peripheral
pub struct BleLink {
    peripheral: Peripheral,
}

impl BleLink {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == SERVICE_UUID && c.uuid == uuid)
            .ok_or_else(|| TransportError::new(format!("characteristic {uuid} not found")))
    }
}

impl RadioLink for BleLink {
    async fn discover(&mut self) -> Result<Vec<Uuid>, TransportError> {
        self.peripheral.discover_services().await?;
        Ok(self
            .peripheral
            .characteristics()
            .iter()
            .filter(|c| c.service_uuid == SERVICE_UUID)
            .map(|c| c.uuid)
            .collect())
    }

    async fn write(
        &mut self,
        characteristic: Uuid,
        value: &CharacteristicValue,
    ) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        let bytes = value
            .to_bytes()
            .map_err(|e| TransportError::new(e.to_string()))?;
        self.peripheral
            .write(&c, &bytes, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<CharacteristicValue, TransportError> {
        let c = self.characteristic(characteristic)?;
        let raw = self.peripheral.read(&c).await?;
        Ok(CharacteristicValue::from_bytes(&raw))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
