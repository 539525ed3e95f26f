//! Scripted in-memory radio for tests

use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use smartvent_proto::CharacteristicValue;
use smartvent_proto::ble::{ADDRESS_CHAR_UUID, CONFIG_CHAR_UUID, DEVICE_NAME};
use uuid::Uuid;

use crate::transport::{Advertisement, DeviceDescriptor, Radio, RadioLink, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(String),
    Discover,
    Write(Uuid, CharacteristicValue),
    Read(Uuid),
    Disconnect,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    Fail(&'static str),
    Hang,
}

impl Behavior {
    async fn run(self) -> Result<(), TransportError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(m) => Err(TransportError::new(m)),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

pub fn advert(name: &str, address: &str) -> Advertisement {
    Advertisement {
        name: Some(name.to_string()),
        local_name: None,
        address: address.to_string(),
    }
}

#[derive(Clone)]
pub struct FakeRadio {
    adverts: Vec<Result<Advertisement, TransportError>>,
    characteristics: Vec<Uuid>,
    address: CharacteristicValue,
    pub connect: Behavior,
    pub discover: Behavior,
    pub write: Behavior,
    pub read: Behavior,
    pub disconnect: Behavior,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeRadio {
    /// A radio that hears nothing
    pub fn new() -> Self {
        Self {
            adverts: Vec::new(),
            characteristics: vec![CONFIG_CHAR_UUID, ADDRESS_CHAR_UUID],
            address: CharacteristicValue::from_bytes(b"192.168.1.50"),
            connect: Behavior::Succeed,
            discover: Behavior::Succeed,
            write: Behavior::Succeed,
            read: Behavior::Succeed,
            disconnect: Behavior::Succeed,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A radio with the vent in range
    pub fn with_device() -> Self {
        Self::new().with_adverts(vec![Ok(advert(DEVICE_NAME, "24:6F:28:AA:BB:CC"))])
    }

    pub fn with_adverts(mut self, adverts: Vec<Result<Advertisement, TransportError>>) -> Self {
        self.adverts = adverts;
        self
    }

    pub fn with_characteristics(mut self, characteristics: Vec<Uuid>) -> Self {
        self.characteristics = characteristics;
        self
    }

    pub fn with_address(mut self, raw: &str) -> Self {
        self.address = CharacteristicValue::from_bytes(raw.as_bytes());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| f(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Radio for FakeRadio {
    type Link = FakeLink;
    type Advertisements = BoxStream<'static, Result<Advertisement, TransportError>>;

    async fn start_scan(&self) -> Result<Self::Advertisements, TransportError> {
        self.record(Call::StartScan);
        Ok(stream::iter(self.adverts.clone())
            .chain(stream::pending())
            .boxed())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record(Call::StopScan);
        Ok(())
    }

    async fn connect(&self, device: &DeviceDescriptor) -> Result<FakeLink, TransportError> {
        self.record(Call::Connect(device.address.clone()));
        self.connect.run().await?;
        Ok(FakeLink {
            radio: self.clone(),
        })
    }
}

pub struct FakeLink {
    radio: FakeRadio,
}

impl RadioLink for FakeLink {
    async fn discover(&mut self) -> Result<Vec<Uuid>, TransportError> {
        self.radio.record(Call::Discover);
        self.radio.discover.run().await?;
        Ok(self.radio.characteristics.clone())
    }

    async fn write(
        &mut self,
        characteristic: Uuid,
        value: &CharacteristicValue,
    ) -> Result<(), TransportError> {
        self.radio.record(Call::Write(characteristic, value.clone()));
        self.radio.write.run().await
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<CharacteristicValue, TransportError> {
        self.radio.record(Call::Read(characteristic));
        self.radio.read.run().await?;
        Ok(self.radio.address.clone())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.radio.record(Call::Disconnect);
        self.radio.disconnect.run().await
    }
}
