//! Radio collaborator seam.
//!
//! A [`Radio`] issues requests and never blocks; every outcome comes back later
//! as a [`RadioEvent`] on the link's event stream.

use bytes::Bytes;
use thiserror::Error;

pub use uuid::Uuid;

/// Opaque handle for a remote device, assigned by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceHandle(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharHandle(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattService {
    pub handle: ServiceHandle,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub handle: CharHandle,
    pub uuid: Uuid,
}

/// Everything the radio reports back, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    AdapterReady,
    AdapterUnavailable,
    AdvertiserFound(PeerId),
    Connected(PeerId),
    Disconnected(PeerId),
    ServicesFound {
        peer: PeerId,
        services: Vec<GattService>,
    },
    CharacteristicsFound {
        service: ServiceHandle,
        characteristics: Vec<GattCharacteristic>,
    },
    ValueChanged {
        characteristic: CharHandle,
        value: Bytes,
    },
    /// Response to a write issued with `ack_required`. `Err` carries the
    /// peer's rejection reason.
    WriteCompleted {
        characteristic: CharHandle,
        result: Result<(), String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("radio adapter unavailable")]
    Unavailable,
    #[error("radio {op} failed: {reason}")]
    Failed { op: &'static str, reason: String },
}

pub trait Radio {
    fn scan(&mut self, service: Uuid) -> Result<(), RadioError>;
    fn stop_scan(&mut self) -> Result<(), RadioError>;
    fn connect(&mut self, peer: PeerId) -> Result<(), RadioError>;
    fn discover_services(&mut self, peer: PeerId, service: Uuid) -> Result<(), RadioError>;
    fn discover_characteristics(&mut self, service: ServiceHandle, characteristic: Uuid) -> Result<(), RadioError>;
    fn subscribe(&mut self, characteristic: CharHandle) -> Result<(), RadioError>;
    fn read_once(&mut self, characteristic: CharHandle) -> Result<(), RadioError>;
    fn write(&mut self, characteristic: CharHandle, value: Bytes, ack_required: bool) -> Result<(), RadioError>;
}
