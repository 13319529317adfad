pub mod doctor;
pub mod driver;
pub mod machine;
pub mod radio;
pub mod sim;
pub mod store;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub use driver::{spawn, LinkHandle};
pub use machine::{ConnectionState, LinkError, LinkMachine, LinkNotice};
pub use radio::{Radio, RadioError, RadioEvent, Uuid};
pub use store::{Snapshot, TelemetryStore};

/// Service the autopilot firmware advertises.
pub const AUTOPILOT_SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Characteristic carrying telemetry notifications and accepting gain writes.
pub const AUTOPILOT_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service UUID used both as the scan filter and for service discovery.
    pub service_uuid: String,

    /// Characteristic UUID subscribed to and written with gain commands.
    pub characteristic_uuid: String,

    /// Request a write response for gain commands.
    pub write_ack: bool,

    /// Surface a stall notice when connecting/discovery takes longer than this.
    /// Unset means no watchdog.
    pub phase_timeout_ms: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: AUTOPILOT_SERVICE_UUID.to_string(),
            characteristic_uuid: AUTOPILOT_CHARACTERISTIC_UUID.to_string(),
            write_ack: true,
            phase_timeout_ms: None,
        }
    }
}

impl LinkConfig {
    pub fn settings(&self) -> Result<LinkSettings> {
        let service = Uuid::parse_str(self.service_uuid.trim())
            .with_context(|| format!("link.service_uuid {:?}", self.service_uuid))?;
        let characteristic = Uuid::parse_str(self.characteristic_uuid.trim())
            .with_context(|| format!("link.characteristic_uuid {:?}", self.characteristic_uuid))?;

        Ok(LinkSettings {
            ids: LinkIds { service, characteristic },
            write_ack: self.write_ack,
            phase_timeout: self.phase_timeout_ms.map(Duration::from_millis),
        })
    }
}

/// The well-known service/characteristic pair the link is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkIds {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl Default for LinkIds {
    fn default() -> Self {
        Self { service: AUTOPILOT_SERVICE_UUID, characteristic: AUTOPILOT_CHARACTERISTIC_UUID }
    }
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub ids: LinkIds,
    pub write_ack: bool,
    pub phase_timeout: Option<Duration>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self { ids: LinkIds::default(), write_ack: true, phase_timeout: None }
    }
}
