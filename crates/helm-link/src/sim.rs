//! Substitute radios: a call recorder for transition tests and a simulated
//! autopilot peripheral for end-to-end runs without hardware.

use bytes::Bytes;
use helm_proto::{frame, TelemetryRecord};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::radio::{
    CharHandle, GattCharacteristic, GattService, PeerId, Radio, RadioError, RadioEvent, ServiceHandle, Uuid,
};
use crate::LinkIds;

#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    Scan(Uuid),
    StopScan,
    Connect(PeerId),
    DiscoverServices(PeerId, Uuid),
    DiscoverCharacteristics(ServiceHandle, Uuid),
    Subscribe(CharHandle),
    ReadOnce(CharHandle),
    Write { characteristic: CharHandle, value: Bytes, ack: bool },
}

/// Records every request and never produces events.
#[derive(Debug, Clone, Default)]
pub struct RecordingRadio {
    calls: Arc<Mutex<Vec<RadioCall>>>,
    fail_writes: bool,
    unavailable: bool,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails to issue.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Every request fails as if the adapter were off.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        lock(&self.calls).clone()
    }

    pub fn last_write(&self) -> Option<(Bytes, bool)> {
        lock(&self.calls).iter().rev().find_map(|c| match c {
            RadioCall::Write { value, ack, .. } => Some((value.clone(), *ack)),
            _ => None,
        })
    }

    fn record(&mut self, call: RadioCall) -> Result<(), RadioError> {
        if self.unavailable {
            return Err(RadioError::Unavailable);
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

impl Radio for RecordingRadio {
    fn scan(&mut self, service: Uuid) -> Result<(), RadioError> {
        self.record(RadioCall::Scan(service))
    }

    fn stop_scan(&mut self) -> Result<(), RadioError> {
        self.record(RadioCall::StopScan)
    }

    fn connect(&mut self, peer: PeerId) -> Result<(), RadioError> {
        self.record(RadioCall::Connect(peer))
    }

    fn discover_services(&mut self, peer: PeerId, service: Uuid) -> Result<(), RadioError> {
        self.record(RadioCall::DiscoverServices(peer, service))
    }

    fn discover_characteristics(&mut self, service: ServiceHandle, characteristic: Uuid) -> Result<(), RadioError> {
        self.record(RadioCall::DiscoverCharacteristics(service, characteristic))
    }

    fn subscribe(&mut self, characteristic: CharHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Subscribe(characteristic))
    }

    fn read_once(&mut self, characteristic: CharHandle) -> Result<(), RadioError> {
        self.record(RadioCall::ReadOnce(characteristic))
    }

    fn write(&mut self, characteristic: CharHandle, value: Bytes, ack: bool) -> Result<(), RadioError> {
        if self.fail_writes {
            return Err(RadioError::Failed { op: "write", reason: "no write capability".into() });
        }
        self.record(RadioCall::Write { characteristic, value, ack })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of autopilots advertising the service at once.
    pub peers: u32,
    /// How often the simulated autopilot pushes a telemetry notification.
    pub telemetry_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { peers: 1, telemetry_interval_ms: 500 }
    }
}

impl SimConfig {
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }
}

pub const SIM_SERVICE_HANDLE: ServiceHandle = ServiceHandle(0x0010);
pub const SIM_CHAR_HANDLE: CharHandle = CharHandle(0x0012);

#[derive(Debug)]
struct SimState {
    record: TelemetryRecord,
    connected: Option<PeerId>,
    scanning: bool,
    subscribed: bool,
}

/// Simulated autopilot peripheral. Answers every request with the event a
/// real peripheral would produce, echoes accepted gain writes back as
/// notifications and advances synthetic telemetry on [`SimAutopilot::tick`].
///
/// Clones share the same peripheral, so a caller can keep one to drive ticks
/// while the link machine owns another.
#[derive(Debug, Clone)]
pub struct SimAutopilot {
    ids: LinkIds,
    peers: u32,
    state: Arc<Mutex<SimState>>,
    events: mpsc::UnboundedSender<RadioEvent>,
}

impl SimAutopilot {
    pub fn new(ids: LinkIds, cfg: &SimConfig, events: mpsc::UnboundedSender<RadioEvent>) -> Self {
        let record = TelemetryRecord {
            kp: 1.0,
            ki: 0.1,
            kd: 0.5,
            bearing_to_waypoint: 90.0,
            dest_lat: 47.6205,
            dest_lon: -122.3493,
            prev_dest_lat: 47.6097,
            prev_dest_lon: -122.3331,
            heading: 60.0,
            prev_bearing: 90.0,
            rudder_position: 512.0,
            target_motor_position: 512.0,
            homing_complete: true,
            ..Default::default()
        };
        Self {
            ids,
            peers: cfg.peers.max(1),
            state: Arc::new(Mutex::new(SimState { record, connected: None, scanning: false, subscribed: false })),
            events,
        }
    }

    /// Current autopilot-side record.
    pub fn record(&self) -> TelemetryRecord {
        lock(&self.state).record
    }

    pub fn power_on(&self) -> Result<(), RadioError> {
        self.emit(RadioEvent::AdapterReady)
    }

    pub fn power_off(&self) -> Result<(), RadioError> {
        let mut st = lock(&self.state);
        st.connected = None;
        st.subscribed = false;
        st.scanning = false;
        drop(st);
        self.emit(RadioEvent::AdapterUnavailable)
    }

    /// Drop the current connection from the peripheral side.
    pub fn drop_connection(&self) -> Result<(), RadioError> {
        let mut st = lock(&self.state);
        st.subscribed = false;
        let Some(peer) = st.connected.take() else { return Ok(()) };
        drop(st);
        self.emit(RadioEvent::Disconnected(peer))
    }

    /// Push raw bytes as a notification, bypassing the encoder.
    pub fn inject(&self, value: &[u8]) -> Result<(), RadioError> {
        self.emit(RadioEvent::ValueChanged {
            characteristic: SIM_CHAR_HANDLE,
            value: Bytes::copy_from_slice(value),
        })
    }

    /// Advance the synthetic steering loop by `dt` and notify if subscribed.
    pub fn tick(&self, dt: Duration) -> Result<(), RadioError> {
        let mut st = lock(&self.state);
        step(&mut st.record, dt);
        if !st.subscribed {
            return Ok(());
        }
        let frame = frame::encode(&st.record);
        drop(st);
        self.inject(&frame)
    }

    fn emit(&self, ev: RadioEvent) -> Result<(), RadioError> {
        self.events
            .send(ev)
            .map_err(|_| RadioError::Failed { op: "emit", reason: "event channel closed".into() })
    }
}

// Synthetic only: enough motion for the telemetry fields to change.
fn step(r: &mut TelemetryRecord, dt: Duration) {
    let dt_s = dt.as_secs_f32();
    r.time_delta = dt_s;
    r.prev_time += dt.as_millis() as f32;
    r.prev_xte = r.xte;
    r.prev_bearing = r.bearing_to_waypoint;

    let err = (r.bearing_to_waypoint - r.heading + 540.0).rem_euclid(360.0) - 180.0;
    r.xte = err * 0.5;
    r.integral_xte = (r.integral_xte + r.xte * dt_s).clamp(-100.0, 100.0);
    r.derivative_xte = if dt_s > 0.0 { (r.xte - r.prev_xte) / dt_s } else { 0.0 };

    r.rudder_angle = (r.kp * r.xte + r.ki * r.integral_xte + r.kd * r.derivative_xte).clamp(-30.0, 30.0);
    r.heading = (r.heading + r.rudder_angle * dt_s).rem_euclid(360.0);
    r.target_motor_position = 512.0 + r.rudder_angle * 10.0;
    r.rudder_position += (r.target_motor_position - r.rudder_position) * 0.5;
}

impl Radio for SimAutopilot {
    fn scan(&mut self, service: Uuid) -> Result<(), RadioError> {
        if service != self.ids.service {
            return Ok(());
        }
        lock(&self.state).scanning = true;
        for id in 1..=self.peers {
            self.emit(RadioEvent::AdvertiserFound(PeerId(u64::from(id))))?;
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), RadioError> {
        lock(&self.state).scanning = false;
        Ok(())
    }

    fn connect(&mut self, peer: PeerId) -> Result<(), RadioError> {
        lock(&self.state).connected = Some(peer);
        self.emit(RadioEvent::Connected(peer))
    }

    fn discover_services(&mut self, peer: PeerId, _service: Uuid) -> Result<(), RadioError> {
        self.emit(RadioEvent::ServicesFound {
            peer,
            services: vec![GattService { handle: SIM_SERVICE_HANDLE, uuid: self.ids.service }],
        })
    }

    fn discover_characteristics(&mut self, service: ServiceHandle, _characteristic: Uuid) -> Result<(), RadioError> {
        self.emit(RadioEvent::CharacteristicsFound {
            service,
            characteristics: vec![GattCharacteristic { handle: SIM_CHAR_HANDLE, uuid: self.ids.characteristic }],
        })
    }

    fn subscribe(&mut self, _characteristic: CharHandle) -> Result<(), RadioError> {
        lock(&self.state).subscribed = true;
        Ok(())
    }

    fn read_once(&mut self, characteristic: CharHandle) -> Result<(), RadioError> {
        let frame = frame::encode(&self.record());
        self.emit(RadioEvent::ValueChanged { characteristic, value: Bytes::copy_from_slice(&frame) })
    }

    fn write(&mut self, characteristic: CharHandle, value: Bytes, ack: bool) -> Result<(), RadioError> {
        match frame::decode(&value) {
            Ok(cmd) => {
                let mut st = lock(&self.state);
                st.record = st.record.with_gains(cmd.gains());
                let subscribed = st.subscribed;
                let frame = frame::encode(&st.record);
                drop(st);
                debug!("sim: gains now kp={} ki={} kd={}", cmd.kp, cmd.ki, cmd.kd);

                if ack {
                    self.emit(RadioEvent::WriteCompleted { characteristic, result: Ok(()) })?;
                }
                if subscribed {
                    self.inject(&frame)?;
                }
            }
            Err(e) => {
                if ack {
                    self.emit(RadioEvent::WriteCompleted { characteristic, result: Err(e.to_string()) })?;
                }
            }
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
