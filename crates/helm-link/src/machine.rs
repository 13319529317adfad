use bytes::Bytes;
use helm_proto::{frame, FrameError, Gains};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::radio::{
    CharHandle, GattCharacteristic, GattService, PeerId, Radio, RadioError, RadioEvent, ServiceHandle, Uuid,
};
use crate::store::TelemetryStore;
use crate::{LinkIds, LinkSettings};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
}

impl ConnectionState {
    /// States that wait on the peer and can stall.
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::DiscoveringServices
                | ConnectionState::DiscoveringCharacteristics
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::DiscoveringServices => "discovering_services",
            ConnectionState::DiscoveringCharacteristics => "discovering_characteristics",
            ConnectionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("radio adapter unavailable")]
    AdapterUnavailable,
    #[error("link not ready (state: {0})")]
    NotReady(ConnectionState),
    #[error("gain {name} must be a finite number, got {value}")]
    InvalidGain { name: &'static str, value: f32 },
    #[error("autopilot rejected write: {0}")]
    WriteRejected(String),
    #[error("dropped telemetry frame: {0}")]
    MalformedFrame(#[from] FrameError),
    #[error("peer does not offer service {0}")]
    ServiceMissing(Uuid),
    #[error("peer does not offer characteristic {0}")]
    CharacteristicMissing(Uuid),
    #[error("no progress in {state} for {elapsed:?}")]
    PhaseStalled { state: ConnectionState, elapsed: Duration },
    #[error(transparent)]
    Radio(#[from] RadioError),
    #[error("link task stopped")]
    Closed,
}

/// Observable link activity for the display layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkNotice {
    State { from: ConnectionState, to: ConnectionState },
    Error(LinkError),
}

/// Discovery/connect/subscribe lifecycle against one autopilot.
///
/// All radio events go through [`LinkMachine::handle`] on a single owner; the
/// machine is the only writer of its [`TelemetryStore`].
pub struct LinkMachine<R> {
    radio: R,
    ids: LinkIds,
    write_ack: bool,
    phase_timeout: Option<Duration>,

    state: ConnectionState,
    phase_since: Instant,
    stall_reported: bool,
    peer: Option<PeerId>,
    service: Option<ServiceHandle>,
    characteristic: Option<CharHandle>,

    store: TelemetryStore,
    notices: broadcast::Sender<LinkNotice>,
}

impl<R: Radio> LinkMachine<R> {
    pub fn new(radio: R, settings: LinkSettings) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            radio,
            ids: settings.ids,
            write_ack: settings.write_ack,
            phase_timeout: settings.phase_timeout,
            state: ConnectionState::Idle,
            phase_since: Instant::now(),
            stall_reported: false,
            peer: None,
            service: None,
            characteristic: None,
            store: TelemetryStore::new(),
            notices,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    pub fn store(&self) -> TelemetryStore {
        self.store.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<LinkNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<LinkNotice> {
        self.notices.clone()
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn handle(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::AdapterReady => self.on_adapter_ready(),
            RadioEvent::AdapterUnavailable => self.on_adapter_unavailable(),
            RadioEvent::AdvertiserFound(peer) => self.on_advertiser(peer),
            RadioEvent::Connected(peer) => self.on_connected(peer),
            RadioEvent::Disconnected(peer) => self.on_disconnected(peer),
            RadioEvent::ServicesFound { peer, services } => self.on_services(peer, &services),
            RadioEvent::CharacteristicsFound { service, characteristics } => {
                self.on_characteristics(service, &characteristics)
            }
            RadioEvent::ValueChanged { characteristic, value } => self.on_value(characteristic, &value),
            RadioEvent::WriteCompleted { characteristic, result } => self.on_write_completed(characteristic, result),
        }
    }

    /// Quantize `gains` to the wire resolution and write them over the current
    /// record. Returns once the write is issued; the peer's answer arrives as
    /// a [`RadioEvent::WriteCompleted`].
    pub fn send_gains(&mut self, gains: Gains) -> Result<(), LinkError> {
        let ch = match (self.state, self.characteristic) {
            (ConnectionState::Ready, Some(ch)) => ch,
            _ => return Err(LinkError::NotReady(self.state)),
        };
        if let Some((name, value)) = gains.non_finite() {
            return Err(LinkError::InvalidGain { name, value });
        }
        // Values near f32::MAX round up past it.
        let q = gains.quantized();
        if let Some((name, value)) = q.non_finite() {
            return Err(LinkError::InvalidGain { name, value });
        }

        let record = self.store.snapshot().record.with_gains(q);
        let frame = frame::encode(&record);
        self.radio.write(ch, Bytes::copy_from_slice(&frame), self.write_ack)?;

        info!("link: sent gains kp={} ki={} kd={} (ack={})", q.kp, q.ki, q.kd, self.write_ack);
        Ok(())
    }

    /// Report a handshake phase that outlived the configured timeout. Reported
    /// once per phase entry; the state is left alone.
    pub fn poll_stall(&mut self, now: Instant) {
        let Some(limit) = self.phase_timeout else { return };
        if self.stall_reported || !self.state.is_handshake() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.phase_since);
        if elapsed >= limit {
            self.stall_reported = true;
            self.surface(LinkError::PhaseStalled { state: self.state, elapsed });
        }
    }

    fn on_adapter_ready(&mut self) {
        if self.state != ConnectionState::Idle {
            debug!("link: adapter ready while {}, ignored", self.state);
            return;
        }
        match self.radio.scan(self.ids.service) {
            Ok(()) => {
                info!("link: scanning for service {}", self.ids.service);
                self.transition(ConnectionState::Scanning);
            }
            Err(RadioError::Unavailable) => self.surface(LinkError::AdapterUnavailable),
            Err(e) => self.surface(e.into()),
        }
    }

    fn on_adapter_unavailable(&mut self) {
        self.drop_link();
        self.surface(LinkError::AdapterUnavailable);
    }

    fn on_advertiser(&mut self, peer: PeerId) {
        if self.state != ConnectionState::Scanning {
            debug!("link: advertiser {:?} ignored while {}", peer, self.state);
            return;
        }
        // First match wins; stop scanning before anything else can arrive.
        if let Err(e) = self.radio.stop_scan() {
            warn!("link: stop scan failed: {}", e);
        }
        self.peer = Some(peer);
        match self.radio.connect(peer) {
            Ok(()) => {
                info!("link: connecting to {:?}", peer);
                self.transition(ConnectionState::Connecting);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_connected(&mut self, peer: PeerId) {
        if self.state != ConnectionState::Connecting || self.peer != Some(peer) {
            debug!("link: connect ack from {:?} ignored while {}", peer, self.state);
            return;
        }
        info!("link: connected to {:?}", peer);
        match self.radio.discover_services(peer, self.ids.service) {
            Ok(()) => self.transition(ConnectionState::DiscoveringServices),
            Err(e) => self.fail(e),
        }
    }

    fn on_disconnected(&mut self, peer: PeerId) {
        if self.peer != Some(peer) {
            debug!("link: disconnect from unknown {:?} ignored", peer);
            return;
        }
        info!("link: {:?} disconnected", peer);
        self.drop_link();
    }

    fn on_services(&mut self, peer: PeerId, services: &[GattService]) {
        if self.state != ConnectionState::DiscoveringServices || self.peer != Some(peer) {
            debug!("link: services from {:?} ignored while {}", peer, self.state);
            return;
        }
        let Some(svc) = services.iter().find(|s| s.uuid == self.ids.service) else {
            warn!("link: {:?} offered {} services, none matching", peer, services.len());
            self.surface(LinkError::ServiceMissing(self.ids.service));
            return;
        };
        match self.radio.discover_characteristics(svc.handle, self.ids.characteristic) {
            Ok(()) => {
                self.service = Some(svc.handle);
                self.transition(ConnectionState::DiscoveringCharacteristics);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_characteristics(&mut self, service: ServiceHandle, characteristics: &[GattCharacteristic]) {
        if self.state != ConnectionState::DiscoveringCharacteristics || self.service != Some(service) {
            debug!("link: characteristics of {:?} ignored while {}", service, self.state);
            return;
        }
        let Some(ch) = characteristics.iter().find(|c| c.uuid == self.ids.characteristic) else {
            warn!("link: service {:?} lacks the autopilot characteristic", service);
            self.surface(LinkError::CharacteristicMissing(self.ids.characteristic));
            return;
        };

        let subscribed = self
            .radio
            .subscribe(ch.handle)
            .and_then(|()| self.radio.read_once(ch.handle));
        if let Err(e) = subscribed {
            self.fail(e);
            return;
        }

        self.characteristic = Some(ch.handle);
        self.store.mark_connected();
        self.transition(ConnectionState::Ready);
    }

    fn on_value(&mut self, characteristic: CharHandle, value: &[u8]) {
        if self.state != ConnectionState::Ready || self.characteristic != Some(characteristic) {
            debug!("link: value on {:?} ignored while {}", characteristic, self.state);
            return;
        }
        match frame::decode(value) {
            Ok(record) => self.store.publish(record),
            Err(e) => {
                // Next frame is never far off; keep the last good record.
                debug!("link: {}", e);
                let _ = self.notices.send(LinkNotice::Error(e.into()));
            }
        }
    }

    fn on_write_completed(&mut self, characteristic: CharHandle, result: Result<(), String>) {
        match result {
            Ok(()) => debug!("link: write to {:?} acknowledged", characteristic),
            Err(reason) => self.surface(LinkError::WriteRejected(reason)),
        }
    }

    /// Forget the peer and fall back to Idle.
    fn drop_link(&mut self) {
        self.peer = None;
        self.service = None;
        self.characteristic = None;
        self.store.mark_disconnected();
        if self.state != ConnectionState::Idle {
            self.transition(ConnectionState::Idle);
        }
    }

    fn fail(&mut self, e: RadioError) {
        self.drop_link();
        self.surface(e.into());
    }

    fn surface(&self, e: LinkError) {
        warn!("link: {}", e);
        let _ = self.notices.send(LinkNotice::Error(e));
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        self.state = to;
        self.phase_since = Instant::now();
        self.stall_reported = false;
        info!("link: {} -> {}", from, to);
        let _ = self.notices.send(LinkNotice::State { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RadioCall, RecordingRadio};
    use helm_proto::TelemetryRecord;

    const PEER: PeerId = PeerId(7);
    const SVC: ServiceHandle = ServiceHandle(0x10);
    const CH: CharHandle = CharHandle(0x12);

    fn machine() -> LinkMachine<RecordingRadio> {
        LinkMachine::new(RecordingRadio::new(), LinkSettings::default())
    }

    fn services() -> RadioEvent {
        RadioEvent::ServicesFound {
            peer: PEER,
            services: vec![
                GattService { handle: ServiceHandle(0x01), uuid: Uuid::from_u128(0x1800) },
                GattService { handle: SVC, uuid: LinkIds::default().service },
            ],
        }
    }

    fn characteristics() -> RadioEvent {
        RadioEvent::CharacteristicsFound {
            service: SVC,
            characteristics: vec![GattCharacteristic { handle: CH, uuid: LinkIds::default().characteristic }],
        }
    }

    fn value(bytes: &[u8]) -> RadioEvent {
        RadioEvent::ValueChanged { characteristic: CH, value: Bytes::copy_from_slice(bytes) }
    }

    fn ready(m: &mut LinkMachine<RecordingRadio>) {
        for ev in [RadioEvent::AdapterReady, RadioEvent::AdvertiserFound(PEER), RadioEvent::Connected(PEER), services(), characteristics()] {
            m.handle(ev);
        }
        assert_eq!(m.state(), ConnectionState::Ready);
    }

    fn drain(rx: &mut broadcast::Receiver<LinkNotice>) -> Vec<LinkNotice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[test]
    fn handshake_visits_every_state_once() {
        let mut m = machine();
        let mut rx = m.notices();
        ready(&mut m);

        let states: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                LinkNotice::State { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Scanning,
                ConnectionState::Connecting,
                ConnectionState::DiscoveringServices,
                ConnectionState::DiscoveringCharacteristics,
                ConnectionState::Ready,
            ]
        );

        let ids = LinkIds::default();
        assert_eq!(
            m.radio().calls(),
            vec![
                RadioCall::Scan(ids.service),
                RadioCall::StopScan,
                RadioCall::Connect(PEER),
                RadioCall::DiscoverServices(PEER, ids.service),
                RadioCall::DiscoverCharacteristics(SVC, ids.characteristic),
                RadioCall::Subscribe(CH),
                RadioCall::ReadOnce(CH),
            ]
        );
        assert!(m.store().snapshot().connected);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let mut m = machine();
        m.handle(RadioEvent::Connected(PEER));
        m.handle(characteristics());
        m.handle(value(&[0u8; frame::FRAME_LEN]));
        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(m.radio().calls().is_empty());
    }

    #[test]
    fn first_advertiser_wins() {
        let mut m = machine();
        m.handle(RadioEvent::AdapterReady);
        m.handle(RadioEvent::AdvertiserFound(PeerId(1)));
        m.handle(RadioEvent::AdvertiserFound(PeerId(2)));
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.peer(), Some(PeerId(1)));

        let connects: Vec<_> = m.radio().calls().into_iter().filter(|c| matches!(c, RadioCall::Connect(_))).collect();
        assert_eq!(connects, vec![RadioCall::Connect(PeerId(1))]);

        // An ack from the loser does not advance the machine.
        m.handle(RadioEvent::Connected(PeerId(2)));
        assert_eq!(m.state(), ConnectionState::Connecting);
        m.handle(RadioEvent::Connected(PeerId(1)));
        assert_eq!(m.state(), ConnectionState::DiscoveringServices);
    }

    #[test]
    fn notifications_publish_decoded_records() {
        let mut m = machine();
        ready(&mut m);
        let rec = TelemetryRecord { kp: 2.0, heading: 133.0, homing_complete: true, ..Default::default() };
        m.handle(value(&frame::encode(&rec)));

        let s = m.store().snapshot();
        assert_eq!(s.record, rec);
        assert!(s.connected);
    }

    #[test]
    fn malformed_frame_keeps_previous_record() {
        let mut m = machine();
        ready(&mut m);
        let rec = TelemetryRecord { xte: 3.5, ..Default::default() };
        m.handle(value(&frame::encode(&rec)));

        let mut rx = m.notices();
        m.handle(value(&[1, 2, 3]));

        assert_eq!(m.state(), ConnectionState::Ready);
        assert_eq!(m.store().snapshot().record, rec);
        assert_eq!(
            drain(&mut rx),
            vec![LinkNotice::Error(LinkError::MalformedFrame(FrameError::Malformed {
                expected: frame::FRAME_LEN,
                actual: 3
            }))]
        );
    }

    #[test]
    fn disconnect_then_adapter_ready_rescans() {
        let mut m = machine();
        ready(&mut m);
        let rec = TelemetryRecord { rudder_angle: -12.0, ..Default::default() };
        m.handle(value(&frame::encode(&rec)));

        m.handle(RadioEvent::Disconnected(PEER));
        assert_eq!(m.state(), ConnectionState::Idle);
        let s = m.store().snapshot();
        assert!(!s.connected);
        assert_eq!(s.record, rec);
        assert_eq!(m.send_gains(Gains::new(1.0, 1.0, 1.0)), Err(LinkError::NotReady(ConnectionState::Idle)));

        m.handle(RadioEvent::AdapterReady);
        assert_eq!(m.state(), ConnectionState::Scanning);
    }

    #[test]
    fn disconnect_from_other_peer_is_ignored() {
        let mut m = machine();
        ready(&mut m);
        m.handle(RadioEvent::Disconnected(PeerId(99)));
        assert_eq!(m.state(), ConnectionState::Ready);
    }

    #[test]
    fn send_gains_quantizes_over_current_record() {
        let mut m = machine();
        ready(&mut m);
        let rec = TelemetryRecord { kp: 9.0, heading: 211.0, target_motor_position: 77.0, ..Default::default() };
        m.handle(value(&frame::encode(&rec)));

        m.send_gains(Gains::new(1.23, 4.56, 7.89)).unwrap();

        let (written, ack) = m.radio().last_write().expect("write issued");
        assert!(ack);
        assert_eq!(written.len(), frame::FRAME_LEN);
        let sent = frame::decode(&written).unwrap();
        assert_eq!(sent.gains(), Gains::new(1.2, 4.6, 7.9));
        assert_eq!(sent.heading, 211.0);
        assert_eq!(sent.target_motor_position, 77.0);

        // Local state only changes when the autopilot reports back.
        assert_eq!(m.store().snapshot().record.kp, 9.0);
    }

    #[test]
    fn send_gains_before_ready_is_an_error() {
        let mut m = machine();
        assert_eq!(m.send_gains(Gains::default()), Err(LinkError::NotReady(ConnectionState::Idle)));
        m.handle(RadioEvent::AdapterReady);
        m.handle(RadioEvent::AdvertiserFound(PEER));
        assert_eq!(m.send_gains(Gains::default()), Err(LinkError::NotReady(ConnectionState::Connecting)));
        assert!(m.radio().last_write().is_none());
    }

    #[test]
    fn non_finite_gain_is_refused() {
        let mut m = machine();
        ready(&mut m);
        let err = m.send_gains(Gains::new(1.0, f32::NAN, 1.0)).unwrap_err();
        assert!(matches!(err, LinkError::InvalidGain { name: "ki", .. }));
        assert!(m.radio().last_write().is_none());
    }

    #[test]
    fn gain_rounding_past_f32_max_is_refused() {
        let mut m = machine();
        ready(&mut m);
        let err = m.send_gains(Gains::new(f32::MAX, 1.0, 1.0)).unwrap_err();
        assert_eq!(err, LinkError::InvalidGain { name: "kp", value: f32::INFINITY });
        assert!(m.radio().last_write().is_none());
    }

    #[test]
    fn write_rejection_is_surfaced() {
        let mut m = machine();
        ready(&mut m);
        let mut rx = m.notices();
        m.handle(RadioEvent::WriteCompleted { characteristic: CH, result: Err("gatt error 0x03".into()) });
        assert_eq!(drain(&mut rx), vec![LinkNotice::Error(LinkError::WriteRejected("gatt error 0x03".into()))]);
        assert_eq!(m.state(), ConnectionState::Ready);
    }

    #[test]
    fn write_failure_on_issue_is_returned() {
        let mut m = LinkMachine::new(RecordingRadio::new().failing_writes(), LinkSettings::default());
        ready(&mut m);
        let err = m.send_gains(Gains::new(1.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, LinkError::Radio(RadioError::Failed { op: "write", .. })));
    }

    #[test]
    fn missing_service_stays_put() {
        let mut m = machine();
        m.handle(RadioEvent::AdapterReady);
        m.handle(RadioEvent::AdvertiserFound(PEER));
        m.handle(RadioEvent::Connected(PEER));
        let mut rx = m.notices();
        m.handle(RadioEvent::ServicesFound { peer: PEER, services: vec![] });
        assert_eq!(m.state(), ConnectionState::DiscoveringServices);
        assert_eq!(drain(&mut rx), vec![LinkNotice::Error(LinkError::ServiceMissing(LinkIds::default().service))]);
    }

    #[test]
    fn missing_characteristic_stays_put() {
        let mut m = machine();
        for ev in [RadioEvent::AdapterReady, RadioEvent::AdvertiserFound(PEER), RadioEvent::Connected(PEER), services()] {
            m.handle(ev);
        }
        m.handle(RadioEvent::CharacteristicsFound { service: SVC, characteristics: vec![] });
        assert_eq!(m.state(), ConnectionState::DiscoveringCharacteristics);
        assert_eq!(m.send_gains(Gains::default()), Err(LinkError::NotReady(ConnectionState::DiscoveringCharacteristics)));
    }

    #[test]
    fn adapter_loss_drops_link() {
        let mut m = machine();
        ready(&mut m);
        let mut rx = m.notices();
        m.handle(RadioEvent::AdapterUnavailable);
        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(!m.store().snapshot().connected);
        assert_eq!(
            drain(&mut rx),
            vec![
                LinkNotice::State { from: ConnectionState::Ready, to: ConnectionState::Idle },
                LinkNotice::Error(LinkError::AdapterUnavailable),
            ]
        );
    }

    #[test]
    fn stall_reported_once_per_phase() {
        let settings = LinkSettings { phase_timeout: Some(Duration::from_secs(5)), ..Default::default() };
        let mut m = LinkMachine::new(RecordingRadio::new(), settings);
        m.handle(RadioEvent::AdapterReady);

        // Scanning may take as long as it takes.
        m.poll_stall(Instant::now() + Duration::from_secs(60));
        m.handle(RadioEvent::AdvertiserFound(PEER));

        let mut rx = m.notices();
        m.poll_stall(Instant::now() + Duration::from_secs(1));
        assert!(drain(&mut rx).is_empty());

        m.poll_stall(Instant::now() + Duration::from_secs(6));
        m.poll_stall(Instant::now() + Duration::from_secs(7));
        let notices = drain(&mut rx);
        assert_eq!(notices.len(), 1);
        assert!(matches!(
            notices[0],
            LinkNotice::Error(LinkError::PhaseStalled { state: ConnectionState::Connecting, .. })
        ));
        assert_eq!(m.state(), ConnectionState::Connecting);

        // Entering the next phase re-arms the watchdog.
        m.handle(RadioEvent::Connected(PEER));
        drain(&mut rx);
        m.poll_stall(Instant::now() + Duration::from_secs(6));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn scan_failure_stays_idle() {
        let mut m = LinkMachine::new(RecordingRadio::new().unavailable(), LinkSettings::default());
        let mut rx = m.notices();
        m.handle(RadioEvent::AdapterReady);
        assert_eq!(m.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![LinkNotice::Error(LinkError::AdapterUnavailable)]);
    }

    #[test]
    fn characteristics_of_another_service_are_ignored() {
        let mut m = machine();
        for ev in [RadioEvent::AdapterReady, RadioEvent::AdvertiserFound(PEER), RadioEvent::Connected(PEER), services()] {
            m.handle(ev);
        }
        let mut rx = m.notices();
        m.handle(RadioEvent::CharacteristicsFound {
            service: ServiceHandle(0x99),
            characteristics: vec![GattCharacteristic { handle: CharHandle(0x9a), uuid: LinkIds::default().characteristic }],
        });
        assert_eq!(m.state(), ConnectionState::DiscoveringCharacteristics);
        assert!(drain(&mut rx).is_empty());
        assert!(!m.radio().calls().iter().any(|c| matches!(c, RadioCall::Subscribe(_))));

        m.handle(characteristics());
        assert_eq!(m.state(), ConnectionState::Ready);
    }
}
