use helm_proto::Gains;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::info;

use crate::machine::{ConnectionState, LinkError, LinkMachine, LinkNotice};
use crate::radio::{Radio, RadioEvent};
use crate::store::{Snapshot, TelemetryStore};

const COMMAND_QUEUE: usize = 8;

#[derive(Debug)]
enum LinkCommand {
    SendGains {
        gains: Gains,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
}

/// Display-side handle to a running link task.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    commands: mpsc::Sender<LinkCommand>,
    store: TelemetryStore,
    notices: broadcast::Sender<LinkNotice>,
    state: watch::Receiver<ConnectionState>,
}

impl LinkHandle {
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn notices(&self) -> broadcast::Receiver<LinkNotice> {
        self.notices.subscribe()
    }

    /// Waits until the gains are handed to the radio, not for the peer's ack.
    pub async fn send_gains(&self, kp: f32, ki: f32, kd: f32) -> Result<(), LinkError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(LinkCommand::SendGains { gains: Gains::new(kp, ki, kd), reply })
            .await
            .map_err(|_| LinkError::Closed)?;
        rx.await.map_err(|_| LinkError::Closed)?
    }

    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), LinkError> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == target).await.map_err(|_| LinkError::Closed)?;
        Ok(())
    }
}

/// Run `machine` on its own task. Radio events and gain commands are
/// serialised onto that task; the task ends when `events` closes.
pub fn spawn<R>(machine: LinkMachine<R>, events: mpsc::UnboundedReceiver<RadioEvent>) -> (LinkHandle, JoinHandle<()>)
where
    R: Radio + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let (state_tx, state_rx) = watch::channel(machine.state());
    let handle = LinkHandle {
        commands: cmd_tx,
        store: machine.store(),
        notices: machine.notice_sender(),
        state: state_rx,
    };
    let task = tokio::spawn(run(machine, events, cmd_rx, state_tx));
    (handle, task)
}

async fn run<R: Radio>(
    mut machine: LinkMachine<R>,
    mut events: mpsc::UnboundedReceiver<RadioEvent>,
    mut commands: mpsc::Receiver<LinkCommand>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut stall_check = machine.phase_timeout().map(stall_interval);

    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ev) => machine.handle(ev),
                None => break,
            },
            Some(cmd) = commands.recv() => match cmd {
                LinkCommand::SendGains { gains, reply } => {
                    let _ = reply.send(machine.send_gains(gains));
                }
            },
            _ = tick(&mut stall_check) => machine.poll_stall(Instant::now()),
        }
        let now = machine.state();
        state_tx.send_if_modified(|s| {
            let changed = *s != now;
            *s = now;
            changed
        });
    }

    info!("link: radio event stream closed");
    machine.store().mark_disconnected();
}

fn stall_interval(timeout: Duration) -> Interval {
    let mut iv = interval((timeout / 4).max(Duration::from_millis(10)));
    iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
    iv
}

async fn tick(iv: &mut Option<Interval>) {
    match iv {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}
