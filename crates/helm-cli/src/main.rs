use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use helm_link::doctor as link_doctor;
use helm_link::sim::{SimAutopilot, SimConfig};
use helm_link::{ConnectionState, LinkConfig, LinkHandle, LinkMachine, LinkNotice};
use helm_proto::{frame, TelemetryRecord};

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Parser)]
#[command(name = "helm", version, about = "Autopilot Helm - supervise and tune a wireless autopilot")]
struct Cli {
    /// TOML config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    /// Connect to the simulated autopilot and stream telemetry.
    Run {
        /// Stop after this many seconds.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Gains to send once the link is ready (all three required together).
        #[arg(long, requires_all = ["ki", "kd"])]
        kp: Option<f32>,
        #[arg(long, requires_all = ["kp", "kd"])]
        ki: Option<f32>,
        #[arg(long, requires_all = ["kp", "ki"])]
        kd: Option<f32>,
    },
    /// Decode a hex-encoded frame.
    Decode { hex: String },
    /// Encode a TOML record file as a hex frame.
    Encode { path: String },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    sim: SimConfig,
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()) };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run { seconds, kp, ki, kd } => {
            let gains = match (kp, ki, kd) {
                (Some(kp), Some(ki), Some(kd)) => Some((kp, ki, kd)),
                _ => None,
            };
            run(&cfg, Duration::from_secs(seconds), gains).await?
        }
        Command::Decode { hex } => decode_cmd(&hex)?,
        Command::Encode { path } => encode_cmd(&path)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    link_doctor::check_link(&cfg.link)?;
    link_doctor::check_sim(&cfg.sim)?;
    if cfg.link.phase_timeout_ms.is_none() {
        info!("doctor: no link.phase_timeout_ms, stalled handshakes will not be reported");
    }
    info!("doctor: OK");
    Ok(())
}

fn decode_cmd(hex_frame: &str) -> Result<()> {
    let bytes = hex::decode(hex_frame.trim()).context("frame is not valid hex")?;
    let record = frame::decode(&bytes)?;
    println!("{}", record);
    Ok(())
}

fn encode_cmd(path: &str) -> Result<()> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read record {}", path))?;
    let record: TelemetryRecord = toml::from_str(&s).context("parse record toml")?;
    println!("{}", hex::encode(frame::encode(&record)));
    Ok(())
}

async fn run(cfg: &Config, duration: Duration, gains: Option<(f32, f32, f32)>) -> Result<()> {
    info!("run: starting");
    let settings = cfg.link.settings()?;

    let (ev_tx, ev_rx) = mpsc::unbounded_channel();
    let sim = SimAutopilot::new(settings.ids, &cfg.sim, ev_tx);
    let machine = LinkMachine::new(sim.clone(), settings);
    let (link, task) = helm_link::spawn(machine, ev_rx);

    tokio::spawn(log_notices(link.notices()));

    if let Some((kp, ki, kd)) = gains {
        let link = link.clone();
        tokio::spawn(async move {
            if let Err(e) = send_when_ready(&link, kp, ki, kd).await {
                warn!("run: gains not sent: {}", e);
            }
        });
    }

    sim.power_on().context("power on simulated autopilot")?;

    let period = cfg.sim.telemetry_interval();
    let mut ticker = tokio::time::interval(period);
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                sim.tick(period)?;
                let s = link.snapshot();
                info!(
                    "state={} connected={} heading={:.1} xte={:.2} rudder={:.1} kp={} ki={} kd={} homing={} age={:?}",
                    link.state(), s.connected, s.record.heading, s.record.xte, s.record.rudder_angle,
                    s.record.kp, s.record.ki, s.record.kd, s.record.homing_complete, s.age(),
                );
            }
        }
    }

    task.abort();
    info!("run: done");
    Ok(())
}

async fn send_when_ready(link: &LinkHandle, kp: f32, ki: f32, kd: f32) -> Result<()> {
    link.wait_for_state(ConnectionState::Ready).await?;
    link.send_gains(kp, ki, kd).await?;
    Ok(())
}

async fn log_notices(mut rx: broadcast::Receiver<LinkNotice>) {
    loop {
        match rx.recv().await {
            Ok(LinkNotice::State { from, to }) => info!("notice: {} -> {}", from, to),
            Ok(LinkNotice::Error(e)) => warn!("notice: {}", e),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("notice: {} dropped", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_is_valid() {
        let cfg: Config = toml::from_str(include_str!("../../../config/helm.toml")).unwrap();
        assert_eq!(cfg.sim.peers, 2);
        assert_eq!(cfg.link.phase_timeout_ms, Some(5000));
        doctor(&cfg).unwrap();
    }

    #[test]
    fn sample_record_encodes() {
        let record: TelemetryRecord = toml::from_str(include_str!("../../../config/record.toml")).unwrap();
        let hex_frame = hex::encode(frame::encode(&record));
        assert_eq!(hex_frame.len(), frame::FRAME_LEN * 2);
        assert_eq!(frame::decode(&hex::decode(&hex_frame).unwrap()).unwrap(), record);
    }

    #[test]
    fn gains_flags_come_as_a_set() {
        assert!(Cli::try_parse_from(["helm", "run", "--kp", "1.0"]).is_err());
        let cli = Cli::try_parse_from(["helm", "run", "--kp", "1", "--ki", "0.1", "--kd", "0.5"]).unwrap();
        assert!(matches!(cli.cmd, Command::Run { kp: Some(_), ki: Some(_), kd: Some(_), .. }));
    }
}
