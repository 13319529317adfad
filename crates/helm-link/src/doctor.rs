use anyhow::Result;

use crate::sim::SimConfig;
use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    let s = cfg.settings()?;
    anyhow::ensure!(!s.ids.service.is_nil(), "link.service_uuid must not be nil");
    anyhow::ensure!(!s.ids.characteristic.is_nil(), "link.characteristic_uuid must not be nil");
    anyhow::ensure!(s.ids.service != s.ids.characteristic, "link.service_uuid and link.characteristic_uuid must differ");
    if let Some(ms) = cfg.phase_timeout_ms {
        anyhow::ensure!((100..=60_000).contains(&ms), "link.phase_timeout_ms should be 100..60000");
    }
    Ok(())
}

pub fn check_sim(cfg: &SimConfig) -> Result<()> {
    anyhow::ensure!(cfg.peers >= 1, "sim.peers must be >= 1");
    anyhow::ensure!(cfg.telemetry_interval_ms >= 10, "sim.telemetry_interval_ms too small");
    Ok(())
}
