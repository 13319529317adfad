use serde::{Deserialize, Serialize};
use std::fmt;

/// One snapshot of autopilot state as reported by the controller.
///
/// Field order here is the wire order; see [`crate::frame`] for the layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRecord {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub bearing_to_waypoint: f32,    // degrees
    pub dest_lat: f32,               // degrees
    pub dest_lon: f32,               // degrees
    pub prev_dest_lat: f32,          // degrees
    pub prev_dest_lon: f32,          // degrees
    pub heading: f32,                // degrees
    pub xte: f32,                    // cross-track error
    pub prev_xte: f32,               // cross-track error
    pub prev_time: f32,              // ms counter
    pub prev_bearing: f32,           // degrees
    pub integral_xte: f32,           // PID accumulator
    pub derivative_xte: f32,         // PID accumulator
    pub time_delta: f32,             // seconds
    pub rudder_angle: f32,           // degrees
    pub rudder_position: f32,        // actuator position
    pub target_motor_position: f32,  // actuator position
    pub homing_complete: bool,
}

impl TelemetryRecord {
    pub fn gains(&self) -> Gains {
        Gains { kp: self.kp, ki: self.ki, kd: self.kd }
    }

    /// Copy of this record with the PID gains replaced.
    pub fn with_gains(&self, gains: Gains) -> Self {
        Self { kp: gains.kp, ki: gains.ki, kd: gains.kd, ..*self }
    }

    /// Bitwise equality, so records carrying NaN compare equal to themselves.
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.floats()
            .iter()
            .zip(other.floats().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
            && self.homing_complete == other.homing_complete
    }

    pub(crate) fn floats(&self) -> [f32; crate::frame::FLOAT_FIELDS] {
        [
            self.kp,
            self.ki,
            self.kd,
            self.bearing_to_waypoint,
            self.dest_lat,
            self.dest_lon,
            self.prev_dest_lat,
            self.prev_dest_lon,
            self.heading,
            self.xte,
            self.prev_xte,
            self.prev_time,
            self.prev_bearing,
            self.integral_xte,
            self.derivative_xte,
            self.time_delta,
            self.rudder_angle,
            self.rudder_position,
            self.target_motor_position,
        ]
    }

    pub(crate) fn from_floats(f: [f32; crate::frame::FLOAT_FIELDS], homing_complete: bool) -> Self {
        Self {
            kp: f[0],
            ki: f[1],
            kd: f[2],
            bearing_to_waypoint: f[3],
            dest_lat: f[4],
            dest_lon: f[5],
            prev_dest_lat: f[6],
            prev_dest_lon: f[7],
            heading: f[8],
            xte: f[9],
            prev_xte: f[10],
            prev_time: f[11],
            prev_bearing: f[12],
            integral_xte: f[13],
            derivative_xte: f[14],
            time_delta: f[15],
            rudder_angle: f[16],
            rudder_position: f[17],
            target_motor_position: f[18],
            homing_complete,
        }
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kp: {}", self.kp)?;
        writeln!(f, "ki: {}", self.ki)?;
        writeln!(f, "kd: {}", self.kd)?;
        writeln!(f, "bearing_to_waypoint: {}", self.bearing_to_waypoint)?;
        writeln!(f, "dest_lat: {}", self.dest_lat)?;
        writeln!(f, "dest_lon: {}", self.dest_lon)?;
        writeln!(f, "prev_dest_lat: {}", self.prev_dest_lat)?;
        writeln!(f, "prev_dest_lon: {}", self.prev_dest_lon)?;
        writeln!(f, "heading: {}", self.heading)?;
        writeln!(f, "xte: {}", self.xte)?;
        writeln!(f, "prev_xte: {}", self.prev_xte)?;
        writeln!(f, "prev_time: {}", self.prev_time)?;
        writeln!(f, "prev_bearing: {}", self.prev_bearing)?;
        writeln!(f, "integral_xte: {}", self.integral_xte)?;
        writeln!(f, "derivative_xte: {}", self.derivative_xte)?;
        writeln!(f, "time_delta: {}", self.time_delta)?;
        writeln!(f, "rudder_angle: {}", self.rudder_angle)?;
        writeln!(f, "rudder_position: {}", self.rudder_position)?;
        writeln!(f, "target_motor_position: {}", self.target_motor_position)?;
        write!(f, "homing_complete: {}", self.homing_complete)
    }
}

/// PID gains as entered on the handheld.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Gains {
    /// Wire resolution of a gain value.
    pub const STEP: f32 = 0.1;

    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    /// Round every gain half-up to one decimal place.
    pub fn quantized(&self) -> Self {
        Self {
            kp: quantize(self.kp),
            ki: quantize(self.ki),
            kd: quantize(self.kd),
        }
    }

    /// First gain that is not a finite number, by name.
    pub fn non_finite(&self) -> Option<(&'static str, f32)> {
        [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)]
            .into_iter()
            .find(|(_, v)| !v.is_finite())
    }
}

fn quantize(v: f32) -> f32 {
    // 1/0.1 in f32 is a hair under 10; round so the scale is exact.
    let steps = (1.0 / Gains::STEP).round();
    (v * steps + 0.5).floor() / steps
}
