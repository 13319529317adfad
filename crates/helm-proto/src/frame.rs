//! Fixed-layout telemetry/command frame.
//!
//! The autopilot sends and accepts the same frame in both directions:
//!
//! | Offset | Size | Field                  |
//! |--------|------|------------------------|
//! | 0      | 4    | kp                     |
//! | 4      | 4    | ki                     |
//! | 8      | 4    | kd                     |
//! | 12     | 4    | bearing_to_waypoint    |
//! | 16     | 4    | dest_lat               |
//! | 20     | 4    | dest_lon               |
//! | 24     | 4    | prev_dest_lat          |
//! | 28     | 4    | prev_dest_lon          |
//! | 32     | 4    | heading                |
//! | 36     | 4    | xte                    |
//! | 40     | 4    | prev_xte               |
//! | 44     | 4    | prev_time              |
//! | 48     | 4    | prev_bearing           |
//! | 52     | 4    | integral_xte           |
//! | 56     | 4    | derivative_xte         |
//! | 60     | 4    | time_delta             |
//! | 64     | 4    | rudder_angle           |
//! | 68     | 4    | rudder_position        |
//! | 72     | 4    | target_motor_position  |
//! | 76     | 1    | homing_complete        |
//!
//! Floats are IEEE-754 binary32, little-endian. No padding.

use thiserror::Error;

use crate::telemetry::TelemetryRecord;

/// Number of f32 fields ahead of the trailing flag byte.
pub const FLOAT_FIELDS: usize = 19;

/// Byte offset of the `homing_complete` flag.
pub const HOMING_OFFSET: usize = FLOAT_FIELDS * 4;

/// Total frame length in bytes.
pub const FRAME_LEN: usize = HOMING_OFFSET + 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },
}

/// Decode one frame. The input must be exactly [`FRAME_LEN`] bytes.
pub fn decode(bytes: &[u8]) -> Result<TelemetryRecord, FrameError> {
    if bytes.len() != FRAME_LEN {
        return Err(FrameError::Malformed { expected: FRAME_LEN, actual: bytes.len() });
    }

    let mut floats = [0f32; FLOAT_FIELDS];
    for (i, chunk) in bytes[..HOMING_OFFSET].chunks_exact(4).enumerate() {
        floats[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    // Any non-zero byte is true, matching how the firmware's bool is read.
    let homing_complete = bytes[HOMING_OFFSET] != 0;

    Ok(TelemetryRecord::from_floats(floats, homing_complete))
}

pub fn encode(record: &TelemetryRecord) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    for (i, v) in record.floats().iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    out[HOMING_OFFSET] = u8::from(record.homing_complete);
    out
}
