pub mod frame;
pub mod telemetry;

pub use frame::{decode, encode, FrameError, FRAME_LEN};
pub use telemetry::{Gains, TelemetryRecord};
