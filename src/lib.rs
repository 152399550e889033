//! Decoder for Betaflight/Cleanflight/INAV blackbox flight recorder logs.
//!
//! Blackbox logs are compact, delta-encoded binary telemetry written by a
//! flight controller during flight. One physical file can hold several
//! independent sub-logs (one per arming session), each an ASCII header
//! followed by a stream of variable-length binary frames. This crate turns
//! that stream back into a uniform, random-accessible time series of
//! per-iteration frames suitable for plotting and analysis.
//!
//! # Features
//!
//! - **Full frame codec**: variable-byte integers, ZigZag, the tagged
//!   group encodings, and the predictor chain that reconstructs absolute
//!   values from deltas against up to two frames of history
//! - **Damage tolerance**: corrupt frames are detected after the fact,
//!   reported, and skipped; decoding resynchronizes on the next intraframe
//! - **Random access**: every sub-log is indexed by every fourth I-frame,
//!   so any time range decodes without replaying the whole log
//! - **Derived fields**: PID sums, scaled RC commands, PID error and
//!   legacy motor copies are appended to every frame
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use flightlog::FlightLog;
//!
//! fn main() -> flightlog::Result<()> {
//!     let mut log = FlightLog::open("flight.bbl")?;
//!     println!("{} sub-log(s)", log.log_count());
//!
//!     log.open_log(0)?;
//!     let min = log.min_time()?.unwrap_or(0);
//!     let max = log.max_time()?.unwrap_or(0);
//!     for chunk in log.chunks_in_time_range(min, max)? {
//!         for frame in &chunk.frames {
//!             // frame[1] is the loop time in microseconds
//!             let _ = frame;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core decoding layers
mod error;
mod event;
mod frame;
mod header;
mod index;
mod parser;
mod sign;
mod stats;
mod stream;
mod units;

// Public facade
mod log;

pub use error::{DecodeError, Result};
pub use event::{LogEvent, LogEventData};
pub use frame::{Encoding, Predictor};
pub use header::{
    FirmwareType, FrameDef, FrameDefs, FrameType, ITERATION_FIELD_INDEX, LogHeader, SysConfig,
    TIME_FIELD_INDEX,
};
pub use index::{LOG_START_MARKER, LogDirectory, index_sub_logs};
pub use log::{
    ADDITIONAL_COMPUTED_FIELD_COUNT, ActivitySummary, FlightLog, FrameAtTime, LogChunk, StatsView,
};
pub use parser::{FrameEvent, LogParser};
pub use stats::{FieldStats, FrameTypeStats, LogStats};
pub use stream::{ByteStream, EOF};
pub use units::{
    gyro_raw_to_deg_per_sec, rc_command_raw_to_deg_per_sec, rc_command_raw_to_throttle,
    vbat_adc_to_millivolts,
};
