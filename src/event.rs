//! Event frame payloads.
//!
//! Events carry no timestamp of their own on the wire; the chunk decoder
//! assigns each one the time of the next main frame (or the last main
//! frame's time when nothing follows).

use serde::{Deserialize, Serialize};

/// Event kind byte values used on the wire.
pub(crate) const EVENT_SYNC_BEEP: i32 = 0;
pub(crate) const EVENT_LOGGING_RESUME: i32 = 14;
pub(crate) const EVENT_DISARM: i32 = 15;
pub(crate) const EVENT_FLIGHT_MODE: i32 = 30;
pub(crate) const EVENT_LOG_END: i32 = 255;

/// Exact payload of a genuine log-end event.
pub(crate) const END_OF_LOG_MESSAGE: &str = "End of log\0";

/// A decoded event frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Microsecond timestamp borrowed from the surrounding main frames;
    /// `None` until the chunk decoder fills it in.
    pub time: Option<i64>,
    pub data: LogEventData,
}

/// Kind-specific event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEventData {
    /// The flight controller beeped for log/video synchronization.
    SyncBeep { beep_time: u32 },
    /// Flight mode flags changed.
    FlightMode { new_flags: u32, last_flags: u32 },
    /// The craft disarmed.
    Disarm { reason: u32 },
    /// Logging restarted after a pause; carries the loop state to resume
    /// validation from.
    LoggingResume { log_iteration: u32, current_time: u32 },
    /// End of this sub-log.
    LogEnd,
}

impl LogEvent {
    pub(crate) fn new(data: LogEventData) -> Self {
        Self { time: None, data }
    }
}
