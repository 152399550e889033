//! Sub-log discovery and indexing.
//!
//! A physical log file concatenates one sub-log per arming session, each
//! introduced by the fixed product banner. The indexer locates those
//! boundaries, then makes one pass over every sub-log recording an entry
//! per fourth I-frame: its time and byte offset (the random-access
//! points), the mean motor output (the activity summary), and the slow
//! state in effect just before it (so a chunk can be decoded without
//! replaying anything earlier).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::LogEventData;
use crate::header::{LogHeader, TIME_FIELD_INDEX, FrameType};
use crate::parser::{FrameEvent, LogParser};
use crate::stats::LogStats;
use crate::stream::ByteStream;

/// Byte-exact banner that opens every sub-log.
pub const LOG_START_MARKER: &[u8] =
    b"H Product:Blackbox flight data recorder by Nicholas Sherlock\n";

/// Every this many I-frames, the indexer records a random-access point.
const IFRAMES_PER_CHUNK: usize = 4;

/// Index of one sub-log: random-access points plus summary state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogDirectory {
    /// Byte offset of the sub-log's banner.
    pub log_start: usize,
    /// Byte offset one past the sub-log (the next banner, or buffer end).
    pub log_end: usize,
    /// Time of every fourth I-frame, one entry per chunk.
    pub times: Vec<i64>,
    /// Byte offset of every fourth I-frame, aligned with `times`.
    pub offsets: Vec<usize>,
    /// Rounded mean motor value at each chunk start; empty when the log
    /// has no motor fields.
    pub avg_throttle: Vec<i32>,
    /// Slow-frame snapshot in effect at each chunk start.
    pub initial_slow: Vec<Vec<i32>>,
    /// Whether each chunk contains at least one event.
    pub has_event: Vec<bool>,
    pub min_time: Option<i64>,
    pub max_time: Option<i64>,
    pub stats: LogStats,
    /// Non-fatal for the file as a whole, but this sub-log cannot be
    /// opened while set.
    pub error: Option<String>,
}

impl LogDirectory {
    pub fn chunk_count(&self) -> usize {
        self.times.len()
    }
}

/// Split the buffer at every banner occurrence and index each sub-log.
pub fn index_sub_logs(data: &[u8]) -> Vec<LogDirectory> {
    let stream = ByteStream::new(data);
    let boundaries = stream.all_indices_of(LOG_START_MARKER);
    // The final entry is the end-of-buffer sentinel.
    let count = boundaries.len() - 1;
    debug!("found {} sub-log(s)", count);

    (0..count).map(|i| index_one(data, boundaries[i], boundaries[i + 1])).collect()
}

fn index_one(data: &[u8], log_start: usize, log_end: usize) -> LogDirectory {
    let mut directory =
        LogDirectory { log_start, log_end, ..Default::default() };

    let mut stream = ByteStream::with_bounds(data, log_start, log_end);
    let header = match LogHeader::parse(&mut stream) {
        Ok(header) => header,
        Err(err) => {
            warn!("sub-log at offset {} has an unusable header: {}", log_start, err);
            directory.error = Some(err.to_string());
            return directory;
        }
    };

    let motor_indices: Vec<usize> = (0..8)
        .filter_map(|m| header.frame_defs.intra.index_of(&format!("motor[{m}]")))
        .collect();

    let mut parser = LogParser::new(&header, stream);
    let mut last_slow: Vec<i32> = parser.last_slow().to_vec();
    let mut iframe_count = 0usize;
    let mut saw_end_marker = false;

    loop {
        match parser.next_event() {
            Ok(Some(FrameEvent::Main { kind, frame, valid, offset })) => {
                if !valid {
                    continue;
                }
                let time = frame[TIME_FIELD_INDEX] as i64;
                if kind == FrameType::Intra {
                    if iframe_count % IFRAMES_PER_CHUNK == 0 {
                        directory.times.push(time);
                        directory.offsets.push(offset);
                        if !motor_indices.is_empty() {
                            let total: i64 =
                                motor_indices.iter().map(|&m| frame[m] as i64).sum();
                            let mean = total as f64 / motor_indices.len() as f64;
                            directory.avg_throttle.push(mean.round() as i32);
                        }
                        directory.initial_slow.push(last_slow.clone());
                        directory.has_event.push(false);
                    }
                    iframe_count += 1;
                    if directory.min_time.is_none() {
                        directory.min_time = Some(time);
                    }
                }
                directory.max_time =
                    Some(directory.max_time.map_or(time, |current| current.max(time)));
            }
            Ok(Some(FrameEvent::Slow { frame })) => last_slow = frame,
            Ok(Some(FrameEvent::Event(event))) => {
                if event.data == LogEventData::LogEnd {
                    saw_end_marker = true;
                }
                if let Some(flag) = directory.has_event.last_mut() {
                    *flag = true;
                }
            }
            Ok(Some(FrameEvent::Corrupt { .. })) => {}
            Ok(None) => break,
            Err(err) => {
                warn!("sub-log at offset {} failed to decode: {}", log_start, err);
                directory.error = Some(err.to_string());
                break;
            }
        }
    }

    directory.stats = parser.into_stats();

    if directory.min_time.is_none() && directory.error.is_none() {
        directory.error = Some(if saw_end_marker {
            ": Logging paused, no data".to_string()
        } else {
            ": Log truncated, no data".to_string()
        });
    }

    directory
}
