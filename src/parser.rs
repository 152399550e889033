//! Frame dispatcher and validator.
//!
//! The binary section of a sub-log is a stream of frames with one-byte
//! markers and no length prefix, so a frame can only be judged after the
//! fact: it was well formed if the next marker shows up where expected.
//! [`LogParser`] pulls one frame at a time, validates the previous frame
//! when the next marker is read, keeps the three-slot main-frame history
//! the predictors reconstruct deltas against, and resynchronizes one byte
//! past a corrupt frame's start.
//!
//! Consumers drain the parser through [`LogParser::next_event`]; both the
//! sub-log indexer and the chunk decoder are single passes over the same
//! iterator, with no shared callback state.

use tracing::{debug, trace};

use crate::error::Result;
use crate::event::{
    END_OF_LOG_MESSAGE, EVENT_DISARM, EVENT_FLIGHT_MODE, EVENT_LOGGING_RESUME, EVENT_LOG_END,
    EVENT_SYNC_BEEP, LogEvent, LogEventData,
};
use crate::frame::{PredictorContext, decode_frame};
use crate::header::{
    FrameType, ITERATION_FIELD_INDEX, LogHeader, TIME_FIELD_INDEX,
};
use crate::stats::LogStats;
use crate::stream::{ByteStream, EOF};

/// Longest frame the wire format can produce; anything longer is damage.
const MAX_FRAME_LENGTH: usize = 256;
/// A main frame more than this many iterations ahead of its predecessor is
/// rejected.
const MAXIMUM_ITERATION_JUMP: i64 = 5000;
/// A main frame more than this many microseconds ahead of its predecessor
/// is rejected.
const MAXIMUM_TIME_JUMP_US: i64 = 10_000_000;

/// One decoded item from the frame stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    /// A main (I or P) frame. `valid` is false when the frame failed
    /// validation; its values must not be trusted and the stream stays
    /// invalid until the next accepted I-frame.
    Main { kind: FrameType, frame: Vec<i32>, valid: bool, offset: usize },
    /// A slow frame; the parser has already folded it into its snapshot.
    Slow { frame: Vec<i32> },
    /// An event frame. Timestamps are filled in downstream.
    Event(LogEvent),
    /// A corrupt region was detected starting at `offset`; parsing resumed
    /// one byte past it.
    Corrupt { offset: usize },
}

struct PendingFrame {
    frame_type: FrameType,
    start: usize,
    premature_eof: bool,
}

/// Pull-based decoder for the binary section of one sub-log.
pub struct LogParser<'a> {
    stream: ByteStream<'a>,
    header: &'a LogHeader,

    history: [Vec<i32>; 3],
    current_slot: usize,
    previous_slot: Option<usize>,
    previous2_slot: Option<usize>,

    main_stream_is_valid: bool,
    last_main_iteration: Option<i32>,
    last_main_time: Option<i32>,
    last_skipped_frames: i32,
    last_slow: Vec<i32>,
    last_event: Option<LogEvent>,

    motor0_index: Option<usize>,
    stats: LogStats,

    pending: Option<PendingFrame>,
    held_marker: Option<i32>,
}

impl<'a> LogParser<'a> {
    /// Create a parser positioned at the stream's current cursor, which
    /// must point at the first frame marker after the header.
    pub fn new(header: &'a LogHeader, stream: ByteStream<'a>) -> Self {
        let main_count = header.frame_defs.intra.count();
        Self {
            stream,
            header,
            history: [vec![0; main_count], vec![0; main_count], vec![0; main_count]],
            current_slot: 0,
            previous_slot: None,
            previous2_slot: None,
            main_stream_is_valid: false,
            last_main_iteration: None,
            last_main_time: None,
            last_skipped_frames: 0,
            last_slow: vec![0; header.frame_defs.slow.count()],
            last_event: None,
            motor0_index: header.frame_defs.intra.index_of("motor[0]"),
            stats: LogStats::default(),
            pending: None,
            held_marker: None,
        }
    }

    /// Prime the slow snapshot, e.g. from a chunk's recorded initial state.
    pub fn set_last_slow(&mut self, snapshot: &[i32]) {
        let count = self.header.frame_defs.slow.count();
        self.last_slow.clear();
        self.last_slow.extend_from_slice(snapshot);
        self.last_slow.resize(count, 0);
    }

    pub fn last_slow(&self) -> &[i32] {
        &self.last_slow
    }

    pub fn stats(&self) -> &LogStats {
        &self.stats
    }

    pub fn into_stats(self) -> LogStats {
        self.stats
    }

    /// Decode until the next reportable item. Returns `None` at a clean
    /// end of stream. A fatal error (unsupported predictor or encoding)
    /// abandons the sub-log decode.
    pub fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        loop {
            let marker = match self.held_marker.take() {
                Some(marker) => marker,
                None => self.stream.read_char(),
            };

            if let Some(pending) = self.pending.take() {
                // Post-hoc validation: the frame just parsed is good iff it
                // stayed within the length bound and this marker either
                // starts a known frame or is a clean end of stream.
                let frame_end =
                    if marker == EOF { self.stream.pos() } else { self.stream.pos() - 1 };
                let frame_size = frame_end - pending.start;
                let next_is_frame = self.recognized_frame_type(marker).is_some();
                let clean_eof = marker == EOF && !pending.premature_eof;

                if frame_size <= MAX_FRAME_LENGTH && (next_is_frame || clean_eof) {
                    self.held_marker = Some(marker);
                    self.stats.frame_type_mut(pending.frame_type).count_frame(frame_size);
                    if let Some(event) = self.complete_frame(&pending) {
                        return Ok(Some(event));
                    }
                    continue;
                }

                trace!(
                    "corrupt '{}' frame at offset {} ({} bytes)",
                    pending.frame_type.marker(),
                    pending.start,
                    frame_size
                );
                self.stats.frame_type_mut(pending.frame_type).corrupt_count += 1;
                self.stats.total_corrupted_frames += 1;
                self.invalidate_main_stream();
                // Resume the marker search one byte past the bad frame.
                self.stream.set_pos(pending.start + 1);
                self.stream.clear_eof();
                return Ok(Some(FrameEvent::Corrupt { offset: pending.start }));
            }

            if marker == EOF {
                return Ok(None);
            }

            match self.recognized_frame_type(marker) {
                Some(frame_type) => {
                    let start = self.stream.pos() - 1;
                    self.parse_frame_body(frame_type)?;
                    let premature_eof = self.stream.is_eof();
                    self.pending = Some(PendingFrame { frame_type, start, premature_eof });
                }
                None => {
                    // Garbage between frames; keep scanning byte by byte.
                    self.invalidate_main_stream();
                }
            }
        }
    }

    /// The frame type a marker byte starts, if this log can decode it.
    /// GPS frames have no fixed layout: without a `Field G`/`Field H`
    /// definition their markers are indistinguishable from damage.
    fn recognized_frame_type(&self, marker: i32) -> Option<FrameType> {
        let frame_type = FrameType::from_marker(marker)?;
        match frame_type {
            FrameType::Gps if !self.header.frame_defs.gps.is_present() => None,
            FrameType::GpsHome if !self.header.frame_defs.gps_home.is_present() => None,
            _ => Some(frame_type),
        }
    }

    fn parse_frame_body(&mut self, frame_type: FrameType) -> Result<()> {
        match frame_type {
            FrameType::Intra => self.decode_main_frame(FrameType::Intra, 0),
            FrameType::Inter => {
                self.last_skipped_frames = self.count_intentionally_skipped_frames();
                self.decode_main_frame(FrameType::Inter, self.last_skipped_frames)
            }
            FrameType::Slow => {
                let def = &self.header.frame_defs.slow;
                if def.count() == 0 {
                    return Ok(());
                }
                let ctx = PredictorContext {
                    config: &self.header.sys_config,
                    motor0_index: None,
                    last_main_time: None,
                    skipped_frames: 0,
                };
                let mut slow = std::mem::take(&mut self.last_slow);
                slow.clear();
                slow.resize(def.count(), 0);
                let result = decode_frame(&mut self.stream, def, &mut slow, None, None, &ctx, false);
                self.last_slow = slow;
                result
            }
            FrameType::Event => {
                self.parse_event_body();
                Ok(())
            }
            FrameType::Gps | FrameType::GpsHome => {
                // Dispatched only when the definition exists. Decoded just
                // to find the end of the frame; values are discarded and
                // unsupported GPS predictors degrade to none.
                let def = self.header.frame_defs.get(frame_type);
                let ctx = PredictorContext {
                    config: &self.header.sys_config,
                    motor0_index: None,
                    last_main_time: self.last_main_time,
                    skipped_frames: 0,
                };
                let mut scratch = vec![0; def.count()];
                decode_frame(&mut self.stream, def, &mut scratch, None, None, &ctx, true)
            }
        }
    }

    fn decode_main_frame(&mut self, frame_type: FrameType, skipped_frames: i32) -> Result<()> {
        let def = self.header.frame_defs.get(frame_type);
        let mut current = std::mem::take(&mut self.history[self.current_slot]);
        current.clear();
        current.resize(def.count(), 0);

        let previous = self.previous_slot.map(|slot| self.history[slot].as_slice());
        let previous2 = if frame_type == FrameType::Intra {
            None
        } else {
            self.previous2_slot.map(|slot| self.history[slot].as_slice())
        };
        let ctx = PredictorContext {
            config: &self.header.sys_config,
            motor0_index: self.motor0_index,
            last_main_time: self
                .previous_slot
                .and_then(|slot| self.history[slot].get(TIME_FIELD_INDEX).copied()),
            skipped_frames,
        };

        let result =
            decode_frame(&mut self.stream, def, &mut current, previous, previous2, &ctx, false);
        self.history[self.current_slot] = current;
        result
    }

    fn parse_event_body(&mut self) {
        let event_type = self.stream.read_byte();
        self.last_event = match event_type {
            EVENT_SYNC_BEEP => {
                let beep_time = self.stream.read_unsigned_vb();
                Some(LogEvent::new(LogEventData::SyncBeep { beep_time }))
            }
            EVENT_FLIGHT_MODE => {
                let new_flags = self.stream.read_unsigned_vb();
                let last_flags = self.stream.read_unsigned_vb();
                Some(LogEvent::new(LogEventData::FlightMode { new_flags, last_flags }))
            }
            EVENT_DISARM => {
                let reason = self.stream.read_unsigned_vb();
                Some(LogEvent::new(LogEventData::Disarm { reason }))
            }
            EVENT_LOGGING_RESUME => {
                let log_iteration = self.stream.read_unsigned_vb();
                let current_time = self.stream.read_unsigned_vb();
                Some(LogEvent::new(LogEventData::LoggingResume { log_iteration, current_time }))
            }
            EVENT_LOG_END => {
                let message = self.stream.read_string(END_OF_LOG_MESSAGE.len());
                if message == END_OF_LOG_MESSAGE {
                    // This sub-log is over; clamp the stream so parsing
                    // stops here.
                    let pos = self.stream.pos();
                    self.stream.set_end(pos);
                    Some(LogEvent::new(LogEventData::LogEnd))
                } else {
                    // Some payload byte happened to look like an event
                    // header; not a real end of log.
                    debug!("log-end marker without its message, discarding");
                    None
                }
            }
            _ => {
                // Unknown events have unknowable payload length; the only
                // safe reaction is to fall back to the marker search.
                debug!("unknown event type {}, invalidating stream", event_type);
                self.invalidate_main_stream();
                None
            }
        };
    }

    fn complete_frame(&mut self, pending: &PendingFrame) -> Option<FrameEvent> {
        match pending.frame_type {
            FrameType::Intra => Some(self.complete_intra_frame(pending.start)),
            FrameType::Inter => Some(self.complete_inter_frame(pending.start)),
            FrameType::Slow => {
                if self.header.frame_defs.slow.count() == 0 {
                    return None;
                }
                self.stats.observe_slow_frame(&self.last_slow);
                Some(FrameEvent::Slow { frame: self.last_slow.clone() })
            }
            FrameType::Event => self.complete_event_frame(),
            FrameType::Gps | FrameType::GpsHome => None,
        }
    }

    fn complete_intra_frame(&mut self, offset: usize) -> FrameEvent {
        let current = &self.history[self.current_slot];
        let iteration = current[ITERATION_FIELD_INDEX];
        let time = current[TIME_FIELD_INDEX];

        let accept = match (self.last_main_iteration, self.last_main_time) {
            (Some(last_iteration), Some(last_time)) => {
                let iteration_jump = iteration as i64 - last_iteration as i64;
                let time_jump = time as i64 - last_time as i64;
                // Both bounds are inclusive, matching the P-frame check
                iteration_jump >= 0
                    && iteration_jump <= MAXIMUM_ITERATION_JUMP
                    && time_jump >= 0
                    && time_jump <= MAXIMUM_TIME_JUMP_US
            }
            // The first I-frame of a stream anchors validation.
            _ => true,
        };

        let frame = self.history[self.current_slot].clone();
        if accept {
            self.stats.intentionally_absent_iterations +=
                self.count_intentionally_skipped_frames_to(iteration) as u32;
            self.last_main_iteration = Some(iteration);
            self.last_main_time = Some(time);
            // An I-frame is self-contained, so it resynchronizes the
            // stream after any earlier corruption.
            self.main_stream_is_valid = true;
            self.stats.observe_main_frame(&frame);

            // No look-back across an I boundary: both history slots point
            // at the frame just decoded.
            self.previous_slot = Some(self.current_slot);
            self.previous2_slot = Some(self.current_slot);
            self.advance_current_slot();
            FrameEvent::Main { kind: FrameType::Intra, frame, valid: true, offset }
        } else {
            trace!("rejected I-frame at offset {offset}: iteration/time moved out of bounds");
            self.invalidate_main_stream();
            FrameEvent::Main { kind: FrameType::Intra, frame, valid: false, offset }
        }
    }

    fn complete_inter_frame(&mut self, offset: usize) -> FrameEvent {
        let current = &self.history[self.current_slot];
        let iteration = current[ITERATION_FIELD_INDEX];
        let time = current[TIME_FIELD_INDEX];

        if self.main_stream_is_valid {
            if let (Some(last_iteration), Some(last_time)) =
                (self.last_main_iteration, self.last_main_time)
            {
                if time as i64 > last_time as i64 + MAXIMUM_TIME_JUMP_US
                    || iteration as i64 > last_iteration as i64 + MAXIMUM_ITERATION_JUMP
                {
                    self.main_stream_is_valid = false;
                }
            }
        }

        let valid = self.main_stream_is_valid;
        let frame = self.history[self.current_slot].clone();
        if valid {
            self.last_main_iteration = Some(iteration);
            self.last_main_time = Some(time);
            self.stats.intentionally_absent_iterations += self.last_skipped_frames as u32;
            self.stats.observe_main_frame(&frame);

            self.previous2_slot = self.previous_slot;
            self.previous_slot = Some(self.current_slot);
            self.advance_current_slot();
        }
        // A P-frame never resynchronizes an invalid stream: its history
        // basis is gone until the next I-frame.
        FrameEvent::Main { kind: FrameType::Inter, frame, valid, offset }
    }

    fn complete_event_frame(&mut self) -> Option<FrameEvent> {
        let event = self.last_event.take()?;
        if let LogEventData::LoggingResume { log_iteration, current_time } = event.data {
            // A deliberate forward jump: move the validation anchor so the
            // next main frame is accepted.
            self.last_main_iteration = Some(log_iteration as i32);
            self.last_main_time = Some(current_time as i32);
        }
        if self.header.frame_defs.event.is_present() {
            Some(FrameEvent::Event(event))
        } else {
            None
        }
    }

    fn advance_current_slot(&mut self) {
        self.current_slot = (0..3)
            .find(|&slot| Some(slot) != self.previous_slot && Some(slot) != self.previous2_slot)
            .unwrap_or(0);
    }

    fn invalidate_main_stream(&mut self) {
        self.main_stream_is_valid = false;
        self.previous_slot = None;
        self.previous2_slot = None;
    }

    /// True when the sampling pattern logs iteration `frame_index`.
    fn should_have_frame(&self, frame_index: i64) -> bool {
        let config = &self.header.sys_config;
        let interval_i = config.frame_interval_i.max(1) as i64;
        let p_num = config.frame_interval_p_num.max(1) as i64;
        let p_denom = config.frame_interval_p_denom.max(1) as i64;
        (frame_index % interval_i + p_num - 1) % p_denom < p_num
    }

    /// Iterations between the last committed frame and the next loggable
    /// one that the sampling rate deliberately dropped.
    fn count_intentionally_skipped_frames(&self) -> i32 {
        let Some(last) = self.last_main_iteration else {
            return 0;
        };
        let config = &self.header.sys_config;
        // One full sampling cycle bounds the search; a pattern that never
        // logs again would otherwise spin forever.
        let cycle = (config.frame_interval_i.max(1) as i64)
            * (config.frame_interval_p_denom.max(1) as i64);
        let mut count = 0;
        let mut index = last as i64 + 1;
        while !self.should_have_frame(index) && count < cycle {
            count += 1;
            index += 1;
        }
        count as i32
    }

    /// Deliberately dropped iterations in `(last committed, target)`.
    fn count_intentionally_skipped_frames_to(&self, target_iteration: i32) -> i32 {
        let Some(last) = self.last_main_iteration else {
            return 0;
        };
        (last as i64 + 1..target_iteration as i64)
            .filter(|&index| !self.should_have_frame(index))
            .count() as i32
    }
}
