//! Public facade over an indexed blackbox log file.
//!
//! [`FlightLog`] owns the raw buffer and the per-sub-log directories built
//! at parse time. Opening a sub-log re-parses its header and resolves the
//! field layout once; chunks are then decoded on demand by time range,
//! with the slow state merged in and the derived fields (PID sums, scaled
//! RC commands, PID error, legacy motor copies) appended to every frame.
//! Decoded chunks are cached for the currently open sub-log; switching
//! sub-logs drops the cache.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DecodeError, Result};
use crate::event::{LogEvent, LogEventData};
use crate::header::{FirmwareType, LogHeader, SysConfig, TIME_FIELD_INDEX};
use crate::index::{LogDirectory, index_sub_logs};
use crate::parser::{FrameEvent, LogParser};
use crate::stats::{FieldStats, LogStats};
use crate::stream::ByteStream;
use crate::units;

/// Upper bound on derived fields appended to each frame; unused trailing
/// slots are truncated.
pub const ADDITIONAL_COMPUTED_FIELD_COUNT: usize = 20;

// Bits of `fields_disabled_mask`, in the firmware's field-select order.
const FIELD_SELECT_PID: i32 = 1 << 0;
const FIELD_SELECT_RC_COMMANDS: i32 = 1 << 1;
const FIELD_SELECT_SETPOINT: i32 = 1 << 2;
const FIELD_SELECT_GYRO: i32 = 1 << 7;
const FIELD_SELECT_MOTOR: i32 = 1 << 10;

/// The contiguous run of main frames between two random-access points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogChunk {
    pub index: usize,
    /// Flat integer vectors: main fields, then slow fields, then computed.
    pub frames: Vec<Vec<i32>>,
    pub events: Vec<LogEvent>,
    /// `k` present means the decoder resynchronized between frames `k`
    /// and `k + 1`.
    pub gap_starts_here: BTreeSet<usize>,
}

/// Per-chunk activity overview for the timeline display.
#[derive(Debug, Clone, Copy)]
pub struct ActivitySummary<'a> {
    pub times: &'a [i64],
    pub avg_throttle: &'a [i32],
    pub has_event: &'a [bool],
}

/// The frames bracketing a point in time.
#[derive(Debug, Clone)]
pub struct FrameAtTime {
    pub chunk: Arc<LogChunk>,
    pub previous: Option<usize>,
    pub current: Option<usize>,
    pub next: Option<usize>,
}

/// Sub-log statistics with the merged per-field ranges attached.
#[derive(Debug, Clone)]
pub struct StatsView<'a> {
    pub stats: &'a LogStats,
    /// Main-frame field ranges followed by slow-frame field ranges.
    pub field: Vec<FieldStats>,
}

#[derive(Debug, Clone, Copy)]
struct AxisSumSources {
    p: [usize; 3],
    i: [usize; 3],
    d: [Option<usize>; 3],
    f: [Option<usize>; 3],
}

#[derive(Debug, Clone, Copy)]
enum RcCommandSources {
    /// Firmware logs the setpoint directly (Betaflight 4.0+).
    Setpoint([usize; 4]),
    /// Reconstruct the setpoint from the raw RC command via the rates.
    RcCommand([usize; 4]),
}

/// Field positions resolved once per `open_log`.
#[derive(Debug, Clone, Default)]
struct ComputedFields {
    names: Vec<String>,
    axis_sum: Option<AxisSumSources>,
    rc_command: Option<RcCommandSources>,
    axis_error: Option<[usize; 3]>,
    motor_legacy: Vec<usize>,
}

struct OpenedLog {
    index: usize,
    header: LogHeader,
    main_field_names: Vec<String>,
    main_field_index: HashMap<String, usize>,
    computed: ComputedFields,
    num_motors: usize,
    num_cells: usize,
    chunk_cache: HashMap<usize, Arc<LogChunk>>,
}

/// A parsed blackbox log file: one or more sub-logs over a shared buffer.
pub struct FlightLog {
    data: Arc<[u8]>,
    directories: Vec<LogDirectory>,
    opened: Option<OpenedLog>,
}

impl FlightLog {
    /// Index every sub-log in the buffer. Individual sub-logs with
    /// unusable headers are still listed; only `open_log` rejects them.
    pub fn parse(data: Vec<u8>) -> Self {
        let directories = index_sub_logs(&data);
        info!("indexed {} sub-log(s) from {} bytes", directories.len(), data.len());
        Self { data: data.into(), directories, opened: None }
    }

    /// Read a log file from disk and index it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(&path)
            .map_err(|e| DecodeError::file_error(path.as_ref().to_path_buf(), e))?;
        Ok(Self::parse(data))
    }

    pub fn log_count(&self) -> usize {
        self.directories.len()
    }

    /// The indexing error for a sub-log, if it has one.
    pub fn log_error(&self, index: usize) -> Option<&str> {
        self.directories.get(index).and_then(|d| d.error.as_deref())
    }

    pub fn directory(&self, index: usize) -> Option<&LogDirectory> {
        self.directories.get(index)
    }

    /// Open one sub-log for field access and chunk decoding.
    pub fn open_log(&mut self, index: usize) -> Result<()> {
        let directory = self
            .directories
            .get(index)
            .ok_or(DecodeError::LogIndexOutOfRange { index, count: self.directories.len() })?;
        if let Some(error) = &directory.error {
            return Err(DecodeError::LogUnreadable { index, reason: error.clone() });
        }

        let mut stream =
            ByteStream::with_bounds(&self.data, directory.log_start, directory.log_end);
        let header = LogHeader::parse(&mut stream)?;

        let computed = build_computed_fields(&header);
        let mut main_field_names = header.frame_defs.intra.names.clone();
        main_field_names.extend(header.frame_defs.slow.names.iter().cloned());
        main_field_names.extend(computed.names.iter().cloned());
        let main_field_index = main_field_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        // Estimated from raw field presence, independent of the mask
        let num_motors = (0..8)
            .filter(|motor| header.frame_defs.intra.has_field(&format!("motor[{motor}]")))
            .count();
        let num_cells = estimate_num_cells(&header.sys_config);

        debug!(
            "opened log {}: {} fields ({} computed), {} motors, {} cells",
            index,
            main_field_names.len(),
            computed.names.len(),
            num_motors,
            num_cells
        );

        self.opened = Some(OpenedLog {
            index,
            header,
            main_field_names,
            main_field_index,
            computed,
            num_motors,
            num_cells,
            chunk_cache: HashMap::new(),
        });
        Ok(())
    }

    fn opened(&self) -> Result<&OpenedLog> {
        self.opened.as_ref().ok_or(DecodeError::NoOpenLog)
    }

    /// The system configuration of the currently open sub-log.
    pub fn sys_config(&self) -> Result<&SysConfig> {
        Ok(&self.opened()?.header.sys_config)
    }

    /// Earliest main-frame time of a sub-log.
    pub fn min_time_of(&self, index: usize) -> Option<i64> {
        self.directories.get(index).and_then(|d| d.min_time)
    }

    /// Latest main-frame time of a sub-log.
    pub fn max_time_of(&self, index: usize) -> Option<i64> {
        self.directories.get(index).and_then(|d| d.max_time)
    }

    pub fn min_time(&self) -> Result<Option<i64>> {
        Ok(self.min_time_of(self.opened()?.index))
    }

    pub fn max_time(&self) -> Result<Option<i64>> {
        Ok(self.max_time_of(self.opened()?.index))
    }

    /// Decoding statistics with the merged per-field range array.
    pub fn stats(&self, index: usize) -> Option<StatsView<'_>> {
        self.directories
            .get(index)
            .map(|d| StatsView { stats: &d.stats, field: d.stats.merged_field_stats() })
    }

    /// All field names of the merged per-iteration record: main fields,
    /// slow fields, then computed fields.
    pub fn main_field_names(&self) -> Result<&[String]> {
        Ok(&self.opened()?.main_field_names)
    }

    pub fn main_field_count(&self) -> Result<usize> {
        Ok(self.opened()?.main_field_names.len())
    }

    pub fn main_field_index_by_name(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.opened()?.main_field_index.get(name).copied())
    }

    pub fn num_motors(&self) -> Result<usize> {
        Ok(self.opened()?.num_motors)
    }

    pub fn num_cells(&self) -> Result<usize> {
        Ok(self.opened()?.num_cells)
    }

    /// Per-chunk activity overview of a sub-log.
    pub fn activity_summary(&self, index: usize) -> Option<ActivitySummary<'_>> {
        self.directories.get(index).map(|d| ActivitySummary {
            times: &d.times,
            avg_throttle: &d.avg_throttle,
            has_event: &d.has_event,
        })
    }

    /// Decode every chunk whose start time falls in `[start_time,
    /// end_time]`, extended left to the chunk containing `start_time`.
    pub fn chunks_in_time_range(
        &mut self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Arc<LogChunk>>> {
        let opened = self.opened()?;
        let directory = &self.directories[opened.index];
        if directory.times.is_empty() {
            return Ok(Vec::new());
        }

        let start_index = search_or_previous(&directory.times, start_time).unwrap_or(0);
        let Some(end_index) = search_or_previous(&directory.times, end_time) else {
            return Ok(Vec::new());
        };

        (start_index..=end_index).map(|chunk| self.chunk(chunk)).collect()
    }

    /// Like [`FlightLog::chunks_in_time_range`], but the upper bound
    /// extends right to the chunk at or after `end_time`, so windowed
    /// post-processing has context on both sides.
    pub fn smoothed_chunks_in_time_range(
        &mut self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Arc<LogChunk>>> {
        let opened = self.opened()?;
        let directory = &self.directories[opened.index];
        if directory.times.is_empty() {
            return Ok(Vec::new());
        }

        let start_index = search_or_previous(&directory.times, start_time).unwrap_or(0);
        let end_index =
            search_or_next(&directory.times, end_time).unwrap_or(directory.times.len() - 1);

        (start_index..=end_index).map(|chunk| self.chunk(chunk)).collect()
    }

    /// The frames bracketing `time`: the last two at or before it and the
    /// first strictly after it.
    pub fn frame_at_time(&mut self, time: i64) -> Result<Option<FrameAtTime>> {
        let chunks = self.chunks_in_time_range(time, time)?;
        let Some(chunk) = chunks.into_iter().next() else {
            return Ok(None);
        };

        let after = chunk
            .frames
            .partition_point(|frame| frame[TIME_FIELD_INDEX] as i64 <= time);
        Ok(Some(FrameAtTime {
            previous: after.checked_sub(2),
            current: after.checked_sub(1),
            next: (after < chunk.frames.len()).then_some(after),
            chunk,
        }))
    }

    /// Decode (or fetch from cache) one chunk of the open sub-log.
    fn chunk(&mut self, chunk_index: usize) -> Result<Arc<LogChunk>> {
        let Self { data, directories, opened } = self;
        let opened = opened.as_mut().ok_or(DecodeError::NoOpenLog)?;

        if let Some(chunk) = opened.chunk_cache.get(&chunk_index) {
            return Ok(Arc::clone(chunk));
        }

        let directory = &directories[opened.index];
        let chunk = Arc::new(decode_chunk(
            &data[..],
            directory,
            &opened.header,
            &opened.computed,
            chunk_index,
        )?);
        opened.chunk_cache.insert(chunk_index, Arc::clone(&chunk));
        Ok(chunk)
    }
}

/// Greatest index whose time is at or before `time`.
fn search_or_previous(times: &[i64], time: i64) -> Option<usize> {
    match times.partition_point(|&t| t <= time) {
        0 => None,
        n => Some(n - 1),
    }
}

/// Smallest index whose time is at or after `time`.
fn search_or_next(times: &[i64], time: i64) -> Option<usize> {
    let n = times.partition_point(|&t| t < time);
    (n < times.len()).then_some(n)
}

fn decode_chunk(
    data: &[u8],
    directory: &LogDirectory,
    header: &LogHeader,
    computed: &ComputedFields,
    chunk_index: usize,
) -> Result<LogChunk> {
    let start = directory.offsets[chunk_index];
    let end = directory.offsets.get(chunk_index + 1).copied().unwrap_or(directory.log_end);

    let stream = ByteStream::with_bounds(data, start, end);
    let mut parser = LogParser::new(header, stream);
    parser.set_last_slow(&directory.initial_slow[chunk_index]);

    let mut chunk = LogChunk { index: chunk_index, ..Default::default() };
    let mut last_slow = parser.last_slow().to_vec();
    let mut pending_events: Vec<(usize, LogEvent)> = Vec::new();

    loop {
        match parser.next_event()? {
            Some(FrameEvent::Main { frame, valid, .. }) => {
                if valid {
                    let mut merged = frame;
                    merged.extend_from_slice(&last_slow);
                    chunk.frames.push(merged);
                } else {
                    mark_gap(&mut chunk);
                }
            }
            Some(FrameEvent::Slow { frame }) => last_slow = frame,
            Some(FrameEvent::Event(event)) => {
                if matches!(event.data, LogEventData::LoggingResume { .. }) {
                    mark_gap(&mut chunk);
                }
                pending_events.push((chunk.frames.len(), event));
            }
            Some(FrameEvent::Corrupt { .. }) => mark_gap(&mut chunk),
            None => break,
        }
    }

    // Events carry no time of their own: give each the time of the next
    // main frame, or the last frame's time when nothing follows.
    for (frame_index, mut event) in pending_events {
        event.time = chunk
            .frames
            .get(frame_index)
            .or(chunk.frames.last())
            .map(|frame| frame[TIME_FIELD_INDEX] as i64);
        chunk.events.push(event);
    }

    for frame in &mut chunk.frames {
        inject_computed_fields(frame, computed, &header.sys_config);
    }

    Ok(chunk)
}

fn mark_gap(chunk: &mut LogChunk) {
    if let Some(last) = chunk.frames.len().checked_sub(1) {
        chunk.gap_starts_here.insert(last);
    }
}

fn build_computed_fields(header: &LogHeader) -> ComputedFields {
    let def = &header.frame_defs.intra;
    let config = &header.sys_config;
    let mut computed = ComputedFields::default();

    // A family is emitted only if its source fields exist and its
    // field-select bit is not disabled in the header.
    let disabled = |family: i32| config.fields_disabled_mask & family != 0;
    let indexed = |name: &str, axis: usize| def.index_of(&format!("{name}[{axis}]"));
    let all3 = |name: &str| -> Option<[usize; 3]> {
        Some([indexed(name, 0)?, indexed(name, 1)?, indexed(name, 2)?])
    };
    let all4 = |name: &str| -> Option<[usize; 4]> {
        Some([indexed(name, 0)?, indexed(name, 1)?, indexed(name, 2)?, indexed(name, 3)?])
    };

    if !disabled(FIELD_SELECT_PID) {
        if let (Some(p), Some(i)) = (all3("axisP"), all3("axisI")) {
            computed.axis_sum = Some(AxisSumSources {
                p,
                i,
                d: [indexed("axisD", 0), indexed("axisD", 1), indexed("axisD", 2)],
                f: [indexed("axisF", 0), indexed("axisF", 1), indexed("axisF", 2)],
            });
            for axis in 0..3 {
                computed.names.push(format!("axisSum[{axis}]"));
            }
        }
    }

    computed.rc_command = if config.firmware_at_least(FirmwareType::Betaflight, 4, 0, 0) {
        if disabled(FIELD_SELECT_SETPOINT) {
            None
        } else {
            all4("setpoint").map(RcCommandSources::Setpoint)
        }
    } else if disabled(FIELD_SELECT_RC_COMMANDS) {
        None
    } else {
        all4("rcCommand").map(RcCommandSources::RcCommand)
    };
    if computed.rc_command.is_some() {
        for axis in 0..4 {
            computed.names.push(format!("rcCommands[{axis}]"));
        }

        // PID error needs both the setpoint and the gyro
        if !disabled(FIELD_SELECT_GYRO) {
            if let Some(gyro) = all3("gyroADC") {
                computed.axis_error = Some(gyro);
                for axis in 0..3 {
                    computed.names.push(format!("axisError[{axis}]"));
                }
            }
        }
    }

    if !disabled(FIELD_SELECT_MOTOR) {
        computed.motor_legacy =
            (0..8).filter_map(|motor| indexed("motor", motor)).collect();
        for motor in 0..computed.motor_legacy.len() {
            computed.names.push(format!("motorLegacy[{motor}]"));
        }
    }

    debug_assert!(computed.names.len() <= ADDITIONAL_COMPUTED_FIELD_COUNT);
    computed
}

fn inject_computed_fields(frame: &mut Vec<i32>, computed: &ComputedFields, config: &SysConfig) {
    frame.reserve(computed.names.len());

    if let Some(sources) = computed.axis_sum {
        for axis in 0..3 {
            let mut sum = frame[sources.p[axis]] as f64
                + frame[sources.i[axis]] as f64
                + sources.d[axis].map_or(0.0, |index| frame[index] as f64)
                + sources.f[axis].map_or(0.0, |index| frame[index] as f64);
            let limit =
                if axis == 2 { config.pid_sum_limit_yaw } else { config.pid_sum_limit };
            if limit > 0.0 {
                sum = sum.clamp(-limit, limit);
            }
            frame.push(sum.round() as i32);
        }
    }

    let mut rc_values = [0.0f64; 4];
    if let Some(sources) = computed.rc_command {
        match sources {
            RcCommandSources::Setpoint(indices) => {
                for axis in 0..3 {
                    rc_values[axis] = frame[indices[axis]] as f64;
                }
                rc_values[3] = frame[indices[3]] as f64 / 10.0;
            }
            RcCommandSources::RcCommand(indices) => {
                for axis in 0..3 {
                    rc_values[axis] =
                        units::rc_command_raw_to_deg_per_sec(config, frame[indices[axis]], axis);
                }
                rc_values[3] = units::rc_command_raw_to_throttle(config, frame[indices[3]]);
            }
        }
        for value in rc_values {
            frame.push(value.round() as i32);
        }

        if let Some(gyro) = computed.axis_error {
            for axis in 0..3 {
                let error =
                    rc_values[axis] - units::gyro_raw_to_deg_per_sec(config, frame[gyro[axis]]);
                frame.push(error.round() as i32);
            }
        }
    }

    for motor in 0..computed.motor_legacy.len() {
        let value = frame[computed.motor_legacy[motor]];
        frame.push(value);
    }
}

/// Smallest cell count whose full-charge voltage exceeds the reference
/// reading, capped at eight.
fn estimate_num_cells(config: &SysConfig) -> usize {
    let ref_voltage = units::vbat_adc_to_millivolts(config, config.vbatref) / 100;
    (1..8)
        .find(|&cells| (ref_voltage as i64) < cells as i64 * config.vbatmaxcellvoltage as i64)
        .unwrap_or(8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LOG_START_MARKER;

    const FIELD_COUNT: usize = 22;

    const TEST_HEADER: &[&str] = &[
        "Firmware revision:Betaflight 4.2.0 (test) STM32F745",
        "gyro_scale:0x3f800000",
        "P interval:1/1",
        "vbatcellvoltage:33,35,43",
        "Field I name:loopIteration,time,axisP[0],axisP[1],axisP[2],axisI[0],axisI[1],axisI[2],axisD[0],setpoint[0],setpoint[1],setpoint[2],setpoint[3],rcCommand[0],rcCommand[1],rcCommand[2],rcCommand[3],gyroADC[0],gyroADC[1],gyroADC[2],motor[0],motor[1]",
        "Field I signed:0,0,1,1,1,1,1,1,1,1,1,1,0,1,1,1,0,1,1,1,0,0",
        "Field I predictor:0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0",
        "Field I encoding:1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0",
        "Field P predictor:6,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1",
        "Field P encoding:9,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0",
        "Field S name:flightModeFlags,stateFlags",
        "Field S signed:0,0",
        "Field S predictor:0,0",
        "Field S encoding:1,1",
        "Field E predictor:0",
        "Field E encoding:0",
    ];

    fn uvb(out: &mut Vec<u8>, mut value: u32) {
        loop {
            if value < 0x80 {
                out.push(value as u8);
                return;
            }
            out.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
    }

    fn svb(out: &mut Vec<u8>, value: i32) {
        uvb(out, ((value << 1) ^ (value >> 31)) as u32);
    }

    fn begin_log(out: &mut Vec<u8>) {
        begin_log_with(out, &[]);
    }

    fn begin_log_with(out: &mut Vec<u8>, extra_lines: &[&str]) {
        out.extend_from_slice(LOG_START_MARKER);
        for line in TEST_HEADER.iter().chain(extra_lines) {
            out.extend_from_slice(b"H ");
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
    }

    /// A main frame for the test schema, all fields explicit.
    fn frame(iteration: i32, time: i32) -> Vec<i32> {
        let mut values = vec![0i32; FIELD_COUNT];
        values[0] = iteration;
        values[1] = time;
        values
    }

    fn write_intra(out: &mut Vec<u8>, values: &[i32]) {
        out.push(b'I');
        uvb(out, values[0] as u32);
        uvb(out, values[1] as u32);
        for &value in &values[2..] {
            svb(out, value);
        }
    }

    fn write_inter(out: &mut Vec<u8>, values: &[i32], previous: &[i32]) {
        out.push(b'P');
        for index in 1..FIELD_COUNT {
            svb(out, values[index] - previous[index]);
        }
    }

    fn write_slow(out: &mut Vec<u8>, flags: u32, state: u32) {
        out.push(b'S');
        uvb(out, flags);
        uvb(out, state);
    }

    fn single_log() -> FlightLog {
        let mut data = Vec::new();
        begin_log(&mut data);

        let mut f0 = frame(0, 1000);
        f0[2] = 10; // axisP[0]
        f0[5] = 5; // axisI[0]
        f0[8] = 2; // axisD[0]
        f0[9] = 100; // setpoint[0]
        f0[12] = 1500; // setpoint[3]
        f0[17] = 90; // gyroADC[0]
        f0[20] = 1200; // motor[0]
        f0[21] = 1210; // motor[1]
        write_intra(&mut data, &f0);

        let mut f1 = f0.clone();
        f1[0] = 1;
        f1[1] = 2000;
        f1[2] = 12;
        write_inter(&mut data, &f1, &f0);

        data.push(b'E');
        data.push(15); // disarm
        uvb(&mut data, 3);

        let mut f2 = f1.clone();
        f2[0] = 2;
        f2[1] = 3000;
        write_inter(&mut data, &f2, &f1);

        FlightLog::parse(data)
    }

    #[test]
    fn open_log_rejects_bad_index_and_bad_log() {
        let mut log = FlightLog::parse(Vec::new());
        assert_eq!(log.log_count(), 0);
        assert!(matches!(
            log.open_log(0),
            Err(DecodeError::LogIndexOutOfRange { index: 0, count: 0 })
        ));

        // A banner with no frame data: indexing records an error
        let mut data = Vec::new();
        data.extend_from_slice(LOG_START_MARKER);
        let mut log = FlightLog::parse(data);
        assert_eq!(log.log_count(), 1);
        assert!(log.log_error(0).is_some());
        assert!(matches!(log.open_log(0), Err(DecodeError::LogUnreadable { index: 0, .. })));
    }

    #[test]
    fn field_names_concatenate_main_slow_and_computed() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        let names = log.main_field_names().unwrap();
        assert_eq!(names[0], "loopIteration");
        assert_eq!(names[1], "time");
        assert_eq!(names[FIELD_COUNT], "flightModeFlags");
        assert_eq!(names[FIELD_COUNT + 1], "stateFlags");

        // Computed: 3 axisSum + 4 rcCommands + 3 axisError + 2 motorLegacy
        let computed: Vec<&str> =
            names[FIELD_COUNT + 2..].iter().map(String::as_str).collect();
        assert_eq!(
            computed,
            vec![
                "axisSum[0]",
                "axisSum[1]",
                "axisSum[2]",
                "rcCommands[0]",
                "rcCommands[1]",
                "rcCommands[2]",
                "rcCommands[3]",
                "axisError[0]",
                "axisError[1]",
                "axisError[2]",
                "motorLegacy[0]",
                "motorLegacy[1]",
            ]
        );
        assert_eq!(log.main_field_count().unwrap(), FIELD_COUNT + 2 + 12);
        assert_eq!(log.main_field_index_by_name("time").unwrap(), Some(1));
        assert_eq!(
            log.main_field_index_by_name("motorLegacy[1]").unwrap(),
            Some(FIELD_COUNT + 2 + 11)
        );
        assert_eq!(log.main_field_index_by_name("nonexistent").unwrap(), None);

        assert_eq!(log.num_motors().unwrap(), 2);
        assert_eq!(log.num_cells().unwrap(), 8);
    }

    #[test]
    fn chunks_merge_slow_state_and_inject_computed_fields() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        let chunks = log.chunks_in_time_range(1000, 3000).expect("chunks decode");
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.frames.len(), 3);

        let frame0 = &chunk.frames[0];
        assert_eq!(frame0.len(), FIELD_COUNT + 2 + 12);
        // Slow fields default to zero before any S-frame
        assert_eq!(&frame0[FIELD_COUNT..FIELD_COUNT + 2], &[0, 0]);

        // axisSum[0] = P + I + D = 10 + 5 + 2
        assert_eq!(frame0[FIELD_COUNT + 2], 17);
        assert_eq!(frame0[FIELD_COUNT + 3], 0);
        // rcCommands come straight from setpoint on Betaflight 4.x
        assert_eq!(frame0[FIELD_COUNT + 5], 100);
        // throttle setpoint is divided by ten
        assert_eq!(frame0[FIELD_COUNT + 8], 150);
        // axisError[0] = rcCommand - gyro (scale normalized to 1 deg/s/LSB)
        assert_eq!(frame0[FIELD_COUNT + 9], 10);
        // motorLegacy copies motor values verbatim
        assert_eq!(frame0[FIELD_COUNT + 12], 1200);
        assert_eq!(frame0[FIELD_COUNT + 13], 1210);

        // The P-frame carried axisP[0] = 12
        let frame1 = &chunk.frames[1];
        assert_eq!(frame1[2], 12);
        assert_eq!(frame1[FIELD_COUNT + 2], 12 + 5 + 2);
    }

    #[test]
    fn event_times_come_from_the_next_main_frame() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        let chunks = log.chunks_in_time_range(1000, 3000).expect("chunks decode");
        let chunk = &chunks[0];
        assert_eq!(chunk.events.len(), 1);
        let event = &chunk.events[0];
        assert_eq!(event.data, LogEventData::Disarm { reason: 3 });
        // The disarm sits between the frames at t=2000 and t=3000
        assert_eq!(event.time, Some(3000));
    }

    #[test]
    fn slow_frames_update_following_frames_only() {
        let mut data = Vec::new();
        begin_log(&mut data);

        let f0 = frame(0, 1000);
        write_intra(&mut data, &f0);
        write_slow(&mut data, 7, 1);
        let mut f1 = f0.clone();
        f1[0] = 1;
        f1[1] = 2000;
        write_inter(&mut data, &f1, &f0);

        let mut log = FlightLog::parse(data);
        log.open_log(0).expect("log opens");
        let chunks = log.chunks_in_time_range(1000, 2000).expect("chunks decode");
        let frames = &chunks[0].frames;
        assert_eq!(&frames[0][FIELD_COUNT..FIELD_COUNT + 2], &[0, 0]);
        assert_eq!(&frames[1][FIELD_COUNT..FIELD_COUNT + 2], &[7, 1]);
    }

    #[test]
    fn chunk_cache_returns_shared_chunks() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        let first = log.chunks_in_time_range(1000, 1000).expect("chunks decode");
        let second = log.chunks_in_time_range(1000, 1000).expect("chunks decode");
        assert!(Arc::ptr_eq(&first[0], &second[0]));

        // Reopening drops the cache
        log.open_log(0).expect("log reopens");
        let third = log.chunks_in_time_range(1000, 1000).expect("chunks decode");
        assert!(!Arc::ptr_eq(&first[0], &third[0]));
    }

    #[test]
    fn time_range_queries_bound_correctly() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        // End before the first chunk's start time: nothing
        assert!(log.chunks_in_time_range(0, 500).expect("decode").is_empty());
        // Range inside the chunk returns it
        assert_eq!(log.chunks_in_time_range(2500, 2500).expect("decode").len(), 1);
        // The smoothed variant extends to the next chunk at or after
        assert_eq!(log.smoothed_chunks_in_time_range(0, 500).expect("decode").len(), 1);
    }

    #[test]
    fn frame_at_time_brackets_the_query_point() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        let at = log.frame_at_time(2500).expect("decode").expect("frame found");
        // Frames at 1000, 2000, 3000: 2500 falls after the second
        assert_eq!(at.previous, Some(0));
        assert_eq!(at.current, Some(1));
        assert_eq!(at.next, Some(2));

        let at = log.frame_at_time(1000).expect("decode").expect("frame found");
        assert_eq!(at.previous, None);
        assert_eq!(at.current, Some(0));
        assert_eq!(at.next, Some(1));

        let at = log.frame_at_time(99_999).expect("decode");
        assert!(at.is_none() || at.unwrap().next.is_none());
    }

    #[test]
    fn activity_summary_and_times_align() {
        let mut log = single_log();
        log.open_log(0).expect("log opens");

        let summary = log.activity_summary(0).expect("summary exists");
        assert_eq!(summary.times.len(), 1);
        assert_eq!(summary.avg_throttle.len(), 1);
        assert_eq!(summary.has_event.len(), 1);
        assert_eq!(summary.times[0], 1000);
        // Mean of motor[0]=1200, motor[1]=1210
        assert_eq!(summary.avg_throttle[0], 1205);
        assert!(summary.has_event[0]);

        assert_eq!(log.min_time().unwrap(), Some(1000));
        assert_eq!(log.max_time().unwrap(), Some(3000));
    }

    #[test]
    fn fields_disabled_mask_suppresses_computed_families() {
        // PID sums disabled: the other families survive
        let mut data = Vec::new();
        begin_log_with(&mut data, &["fields_disabled_mask:1"]);
        write_intra(&mut data, &frame(0, 1000));
        let mut log = FlightLog::parse(data);
        log.open_log(0).expect("log opens");
        let names = log.main_field_names().unwrap();
        assert!(!names.iter().any(|name| name.starts_with("axisSum")));
        assert!(names.iter().any(|name| name.starts_with("rcCommands")));
        assert!(names.iter().any(|name| name.starts_with("axisError")));
        assert_eq!(log.main_field_count().unwrap(), FIELD_COUNT + 2 + 9);

        // Gyro disabled: only the PID error family drops out
        let mut data = Vec::new();
        begin_log_with(&mut data, &["fields_disabled_mask:128"]);
        write_intra(&mut data, &frame(0, 1000));
        let mut log = FlightLog::parse(data);
        log.open_log(0).expect("log opens");
        let names = log.main_field_names().unwrap();
        assert!(names.iter().any(|name| name.starts_with("axisSum")));
        assert!(names.iter().any(|name| name.starts_with("rcCommands")));
        assert!(!names.iter().any(|name| name.starts_with("axisError")));
        assert_eq!(log.main_field_count().unwrap(), FIELD_COUNT + 2 + 9);

        // PID, setpoint and motor disabled: nothing left to compute, and
        // decoded frames shrink to the raw fields (the mask does not hide
        // the raw motor fields themselves)
        let mut data = Vec::new();
        begin_log_with(&mut data, &["fields_disabled_mask:1029"]);
        write_intra(&mut data, &frame(0, 1000));
        let mut log = FlightLog::parse(data);
        log.open_log(0).expect("log opens");
        assert_eq!(log.main_field_count().unwrap(), FIELD_COUNT + 2);
        assert_eq!(log.num_motors().unwrap(), 2);
        let chunks = log.chunks_in_time_range(1000, 1000).expect("chunks decode");
        assert_eq!(chunks[0].frames[0].len(), FIELD_COUNT + 2);
    }

    #[test]
    fn stats_view_merges_main_and_slow_fields() {
        let mut data = Vec::new();
        begin_log(&mut data);
        let f0 = frame(0, 1000);
        write_intra(&mut data, &f0);
        write_slow(&mut data, 7, 1);
        let mut f1 = f0.clone();
        f1[0] = 1;
        f1[1] = 2000;
        write_inter(&mut data, &f1, &f0);

        let log = FlightLog::parse(data);
        let view = log.stats(0).expect("stats exist");
        assert_eq!(view.field.len(), FIELD_COUNT + 2);
        assert_eq!(view.field[1].min, 1000);
        assert_eq!(view.field[1].max, 2000);
        assert_eq!(view.field[FIELD_COUNT].max, 7);
        assert_eq!(view.stats.intra.valid_count, 1);
        assert_eq!(view.stats.inter.valid_count, 1);
    }
}
