//! Synthetic blackbox log builder shared by the integration tests and
//! benchmarks.
//!
//! The builder mirrors the wire format the decoder consumes: a banner per
//! sub-log, `H key:value` header lines, then I/P/S/E frames whose raw
//! values are the inverse of the decoder's predictor chain for the fixed
//! test schema below.

#![allow(dead_code)]

/// Byte-exact banner that opens every sub-log.
pub const LOG_START_MARKER: &[u8] =
    b"H Product:Blackbox flight data recorder by Nicholas Sherlock\n";

/// Main-frame field positions for the test schema.
pub mod field {
    pub const LOOP_ITERATION: usize = 0;
    pub const TIME: usize = 1;
    pub const AXIS_P0: usize = 2;
    pub const AXIS_P1: usize = 3;
    pub const AXIS_P2: usize = 4;
    pub const AXIS_I0: usize = 5;
    pub const AXIS_I1: usize = 6;
    pub const AXIS_I2: usize = 7;
    pub const AXIS_D0: usize = 8;
    pub const SETPOINT0: usize = 9;
    pub const SETPOINT1: usize = 10;
    pub const SETPOINT2: usize = 11;
    pub const SETPOINT3: usize = 12;
    pub const RC_COMMAND0: usize = 13;
    pub const RC_COMMAND1: usize = 14;
    pub const RC_COMMAND2: usize = 15;
    pub const RC_COMMAND3: usize = 16;
    pub const GYRO0: usize = 17;
    pub const GYRO1: usize = 18;
    pub const GYRO2: usize = 19;
    pub const MOTOR0: usize = 20;
    pub const MOTOR1: usize = 21;
}

/// Number of main-frame fields in the test schema.
pub const FIELD_COUNT: usize = 22;
/// Number of slow-frame fields in the test schema.
pub const SLOW_COUNT: usize = 2;

const HEADER_LINES: &[&str] = &[
    "Firmware type:Cleanflight",
    "Firmware revision:Betaflight 4.2.0 (test) STM32F745",
    "gyro_scale:0x3f800000",
    "P interval:1/1",
    "minthrottle:1070",
    "maxthrottle:2000",
    "motorOutput:192,2047",
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

fn write_unsigned_vb(out: &mut Vec<u8>, mut value: u32) {
    loop {
        if value < 0x80 {
            out.push(value as u8);
            return;
        }
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
}

fn write_signed_vb(out: &mut Vec<u8>, value: i32) {
    write_unsigned_vb(out, ((value << 1) ^ (value >> 31)) as u32);
}

/// Incrementally assembles a log file of one or more sub-logs.
#[derive(Default)]
pub struct LogBuilder {
    data: Vec<u8>,
    last_main: Option<Vec<i32>>,
}

impl LogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new sub-log with the standard test header.
    pub fn begin_log(&mut self) {
        self.begin_log_with(&[]);
    }

    /// Start a new sub-log, appending extra header lines after the
    /// standard set (later lines win for repeated keys).
    pub fn begin_log_with(&mut self, extra_lines: &[&str]) {
        self.data.extend_from_slice(LOG_START_MARKER);
        for line in HEADER_LINES.iter().chain(extra_lines) {
            self.data.extend_from_slice(b"H ");
            self.data.extend_from_slice(line.as_bytes());
            self.data.push(b'\n');
        }
        self.last_main = None;
    }

    /// A zeroed main frame with the iteration and time filled in.
    pub fn frame(iteration: i32, time: i32) -> Vec<i32> {
        let mut values = vec![0i32; FIELD_COUNT];
        values[field::LOOP_ITERATION] = iteration;
        values[field::TIME] = time;
        values
    }

    /// Write an I-frame carrying `values` verbatim.
    pub fn intra(&mut self, values: &[i32]) {
        assert_eq!(values.len(), FIELD_COUNT);
        self.data.push(b'I');
        write_unsigned_vb(&mut self.data, values[0] as u32);
        write_unsigned_vb(&mut self.data, values[1] as u32);
        for &value in &values[2..] {
            write_signed_vb(&mut self.data, value);
        }
        self.last_main = Some(values.to_vec());
    }

    /// Write a P-frame encoding `values` as deltas against the previous
    /// main frame. The iteration must advance by exactly one (the schema
    /// logs every iteration).
    pub fn inter(&mut self, values: &[i32]) {
        assert_eq!(values.len(), FIELD_COUNT);
        let previous = self.last_main.as_ref().expect("P-frame needs a preceding main frame");
        assert_eq!(
            values[field::LOOP_ITERATION],
            previous[field::LOOP_ITERATION] + 1,
            "test schema logs every iteration"
        );
        self.data.push(b'P');
        for index in 1..FIELD_COUNT {
            write_signed_vb(&mut self.data, values[index] - previous[index]);
        }
        self.last_main = Some(values.to_vec());
    }

    pub fn slow(&mut self, flight_mode_flags: u32, state_flags: u32) {
        self.data.push(b'S');
        write_unsigned_vb(&mut self.data, flight_mode_flags);
        write_unsigned_vb(&mut self.data, state_flags);
    }

    pub fn event_sync_beep(&mut self, beep_time: u32) {
        self.data.push(b'E');
        self.data.push(0);
        write_unsigned_vb(&mut self.data, beep_time);
    }

    pub fn event_flight_mode(&mut self, new_flags: u32, last_flags: u32) {
        self.data.push(b'E');
        self.data.push(30);
        write_unsigned_vb(&mut self.data, new_flags);
        write_unsigned_vb(&mut self.data, last_flags);
    }

    pub fn event_disarm(&mut self, reason: u32) {
        self.data.push(b'E');
        self.data.push(15);
        write_unsigned_vb(&mut self.data, reason);
    }

    pub fn event_logging_resume(&mut self, iteration: u32, time: u32) {
        self.data.push(b'E');
        self.data.push(14);
        write_unsigned_vb(&mut self.data, iteration);
        write_unsigned_vb(&mut self.data, time);
        // The decoder resumes validation from this point; later frames
        // encode against whatever history the writer kept.
    }

    pub fn log_end(&mut self) {
        self.data.push(b'E');
        self.data.push(255);
        self.data.extend_from_slice(b"End of log\0");
    }

    /// Inject raw bytes, e.g. to simulate radio dropouts in the stream.
    pub fn garbage(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn last_main(&self) -> Option<&[i32]> {
        self.last_main.as_deref()
    }

    pub fn set_last_main(&mut self, values: &[i32]) {
        self.last_main = Some(values.to_vec());
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}
