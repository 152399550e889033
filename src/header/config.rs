//! Typed system configuration assembled from header key/value lines.
//!
//! The header is a free-form `key:value` dictionary on the wire. Instead of
//! carrying that dictionary around, every key the decoder understands has a
//! typed field here, seeded with firmware defaults and overwritten as lines
//! arrive. Keys are normalized through one alias table before dispatch, and
//! values whose scale depends on the firmware are normalized at ingestion
//! so downstream consumers never re-check versions.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Firmware families recognized in `Firmware revision` headers.
///
/// Discriminants match the order the reference tooling reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmwareType {
    Unknown = 0,
    Baseflight = 1,
    Cleanflight = 2,
    Betaflight = 3,
    Inav = 4,
    Raceflight = 5,
}

impl Default for FirmwareType {
    fn default() -> Self {
        FirmwareType::Unknown
    }
}

/// System configuration for one sub-log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysConfig {
    pub firmware_type: FirmwareType,
    /// Full version string, e.g. "4.2.0"; empty when undetected.
    pub firmware_version: String,
    /// MAJOR.MINOR as a float, e.g. 4.2.
    pub firmware: f64,
    pub firmware_patch: i32,
    pub firmware_date: Option<String>,
    pub board_information: Option<String>,
    pub log_start_datetime: Option<String>,
    pub craft_name: Option<String>,

    pub data_version: i32,
    pub frame_interval_i: i32,
    pub frame_interval_p_num: i32,
    pub frame_interval_p_denom: i32,

    pub looptime: i32,
    pub gyro_sync_denom: i32,
    pub pid_process_denom: i32,
    pub pid_controller: i32,
    pub super_expo_factor: i32,
    pub rates_type: i32,
    pub deadband: i32,
    pub yaw_deadband: i32,
    pub acc_1g: i32,
    pub debug_mode: i32,
    pub features: i32,
    pub fields_disabled_mask: i32,
    pub motor_pwm_protocol: i32,
    pub motor_pwm_rate: i32,
    pub dshot_bidir: i32,
    pub motor_poles: i32,
    pub rc_interpolation: i32,
    pub rc_interpolation_interval: i32,
    pub serialrx_provider: i32,
    pub use_unsynced_pwm: i32,
    pub digital_idle_offset: f64,
    pub blackbox_high_resolution: i32,
    pub gyro_hardware_lpf: i32,

    pub minthrottle: i32,
    pub maxthrottle: i32,
    /// Motor output range; `[0]` feeds the MINMOTOR predictor.
    pub motor_output: [i32; 2],

    pub vbatscale: i32,
    pub vbatref: i32,
    pub vbatmincellvoltage: i32,
    pub vbatwarningcellvoltage: i32,
    pub vbatmaxcellvoltage: i32,
    pub current_meter_offset: i32,
    pub current_meter_scale: i32,

    /// Gyro scale in radians per microsecond per LSB once normalized.
    pub gyro_scale: f64,

    pub rc_rate: i32,
    pub rc_rates: [i32; 3],
    pub rc_expo: [i32; 3],
    pub rates: [i32; 3],
    pub rate_limits: Option<[i32; 3]>,

    pub roll_pid: Vec<f64>,
    pub pitch_pid: Vec<f64>,
    pub yaw_pid: Vec<f64>,
    pub mag_pid: Vec<f64>,
    pub d_min: Vec<i32>,
    pub ff_weight: Vec<i32>,

    pub pid_sum_limit: f64,
    pub pid_sum_limit_yaw: f64,

    pub gyro_lowpass_hz: f64,
    pub gyro_lowpass2_hz: f64,
    pub gyro_lowpass_dyn_hz: Vec<i32>,
    pub gyro_notch_hz: Vec<f64>,
    pub gyro_notch_cutoff: Vec<f64>,
    pub dterm_lpf_hz: f64,
    pub dterm_lpf2_hz: f64,
    pub dterm_lpf_dyn_hz: Vec<i32>,
    pub dterm_notch_hz: f64,
    pub dterm_notch_cutoff: f64,
    pub yaw_lpf_hz: f64,
    pub rc_smoothing_cutoffs: Vec<i32>,

    pub rate_accel_limit: f64,
    pub yaw_rate_accel_limit: f64,

    /// Header lines the decoder did not recognize, kept verbatim.
    pub unknown_headers: Vec<(String, String)>,
}

impl Default for SysConfig {
    fn default() -> Self {
        Self {
            firmware_type: FirmwareType::Unknown,
            firmware_version: String::new(),
            firmware: 0.0,
            firmware_patch: 0,
            firmware_date: None,
            board_information: None,
            log_start_datetime: None,
            craft_name: None,

            data_version: 0,
            frame_interval_i: 32,
            frame_interval_p_num: 1,
            frame_interval_p_denom: 1,

            looptime: 3500,
            gyro_sync_denom: 1,
            pid_process_denom: 1,
            pid_controller: 0,
            super_expo_factor: 100,
            rates_type: 0,
            deadband: 0,
            yaw_deadband: 0,
            acc_1g: 4096,
            debug_mode: 0,
            features: 0,
            fields_disabled_mask: 0,
            motor_pwm_protocol: 0,
            motor_pwm_rate: 0,
            dshot_bidir: 0,
            motor_poles: 14,
            rc_interpolation: 0,
            rc_interpolation_interval: 0,
            serialrx_provider: 0,
            use_unsynced_pwm: 0,
            digital_idle_offset: 0.0,
            blackbox_high_resolution: 0,
            gyro_hardware_lpf: 0,

            minthrottle: 1150,
            maxthrottle: 1850,
            motor_output: [1150, 1850],

            vbatscale: 110,
            vbatref: 4095,
            vbatmincellvoltage: 33,
            vbatwarningcellvoltage: 35,
            vbatmaxcellvoltage: 43,
            current_meter_offset: 0,
            current_meter_scale: 400,

            gyro_scale: 0.0001,

            rc_rate: 90,
            rc_rates: [90, 90, 90],
            rc_expo: [0, 0, 0],
            rates: [18, 18, 100],
            rate_limits: None,

            roll_pid: Vec::new(),
            pitch_pid: Vec::new(),
            yaw_pid: Vec::new(),
            mag_pid: Vec::new(),
            d_min: Vec::new(),
            ff_weight: Vec::new(),

            pid_sum_limit: 0.0,
            pid_sum_limit_yaw: 0.0,

            gyro_lowpass_hz: 0.0,
            gyro_lowpass2_hz: 0.0,
            gyro_lowpass_dyn_hz: Vec::new(),
            gyro_notch_hz: Vec::new(),
            gyro_notch_cutoff: Vec::new(),
            dterm_lpf_hz: 0.0,
            dterm_lpf2_hz: 0.0,
            dterm_lpf_dyn_hz: Vec::new(),
            dterm_notch_hz: 0.0,
            dterm_notch_cutoff: 0.0,
            yaw_lpf_hz: 0.0,
            rc_smoothing_cutoffs: Vec::new(),

            rate_accel_limit: 0.0,
            yaw_rate_accel_limit: 0.0,

            unknown_headers: Vec::new(),
        }
    }
}

impl SysConfig {
    /// Single version predicate behind every scale gate: true when the
    /// firmware family matches and the detected version is at least
    /// `major.minor.patch`.
    pub fn firmware_at_least(&self, family: FirmwareType, major: u32, minor: u32, patch: u32) -> bool {
        if self.firmware_type != family {
            return false;
        }
        let Some(version) = parse_version(&self.firmware_version) else {
            return false;
        };
        version >= (major, minor, patch)
    }

    fn filters_use_new_scale(&self) -> bool {
        self.firmware_at_least(FirmwareType::Betaflight, 3, 1, 0)
            || self.firmware_at_least(FirmwareType::Cleanflight, 2, 0, 0)
    }

    /// Ingest one normalized-key header line.
    pub(crate) fn apply_header(&mut self, key: &str, value: &str) {
        let key = normalize_key(key);
        match key {
            "I interval" => {
                self.frame_interval_i = int(value).max(1);
            }
            "P interval" => {
                if let Some((num, denom)) = value.split_once('/') {
                    self.frame_interval_p_num = int(num).max(1);
                    self.frame_interval_p_denom = int(denom).max(1);
                } else {
                    self.frame_interval_p_num = 1;
                    self.frame_interval_p_denom = int(value).max(1);
                }
            }
            "Data version" => self.data_version = int(value),
            // The product banner doubles as the first header line.
            "Product" => {}
            "Firmware type" => {
                self.firmware_type = if value == "Cleanflight" {
                    FirmwareType::Cleanflight
                } else {
                    FirmwareType::Baseflight
                };
            }
            "Firmware revision" => self.parse_firmware_revision(value),
            "Firmware date" => self.firmware_date = Some(value.to_string()),
            "Board information" => self.board_information = Some(value.to_string()),
            "Log start datetime" => self.log_start_datetime = Some(value.to_string()),
            "Craft name" => self.craft_name = Some(value.to_string()),

            "looptime" => self.looptime = int(value),
            "gyro_sync_denom" => self.gyro_sync_denom = int(value),
            "pid_process_denom" => self.pid_process_denom = int(value),
            "pidController" => self.pid_controller = int(value),
            "superExpoFactor" => self.super_expo_factor = int(value),
            "rates_type" => self.rates_type = int(value),
            "deadband" => self.deadband = int(value),
            "yaw_deadband" => self.yaw_deadband = int(value),
            "acc_1G" => self.acc_1g = int(value),
            "debug_mode" => self.debug_mode = int(value),
            "features" => self.features = int(value),
            "fields_disabled_mask" => self.fields_disabled_mask = int(value),
            "motor_pwm_protocol" => self.motor_pwm_protocol = int(value),
            "motor_pwm_rate" => self.motor_pwm_rate = int(value),
            "dshot_bidir" => self.dshot_bidir = int(value),
            "motor_poles" => self.motor_poles = int(value),
            "rc_interpolation" => self.rc_interpolation = int(value),
            "rc_interpolation_interval" => self.rc_interpolation_interval = int(value),
            "serialrx_provider" => self.serialrx_provider = int(value),
            "use_unsynced_pwm" => self.use_unsynced_pwm = int(value),
            "digitalIdleOffset" => self.digital_idle_offset = int(value) as f64 / 100.0,
            "blackbox_high_resolution" => self.blackbox_high_resolution = int(value),
            "gyro_hardware_lpf" => self.gyro_hardware_lpf = int(value),

            "minthrottle" => {
                self.minthrottle = int(value);
                self.motor_output[0] = self.minthrottle;
            }
            "maxthrottle" => {
                self.maxthrottle = int(value);
                self.motor_output[1] = self.maxthrottle;
            }
            "motorOutput" => {
                let v = csv_i32(value, 2);
                self.motor_output = [v[0], v[1]];
            }

            "vbatscale" => self.vbatscale = int(value),
            "vbatref" => self.vbatref = int(value),
            "vbatcellvoltage" => {
                let v = csv_i32(value, 3);
                self.vbatmincellvoltage = v[0];
                self.vbatwarningcellvoltage = v[1];
                self.vbatmaxcellvoltage = v[2];
            }
            "currentMeter" => {
                let v = csv_i32(value, 2);
                self.current_meter_offset = v[0];
                self.current_meter_scale = v[1];
            }

            "gyro_scale" => {
                let mut scale = hex_to_float(value);
                if matches!(
                    self.firmware_type,
                    FirmwareType::Betaflight | FirmwareType::Cleanflight | FirmwareType::Inav
                ) {
                    scale = scale * (PI / 180.0) * 0.000001;
                }
                self.gyro_scale = scale;
            }

            "rcRate" => self.rc_rate = int(value),
            "rc_rates" => self.rc_rates = triple(value, self.rc_rates),
            "rc_expo" => self.rc_expo = triple(value, self.rc_expo),
            "rates" => self.rates = triple(value, self.rates),
            "rate_limits" => self.rate_limits = Some(triple(value, [0, 0, 0])),

            "rollPID" => self.roll_pid = csv_f64(value),
            "pitchPID" => self.pitch_pid = csv_f64(value),
            "yawPID" => self.yaw_pid = csv_f64(value),
            "magPID" => self.mag_pid = csv_f64(value),
            "d_min" => self.d_min = csv_i32(value, 3),
            "ff_weight" => self.ff_weight = csv_i32(value, 3),

            "pidSumLimit" => self.pid_sum_limit = float(value),
            "pidSumLimitYaw" => self.pid_sum_limit_yaw = float(value),

            "gyro_lowpass_hz" => self.gyro_lowpass_hz = self.filter_hz(value),
            "gyro_lowpass2_hz" => self.gyro_lowpass2_hz = self.filter_hz(value),
            "gyro_lowpass_dyn_hz" => self.gyro_lowpass_dyn_hz = csv_i32(value, 2),
            "gyro_notch_hz" => {
                let scale = if self.filters_use_new_scale() { 1.0 } else { 0.01 };
                self.gyro_notch_hz = csv_f64(value).into_iter().map(|v| v * scale).collect();
            }
            "gyro_notch_cutoff" => {
                let scale = if self.filters_use_new_scale() { 1.0 } else { 0.01 };
                self.gyro_notch_cutoff = csv_f64(value).into_iter().map(|v| v * scale).collect();
            }
            "dterm_lpf_hz" => self.dterm_lpf_hz = self.filter_hz(value),
            "dterm_lpf2_hz" => self.dterm_lpf2_hz = self.filter_hz(value),
            "dterm_lpf_dyn_hz" => self.dterm_lpf_dyn_hz = csv_i32(value, 2),
            "dterm_notch_hz" => self.dterm_notch_hz = self.filter_hz(value),
            "dterm_notch_cutoff" => self.dterm_notch_cutoff = self.filter_hz(value),
            "yaw_lpf_hz" => self.yaw_lpf_hz = self.filter_hz(value),
            "rc_smoothing_cutoffs" => self.rc_smoothing_cutoffs = csv_i32(value, 2),

            "rateAccelLimit" => self.rate_accel_limit = self.accel_limit(value),
            "yawRateAccelLimit" => self.yaw_rate_accel_limit = self.accel_limit(value),

            _ => {
                debug!("unrecognized header '{}', preserving verbatim", key);
                self.unknown_headers.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Filter frequencies switched from centihertz to hertz at the same
    /// firmware versions that rescaled the acceleration limits.
    fn filter_hz(&self, value: &str) -> f64 {
        let raw = float(value);
        if self.filters_use_new_scale() {
            raw
        } else {
            raw / 100.0
        }
    }

    fn accel_limit(&self, value: &str) -> f64 {
        let raw = float(value);
        if self.filters_use_new_scale() {
            raw / 1000.0
        } else {
            raw
        }
    }

    fn parse_firmware_revision(&mut self, value: &str) {
        const FAMILIES: [(&str, FirmwareType); 4] = [
            ("betaflight", FirmwareType::Betaflight),
            ("cleanflight", FirmwareType::Cleanflight),
            ("raceflight", FirmwareType::Raceflight),
            ("inav", FirmwareType::Inav),
        ];

        let haystack = value.to_ascii_lowercase();
        let Some((family, at)) = FAMILIES
            .iter()
            .filter_map(|&(name, family)| haystack.find(name).map(|at| (family, at + name.len())))
            .min_by_key(|&(_, at)| at)
        else {
            debug!("firmware revision '{}' did not match a known family", value);
            return;
        };

        let rest = value[at..].trim_start();
        let digits: String =
            rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
        let mut parts = digits.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);

        self.firmware_type = family;
        self.firmware = major as f64 + minor as f64 / 10.0_f64.powi(minor.to_string().len() as i32);
        self.firmware_patch = patch as i32;
        self.firmware_version = format!("{major}.{minor}.{patch}");
    }
}

/// Normalize header keys through the alias table before dispatch.
fn normalize_key(key: &str) -> &str {
    match key {
        "dterm_lowpass_hz" | "dterm_lpf1_static_hz" => "dterm_lpf_hz",
        "dterm_lowpass_dyn_hz" | "dterm_lpf1_dyn_hz" => "dterm_lpf_dyn_hz",
        "dterm_lowpass2_hz" | "dterm_lpf2_static_hz" => "dterm_lpf2_hz",
        "gyro_lpf1_static_hz" => "gyro_lowpass_hz",
        "gyro_lpf2_static_hz" => "gyro_lowpass2_hz",
        "gyro_lpf1_dyn_hz" => "gyro_lowpass_dyn_hz",
        "gyro_hardware_lpf" | "gyro_lpf" => "gyro_hardware_lpf",
        "vbat_scale" => "vbatscale",
        "currentSensor" => "currentMeter",
        "pid_controller" => "pidController",
        "pidsum_limit" => "pidSumLimit",
        "pidsum_limit_yaw" => "pidSumLimitYaw",
        "rc_rate" => "rcRate",
        "gyro.scale" => "gyro_scale",
        "digital_idle_percent" => "digitalIdleOffset",
        other => other,
    }
}

/// Integer coercion in the spirit of the reference tooling: integers parse
/// directly, floats truncate, anything else is zero.
fn int(value: &str) -> i32 {
    let value = value.trim();
    if let Ok(v) = value.parse::<i32>() {
        return v;
    }
    if let Ok(v) = value.parse::<f64>() {
        return v as i32;
    }
    warn!("unparseable integer header value '{}', treating as 0", value);
    0
}

fn float(value: &str) -> f64 {
    let value = value.trim();
    value.parse::<f64>().unwrap_or_else(|_| {
        warn!("unparseable numeric header value '{}', treating as 0", value);
        0.0
    })
}

/// Split a comma-separated list of integers, right-padding with zeros to
/// `min_len`.
fn csv_i32(value: &str, min_len: usize) -> Vec<i32> {
    let mut values: Vec<i32> = value.split(',').map(int).collect();
    if values.len() < min_len {
        values.resize(min_len, 0);
    }
    values
}

fn csv_f64(value: &str) -> Vec<f64> {
    value.split(',').map(float).collect()
}

fn triple(value: &str, mut current: [i32; 3]) -> [i32; 3] {
    let parsed = csv_i32(value, 0);
    match parsed.len() {
        0 => {}
        // A scalar value applies to all three axes
        1 => current = [parsed[0]; 3],
        _ => {
            for (slot, v) in current.iter_mut().zip(parsed) {
                *slot = v;
            }
        }
    }
    current
}

/// Interpret a hex string as the bit pattern of an IEEE-754 float32.
fn hex_to_float(value: &str) -> f64 {
    let digits = value.trim().trim_start_matches("0x").trim_start_matches("0X");
    match u32::from_str_radix(digits, 16) {
        Ok(bits) => f32::from_bits(bits) as f64,
        Err(_) => {
            warn!("unparseable hex float '{}', treating as 0", value);
            0.0
        }
    }
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some((major, minor, patch))
}
