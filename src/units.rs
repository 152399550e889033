//! Rate and voltage conversions consumed by the computed fields.
//!
//! Decoded frames stay in raw integer units; these helpers are the only
//! place floating point enters the picture.

use std::f64::consts::PI;

use crate::header::SysConfig;

/// Convert a raw gyro reading to degrees per second.
pub fn gyro_raw_to_deg_per_sec(config: &SysConfig, raw: i32) -> f64 {
    config.gyro_scale * 1_000_000.0 / (PI / 180.0) * raw as f64
}

/// Convert a raw RC command to the setpoint rotation rate in degrees per
/// second using the standard rates model (Betaflight 3.x / Cleanflight
/// 2.x): expo curve, rc-rate with the >2.0 extension, super-rate, and the
/// firmware's own output limits.
pub fn rc_command_raw_to_deg_per_sec(config: &SysConfig, rc_command: i32, axis: usize) -> f64 {
    let mut command = rc_command as f64 / 500.0;

    let expo = config.rc_expo[axis] as f64 / 100.0;
    if expo != 0.0 {
        command = command * command.abs().powi(3) * expo + command * (1.0 - expo);
    }

    let mut rc_rate = config.rc_rates[axis] as f64 / 100.0;
    if rc_rate > 2.0 {
        rc_rate += 14.54 * (rc_rate - 2.0);
    }

    let mut angle_rate = 200.0 * rc_rate * command;
    if config.rates[axis] != 0 {
        let super_factor =
            1.0 / (1.0 - command.abs() * config.rates[axis] as f64 / 100.0).clamp(0.01, 1.0);
        angle_rate *= super_factor;
    }

    match config.rate_limits {
        Some(limits) if config.pid_controller != 0 => {
            angle_rate.clamp(-(limits[axis] as f64), limits[axis] as f64)
        }
        // Legacy limit: clamp in quarter-degree units, then shift out
        _ => (((angle_rate * 4.1).clamp(-8190.0, 8190.0) as i32) >> 2) as f64,
    }
}

/// Convert a raw throttle RC command to a percentage of the throttle range.
pub fn rc_command_raw_to_throttle(config: &SysConfig, rc_command: i32) -> f64 {
    let range = (config.maxthrottle - config.minthrottle) as f64;
    if range <= 0.0 {
        return 0.0;
    }
    ((rc_command - config.minthrottle) as f64 / range * 100.0).clamp(0.0, 100.0)
}

/// Convert a raw battery ADC reading to millivolts.
pub fn vbat_adc_to_millivolts(config: &SysConfig, adc: i32) -> i32 {
    // 3.3V reference scaled by the configured divider
    ((adc as f64 * 33.0 * 10.0 * config.vbatscale as f64) / 4095.0).round() as i32
}
