//! Decoding statistics accumulated over one sub-log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::header::FrameType;

/// Minimum and maximum observed for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: i32,
    pub max: i32,
}

impl FieldStats {
    fn observe(&mut self, value: i32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Byte and frame counters for one frame type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTypeStats {
    pub bytes: u64,
    pub valid_count: u32,
    pub corrupt_count: u32,
    /// Frame length histogram (length in bytes to occurrence count).
    pub size_histogram: BTreeMap<usize, u32>,
}

impl FrameTypeStats {
    pub(crate) fn count_frame(&mut self, size: usize) {
        self.bytes += size as u64;
        *self.size_histogram.entry(size).or_insert(0) += 1;
        self.valid_count += 1;
    }
}

/// All statistics for one sub-log decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub intra: FrameTypeStats,
    pub inter: FrameTypeStats,
    pub slow: FrameTypeStats,
    pub event: FrameTypeStats,
    pub gps: FrameTypeStats,
    pub gps_home: FrameTypeStats,
    /// Per-field min/max over all committed main frames (I and P).
    pub main_field: Vec<FieldStats>,
    /// Per-field min/max over all slow frames.
    pub slow_field: Vec<FieldStats>,
    pub total_corrupted_frames: u32,
    /// Iterations the sampling rate deliberately never logged.
    pub intentionally_absent_iterations: u32,
}

impl LogStats {
    pub fn frame_type(&self, frame_type: FrameType) -> &FrameTypeStats {
        match frame_type {
            FrameType::Intra => &self.intra,
            FrameType::Inter => &self.inter,
            FrameType::Slow => &self.slow,
            FrameType::Event => &self.event,
            FrameType::Gps => &self.gps,
            FrameType::GpsHome => &self.gps_home,
        }
    }

    pub(crate) fn frame_type_mut(&mut self, frame_type: FrameType) -> &mut FrameTypeStats {
        match frame_type {
            FrameType::Intra => &mut self.intra,
            FrameType::Inter => &mut self.inter,
            FrameType::Slow => &mut self.slow,
            FrameType::Event => &mut self.event,
            FrameType::Gps => &mut self.gps,
            FrameType::GpsHome => &mut self.gps_home,
        }
    }

    pub(crate) fn observe_main_frame(&mut self, frame: &[i32]) {
        observe_fields(&mut self.main_field, frame);
    }

    pub(crate) fn observe_slow_frame(&mut self, frame: &[i32]) {
        observe_fields(&mut self.slow_field, frame);
    }

    /// Main-frame field ranges followed by slow-frame field ranges, the
    /// same order the merged per-iteration record lays fields out in.
    pub fn merged_field_stats(&self) -> Vec<FieldStats> {
        let mut merged = self.main_field.clone();
        merged.extend_from_slice(&self.slow_field);
        merged
    }
}

fn observe_fields(stats: &mut Vec<FieldStats>, frame: &[i32]) {
    if stats.len() < frame.len() {
        let start = stats.len();
        stats.extend(frame[start..].iter().map(|&v| FieldStats { min: v, max: v }));
        for (slot, &value) in stats.iter_mut().zip(frame).take(start) {
            slot.observe(value);
        }
    } else {
        for (slot, &value) in stats.iter_mut().zip(frame) {
            slot.observe(value);
        }
    }
}
