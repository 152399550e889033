//! Per-frame-type field definitions parsed from the log header.
//!
//! Every frame type describes its fields with four parallel header lines
//! (`Field X name`, `Field X signed`, `Field X predictor`,
//! `Field X encoding`). The interframe definition shares the intraframe's
//! schema: only its predictor and encoding arrays are its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{DecodeError, Result};

/// Position of the loop-iteration counter in main frames.
pub const ITERATION_FIELD_INDEX: usize = 0;
/// Position of the timestamp (microseconds) in main frames.
pub const TIME_FIELD_INDEX: usize = 1;

/// The frame types that can appear in the binary section of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// `I`: self-contained main-loop snapshot.
    Intra,
    /// `P`: main-loop snapshot encoded as deltas against history.
    Inter,
    /// `S`: rarely-changing state, merged into main frames as context.
    Slow,
    /// `E`: event with a type byte and a kind-specific payload.
    Event,
    /// `G`: GPS fix (skipped, kept only for stream continuity).
    Gps,
    /// `H`: GPS home position (skipped likewise).
    GpsHome,
}

impl FrameType {
    /// Map a marker byte to its frame type.
    pub fn from_marker(marker: i32) -> Option<Self> {
        match u8::try_from(marker).ok()? {
            b'I' => Some(FrameType::Intra),
            b'P' => Some(FrameType::Inter),
            b'S' => Some(FrameType::Slow),
            b'E' => Some(FrameType::Event),
            b'G' => Some(FrameType::Gps),
            b'H' => Some(FrameType::GpsHome),
            _ => None,
        }
    }

    pub fn marker(self) -> char {
        match self {
            FrameType::Intra => 'I',
            FrameType::Inter => 'P',
            FrameType::Slow => 'S',
            FrameType::Event => 'E',
            FrameType::Gps => 'G',
            FrameType::GpsHome => 'H',
        }
    }
}

/// Field schema for one frame type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameDef {
    /// Ordered field names, legacy aliases already translated.
    pub names: Vec<String>,
    /// Name to field position (O(1) lookup).
    pub name_to_index: HashMap<String, usize>,
    /// Per-field signedness; sized to the field count, false-filled when
    /// the header omits the line.
    pub signed: Vec<bool>,
    /// Per-field predictor codes.
    pub predictors: Vec<u8>,
    /// Per-field encoding codes.
    pub encodings: Vec<u8>,
}

impl FrameDef {
    pub fn count(&self) -> usize {
        self.names.len()
    }

    /// A definition can drive the codec once it has names and matching
    /// predictor/encoding arrays.
    pub fn is_complete(&self) -> bool {
        !self.names.is_empty()
            && self.predictors.len() == self.names.len()
            && self.encodings.len() == self.names.len()
    }

    pub fn is_present(&self) -> bool {
        !self.names.is_empty() || !self.encodings.is_empty() || !self.predictors.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Whether a field of this name exists. Index 0 is a valid position,
    /// so presence is never inferred from the index value itself.
    pub fn has_field(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub(crate) fn set_names(&mut self, csv: &str) {
        self.names = csv.split(',').map(|n| translate_legacy_field_name(n.trim())).collect();
        self.name_to_index =
            self.names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        self.signed.resize(self.names.len(), false);
    }

    pub(crate) fn set_signed(&mut self, csv: &str) {
        self.signed = csv.split(',').map(|v| v.trim() != "0").collect();
    }

    pub(crate) fn set_predictors(&mut self, csv: &str) {
        self.predictors = parse_code_list(csv);
    }

    pub(crate) fn set_encodings(&mut self, csv: &str) {
        self.encodings = parse_code_list(csv);
    }
}

fn parse_code_list(csv: &str) -> Vec<u8> {
    csv.split(',')
        .map(|v| {
            v.trim().parse::<u8>().unwrap_or_else(|_| {
                warn!("unparseable field code '{}', substituting 0", v);
                0
            })
        })
        .collect()
}

/// Translate field names emitted by old firmware to their modern spelling.
fn translate_legacy_field_name(name: &str) -> String {
    match name.strip_prefix("gyroData") {
        Some(rest) => format!("gyroADC{rest}"),
        None => name.to_string(),
    }
}

/// The full set of frame definitions for one sub-log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameDefs {
    pub intra: FrameDef,
    pub inter: FrameDef,
    pub slow: FrameDef,
    pub event: FrameDef,
    pub gps: FrameDef,
    pub gps_home: FrameDef,
}

impl FrameDefs {
    pub fn get(&self, frame_type: FrameType) -> &FrameDef {
        match frame_type {
            FrameType::Intra => &self.intra,
            FrameType::Inter => &self.inter,
            FrameType::Slow => &self.slow,
            FrameType::Event => &self.event,
            FrameType::Gps => &self.gps,
            FrameType::GpsHome => &self.gps_home,
        }
    }

    pub(crate) fn get_mut(&mut self, frame_type: FrameType) -> &mut FrameDef {
        match frame_type {
            FrameType::Intra => &mut self.intra,
            FrameType::Inter => &mut self.inter,
            FrameType::Slow => &mut self.slow,
            FrameType::Event => &mut self.event,
            FrameType::Gps => &mut self.gps,
            FrameType::GpsHome => &mut self.gps_home,
        }
    }

    /// Apply the completion gate after the header has been consumed.
    ///
    /// The intraframe definition must be complete and an interframe
    /// definition must exist; the interframe inherits the intraframe's
    /// schema. Slow/GPS definitions are optional, and an incomplete one is
    /// dropped rather than failing the whole sub-log.
    pub(crate) fn finalize(&mut self) -> Result<()> {
        if !self.intra.is_complete() {
            return Err(DecodeError::header_incomplete(
                'I',
                format!(
                    "definition has {} names, {} predictors, {} encodings",
                    self.intra.names.len(),
                    self.intra.predictors.len(),
                    self.intra.encodings.len()
                ),
            ));
        }
        // Frame validation reads these two by position.
        if self.intra.count() <= TIME_FIELD_INDEX {
            return Err(DecodeError::header_incomplete(
                'I',
                "main frames need at least the iteration and time fields".to_string(),
            ));
        }

        if self.inter.predictors.is_empty() || self.inter.encodings.is_empty() {
            return Err(DecodeError::header_incomplete('P', "definition is missing".to_string()));
        }
        if self.inter.predictors.len() != self.intra.count()
            || self.inter.encodings.len() != self.intra.count()
        {
            return Err(DecodeError::header_incomplete(
                'P',
                format!(
                    "{} predictors and {} encodings for {} fields",
                    self.inter.predictors.len(),
                    self.inter.encodings.len(),
                    self.intra.count()
                ),
            ));
        }
        // P shares the I schema; only its predictor/encoding arrays differ.
        self.inter.names = self.intra.names.clone();
        self.inter.name_to_index = self.intra.name_to_index.clone();
        self.inter.signed = self.intra.signed.clone();

        for (def, marker) in
            [(&mut self.slow, 'S'), (&mut self.gps, 'G'), (&mut self.gps_home, 'H')]
        {
            if def.is_present() && !def.is_complete() {
                debug!("incomplete '{}' frame definition, ignoring those frames", marker);
                *def = FrameDef::default();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_defs() -> FrameDefs {
        let mut defs = FrameDefs::default();
        defs.intra.set_names("loopIteration,time,motor[0]");
        defs.intra.set_predictors("0,0,0");
        defs.intra.set_encodings("1,1,0");
        defs.inter.set_predictors("6,2,1");
        defs.inter.set_encodings("9,0,0");
        defs
    }

    #[test]
    fn marker_round_trip() {
        for ft in
            [FrameType::Intra, FrameType::Inter, FrameType::Slow, FrameType::Event, FrameType::Gps]
        {
            assert_eq!(FrameType::from_marker(ft.marker() as i32), Some(ft));
        }
        assert_eq!(FrameType::from_marker(b'X' as i32), None);
        assert_eq!(FrameType::from_marker(-1), None);
    }

    #[test]
    fn set_names_builds_index_and_sizes_signed() {
        let mut def = FrameDef::default();
        def.set_names("loopIteration,time,axisP[0]");
        assert_eq!(def.count(), 3);
        assert_eq!(def.index_of("time"), Some(1));
        assert_eq!(def.index_of("loopIteration"), Some(0));
        assert!(def.has_field("loopIteration"));
        assert!(!def.has_field("gyroADC[0]"));
        assert_eq!(def.signed.len(), 3);
    }

    #[test]
    fn legacy_gyro_names_translate() {
        let mut def = FrameDef::default();
        def.set_names("gyroDataX,gyroDataY,gyroDataZ");
        assert_eq!(def.names, vec!["gyroADCX", "gyroADCY", "gyroADCZ"]);
    }

    #[test]
    fn finalize_inherits_inter_schema_from_intra() {
        let mut defs = minimal_defs();
        defs.finalize().expect("complete defs should finalize");
        assert_eq!(defs.inter.names, defs.intra.names);
        assert_eq!(defs.inter.index_of("motor[0]"), Some(2));
        assert_eq!(defs.inter.signed.len(), 3);
    }

    #[test]
    fn finalize_requires_complete_intra() {
        let mut defs = minimal_defs();
        defs.intra.encodings.pop();
        let err = defs.finalize().unwrap_err();
        assert!(matches!(err, DecodeError::HeaderIncomplete { frame_type: 'I', .. }));
    }

    #[test]
    fn finalize_requires_inter_definition() {
        let mut defs = minimal_defs();
        defs.inter = FrameDef::default();
        let err = defs.finalize().unwrap_err();
        assert!(matches!(err, DecodeError::HeaderIncomplete { frame_type: 'P', .. }));
    }

    #[test]
    fn finalize_drops_incomplete_slow_def() {
        let mut defs = minimal_defs();
        defs.slow.set_names("flightModeFlags,stateFlags");
        // No predictors/encodings: retained names but unusable
        defs.finalize().expect("incomplete slow def is not fatal");
        assert_eq!(defs.slow.count(), 0);
    }
}
