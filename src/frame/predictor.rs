//! Field predictors: how a raw delta becomes an absolute value.

use serde::{Deserialize, Serialize};

/// Rule for reconstructing a field's absolute value from its raw decoded
/// value plus historical context and configured constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predictor {
    /// The raw value is already absolute.
    Zero,
    /// Add the same field from the previous main frame.
    Previous,
    /// Linear extrapolation from the two previous main frames.
    StraightLine,
    /// Average of the two previous main frames, truncated toward zero.
    Average2,
    /// Add the configured minimum throttle.
    MinThrottle,
    /// Add `motor[0]` from the current frame (which must decode first).
    Motor0,
    /// Synthesized iteration counter; consumes no bytes.
    Increment,
    /// Add the constant 1500 (RC midpoint).
    Fixed1500,
    /// Add the configured battery reference reading.
    VbatRef,
    /// Add the previous main frame's timestamp.
    LastMainFrameTime,
    /// Raw value reinterpreted as signed, plus the minimum motor output.
    MinMotor,
}

impl Predictor {
    /// Map a header predictor code to its variant. Code 7 (GPS home
    /// coordinate) is deliberately unmapped: GPS decoding is out of scope
    /// and a main-frame field predicted from it cannot be reconstructed.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Predictor::Zero),
            1 => Some(Predictor::Previous),
            2 => Some(Predictor::StraightLine),
            3 => Some(Predictor::Average2),
            4 => Some(Predictor::MinThrottle),
            5 => Some(Predictor::Motor0),
            6 => Some(Predictor::Increment),
            8 => Some(Predictor::Fixed1500),
            9 => Some(Predictor::VbatRef),
            10 => Some(Predictor::LastMainFrameTime),
            11 => Some(Predictor::MinMotor),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Predictor::Zero => 0,
            Predictor::Previous => 1,
            Predictor::StraightLine => 2,
            Predictor::Average2 => 3,
            Predictor::MinThrottle => 4,
            Predictor::Motor0 => 5,
            Predictor::Increment => 6,
            Predictor::Fixed1500 => 8,
            Predictor::VbatRef => 9,
            Predictor::LastMainFrameTime => 10,
            Predictor::MinMotor => 11,
        }
    }
}
