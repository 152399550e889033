//! Frame field codec.
//!
//! Given a frame definition, the codec walks the field list in order,
//! letting each field's encoding pull bytes from the stream and each
//! field's predictor turn the raw result into an absolute value against up
//! to two frames of history. The tagged group encodings decode several
//! consecutive fields from one read; predictors still apply per field, in
//! field order.
//!
//! All arithmetic is wrapping 32-bit two's-complement; the only division
//! (the two-frame average) truncates toward zero.

mod encoding;
mod predictor;

pub use encoding::Encoding;
pub use predictor::Predictor;

use crate::error::{DecodeError, Result};
use crate::header::{FrameDef, SysConfig};
use crate::stream::ByteStream;

/// Inputs a predictor may draw on besides frame history.
pub(crate) struct PredictorContext<'a> {
    pub config: &'a SysConfig,
    /// Position of `motor[0]` in the main frame, if that field exists.
    pub motor0_index: Option<usize>,
    /// Timestamp of the previous committed main frame.
    pub last_main_time: Option<i32>,
    /// Iterations the sampling rate intentionally skipped before this frame.
    pub skipped_frames: i32,
}

/// Decode one frame's fields into `current`.
///
/// `previous`/`previous2` are the one- and two-back main frames, absent at
/// the start of the stream or after a resynchronization. With `lenient`
/// set, unsupported predictors degrade to no prediction instead of
/// failing; that mode exists for GPS frames, which are decoded only to
/// find their end.
pub(crate) fn decode_frame(
    stream: &mut ByteStream,
    def: &FrameDef,
    current: &mut [i32],
    previous: Option<&[i32]>,
    previous2: Option<&[i32]>,
    ctx: &PredictorContext,
    lenient: bool,
) -> Result<()> {
    let count = def.count();
    let mut group = [0i32; 8];
    let mut i = 0;

    while i < count {
        let predictor = resolve_predictor(def, i, lenient)?;

        if predictor == Predictor::Increment {
            // Synthesized from the skip count; no bytes on the wire.
            let base = previous.map(|p| p[i]).unwrap_or(0);
            current[i] = base.wrapping_add(ctx.skipped_frames).wrapping_add(1);
            i += 1;
            continue;
        }

        let encoding = Encoding::from_code(def.encodings[i]).ok_or_else(|| {
            DecodeError::UnsupportedEncoding { field: def.names[i].clone(), code: def.encodings[i] }
        })?;

        let group_size = match encoding {
            Encoding::SignedVb => {
                group[0] = stream.read_signed_vb();
                1
            }
            Encoding::UnsignedVb => {
                group[0] = stream.read_unsigned_vb() as i32;
                1
            }
            Encoding::Neg14Bit => {
                group[0] = stream.read_neg_14bit();
                1
            }
            Encoding::Null => {
                group[0] = 0;
                1
            }
            Encoding::Tag8_8Svb => {
                // The group is the run of consecutive fields with this
                // encoding, up to eight.
                let mut end = i + 1;
                while end < count
                    && end < i + Encoding::Tag8_8Svb.max_group_size()
                    && def.encodings[end] == Encoding::Tag8_8Svb.code()
                {
                    end += 1;
                }
                let n = end - i;
                stream.read_tag8_8svb(&mut group[..n], n);
                n
            }
            Encoding::Tag2_3S32 => {
                let mut values = [0i32; 3];
                stream.read_tag2_3s32(&mut values);
                group[..3].copy_from_slice(&values);
                3.min(count - i)
            }
            Encoding::Tag2_3SVariable => {
                let mut values = [0i32; 3];
                stream.read_tag2_3s_variable(&mut values);
                group[..3].copy_from_slice(&values);
                3.min(count - i)
            }
            Encoding::Tag8_4S16 => {
                let mut values = [0i32; 4];
                if ctx.config.data_version < 2 {
                    stream.read_tag8_4s16_v1(&mut values);
                } else {
                    stream.read_tag8_4s16_v2(&mut values);
                }
                group[..4].copy_from_slice(&values);
                4.min(count - i)
            }
        };

        for j in 0..group_size {
            let predictor = resolve_predictor(def, i, lenient)?;
            current[i] =
                apply_prediction(def, i, predictor, group[j], current, previous, previous2, ctx)?;
            i += 1;
        }
    }

    Ok(())
}

fn resolve_predictor(def: &FrameDef, index: usize, lenient: bool) -> Result<Predictor> {
    match Predictor::from_code(def.predictors[index]) {
        Some(predictor) => Ok(predictor),
        None if lenient => Ok(Predictor::Zero),
        None => Err(DecodeError::UnsupportedPredictor {
            field: def.names[index].clone(),
            code: def.predictors[index],
        }),
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_prediction(
    def: &FrameDef,
    index: usize,
    predictor: Predictor,
    raw: i32,
    current: &[i32],
    previous: Option<&[i32]>,
    previous2: Option<&[i32]>,
    ctx: &PredictorContext,
) -> Result<i32> {
    let value = match predictor {
        Predictor::Zero => raw,
        Predictor::Previous => match previous {
            Some(previous) => raw.wrapping_add(previous[index]),
            None => raw,
        },
        Predictor::StraightLine => match (previous, previous2) {
            (Some(previous), Some(previous2)) => raw.wrapping_add(
                previous[index].wrapping_mul(2).wrapping_sub(previous2[index]),
            ),
            _ => raw,
        },
        Predictor::Average2 => match (previous, previous2) {
            (Some(previous), Some(previous2)) => {
                let average = (previous[index] as i64 + previous2[index] as i64) / 2;
                raw.wrapping_add(average as i32)
            }
            _ => raw,
        },
        Predictor::MinThrottle => raw.wrapping_add(ctx.config.minthrottle),
        Predictor::Motor0 => {
            let motor0 = ctx.motor0_index.filter(|&m| m < index).ok_or_else(|| {
                DecodeError::missing_predictor_input(format!(
                    "field '{}' is predicted from motor[0], which is not decoded before it",
                    def.names[index]
                ))
            })?;
            raw.wrapping_add(current[motor0])
        }
        // Normally synthesized before any bytes are read; a malformed
        // header can place it inside a group, where the raw value stands.
        Predictor::Increment => raw,
        Predictor::Fixed1500 => raw.wrapping_add(1500),
        Predictor::VbatRef => raw.wrapping_add(ctx.config.vbatref),
        Predictor::LastMainFrameTime => raw.wrapping_add(ctx.last_main_time.unwrap_or(0)),
        Predictor::MinMotor => raw.wrapping_add(ctx.config.motor_output[0]),
    };
    Ok(value)
}
