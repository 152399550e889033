//! Field encodings: how a raw value is laid out on the wire.

use serde::{Deserialize, Serialize};

/// How one field (or one group of fields) consumes bytes from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// ZigZag variable-byte integer.
    SignedVb,
    /// Variable-byte integer reinterpreted as unsigned.
    UnsignedVb,
    /// Negated 14-bit sign extension of an unsigned VB.
    Neg14Bit,
    /// Up to eight signed VBs behind a presence bitmap.
    Tag8_8Svb,
    /// Three fields behind a 2-bit layout selector.
    Tag2_3S32,
    /// Four fields of 0/4/8/16 bits behind a one-byte selector.
    Tag8_4S16,
    /// No bytes; the raw value is zero.
    Null,
    /// Three fields with 2, 5-5-4 or 8-7-7 bit layouts.
    Tag2_3SVariable,
}

impl Encoding {
    /// Map a header encoding code to its variant.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Encoding::SignedVb),
            1 => Some(Encoding::UnsignedVb),
            3 => Some(Encoding::Neg14Bit),
            6 => Some(Encoding::Tag8_8Svb),
            7 => Some(Encoding::Tag2_3S32),
            8 => Some(Encoding::Tag8_4S16),
            9 => Some(Encoding::Null),
            10 => Some(Encoding::Tag2_3SVariable),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Encoding::SignedVb => 0,
            Encoding::UnsignedVb => 1,
            Encoding::Neg14Bit => 3,
            Encoding::Tag8_8Svb => 6,
            Encoding::Tag2_3S32 => 7,
            Encoding::Tag8_4S16 => 8,
            Encoding::Null => 9,
            Encoding::Tag2_3SVariable => 10,
        }
    }

    /// Number of fields a single read of this encoding can span.
    pub const fn max_group_size(self) -> usize {
        match self {
            Encoding::Tag8_8Svb => 8,
            Encoding::Tag8_4S16 => 4,
            Encoding::Tag2_3S32 | Encoding::Tag2_3SVariable => 3,
            _ => 1,
        }
    }
}
