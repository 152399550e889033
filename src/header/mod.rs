//! Log header parsing.
//!
//! A sub-log opens with ASCII lines of the form `H key:value\n`. Parsing
//! consumes lines until the first byte that both matches a known frame
//! marker and is followed by content, leaving the cursor on that marker.
//! The first colon splits key from value; later colons (datetimes, version
//! strings) belong to the value.

mod config;
mod frame_def;

pub use config::{FirmwareType, SysConfig};
pub use frame_def::{
    FrameDef, FrameDefs, FrameType, ITERATION_FIELD_INDEX, TIME_FIELD_INDEX,
};

use crate::error::Result;
use crate::stream::{ByteStream, EOF};
use tracing::debug;

/// Header lines longer than this are considered garbage.
const MAX_HEADER_LINE_LENGTH: usize = 1024;

/// Everything the binary section needs to decode itself: the typed system
/// configuration and the per-frame-type field definitions.
#[derive(Debug, Clone, Default)]
pub struct LogHeader {
    pub sys_config: SysConfig,
    pub frame_defs: FrameDefs,
}

impl LogHeader {
    /// Parse header lines from the stream's current position, stopping on
    /// the first frame marker that has content after it. On success the
    /// stream is positioned on that marker (or at EOF).
    pub fn parse(stream: &mut ByteStream) -> Result<Self> {
        let mut header = LogHeader::default();

        loop {
            let command = stream.read_char();
            if command == EOF {
                break;
            }

            if command == i32::from(b'H') && stream.peek_char() == i32::from(b' ') {
                stream.read_char(); // the space after 'H'
                header.parse_line(stream);
            } else if FrameType::from_marker(command).is_some() && stream.peek_char() != EOF {
                stream.unread_char();
                break;
            }
            // Any other byte is inter-header noise; keep scanning.
        }

        stream.clear_eof();
        header.frame_defs.finalize()?;

        debug!(
            "parsed header: {} main fields, {} slow fields, firmware {:?} {}",
            header.frame_defs.intra.count(),
            header.frame_defs.slow.count(),
            header.sys_config.firmware_type,
            header.sys_config.firmware_version,
        );
        Ok(header)
    }

    /// Parse one `key:value` line. The leading `H ` has been consumed.
    fn parse_line(&mut self, stream: &mut ByteStream) {
        let data = stream.data();
        let line_start = stream.pos();
        let limit = (line_start + MAX_HEADER_LINE_LENGTH).min(stream.end());

        let mut colon = None;
        let mut newline = None;
        for (offset, &byte) in data[line_start..limit].iter().enumerate() {
            match byte {
                b':' if colon.is_none() => colon = Some(line_start + offset),
                b'\n' => {
                    newline = Some(line_start + offset);
                    break;
                }
                _ => {}
            }
        }

        let Some(newline) = newline else {
            // Overlong or truncated line; leave the cursor for the marker scan.
            return;
        };
        let Some(colon) = colon else {
            stream.set_pos(newline + 1);
            return;
        };

        let key: String = data[line_start..colon].iter().map(|&b| b as char).collect();
        let value: String = data[colon + 1..newline].iter().map(|&b| b as char).collect();
        stream.set_pos(newline + 1);

        if let Some((frame_type, subkey)) = parse_field_key(&key) {
            let def = self.frame_defs.get_mut(frame_type);
            match subkey {
                "name" => def.set_names(&value),
                "signed" => def.set_signed(&value),
                "predictor" => def.set_predictors(&value),
                "encoding" => def.set_encodings(&value),
                other => debug!("unrecognized field subkey '{}' for '{}'", other, key),
            }
        } else {
            self.sys_config.apply_header(&key, &value);
        }
    }
}

/// Match keys of the form `Field <marker> <subkey>`.
fn parse_field_key(key: &str) -> Option<(FrameType, &str)> {
    let rest = key.strip_prefix("Field ")?;
    let mut chars = rest.chars();
    let marker = chars.next()?;
    let subkey = chars.as_str().strip_prefix(' ')?;
    let frame_type = FrameType::from_marker(marker as i32)?;
    Some((frame_type, subkey))
}
