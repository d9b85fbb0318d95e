//! Modified UTF-8 as written by `DataOutput.writeUTF`.
//!
//! Encoding forms, per UTF-16 code unit:
//! - `0xxxxxxx`: U+0001..U+007F (a zero byte is invalid)
//! - `110xxxxx 10xxxxxx`: U+0000 and U+0080..U+07FF
//! - `1110xxxx 10xxxxxx 10xxxxxx`: U+0800..U+FFFF
//!
//! Supplementary characters are written as two separately encoded
//! surrogates. [`decode`] yields code units, not code points.

use crate::error::{Error, Result};

/// Decode a modified UTF-8 buffer into UTF-16 code units.
pub fn decode(data: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let a = data[i];
        if a & 0x80 == 0 {
            if a == 0 {
                return Err(Error::malformed_text(i, "improperly encoded null"));
            }
            units.push(u16::from(a));
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = continuation(data, i, 1)?;
            units.push((u16::from(a & 0x1F) << 6) | u16::from(b & 0x3F));
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = continuation(data, i, 1)?;
            let c = continuation(data, i, 2)?;
            units.push(
                (u16::from(a & 0x0F) << 12) | (u16::from(b & 0x3F) << 6) | u16::from(c & 0x3F),
            );
            i += 3;
        } else {
            return Err(Error::malformed_text(
                i,
                format!("invalid leading byte {:#04x}", a),
            ));
        }
    }

    Ok(units)
}

fn continuation(data: &[u8], start: usize, index: usize) -> Result<u8> {
    let pos = start + index;
    let Some(&byte) = data.get(pos) else {
        return Err(Error::malformed_text(pos, "truncated multi-byte sequence"));
    };
    if byte & 0xC0 != 0x80 {
        return Err(Error::malformed_text(
            pos,
            format!("continuation byte {:#04x} lacks 10xxxxxx prefix", byte),
        ));
    }
    Ok(byte)
}

/// Decode a modified UTF-8 buffer into a Rust string.
///
/// Surrogate pairs are merged. An unpaired surrogate has no `char` form and
/// fails with `MalformedText` at the byte that starts it.
pub fn decode_string(data: &[u8]) -> Result<String> {
    // ASCII fast path
    if !data.is_empty() && data.iter().all(|&b| b != 0 && b < 0x80) {
        return Ok(data.iter().map(|&b| b as char).collect());
    }
    let units = decode(data)?;
    let mut out = String::with_capacity(units.len());
    let mut consumed = 0;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => {
                out.push(c);
                consumed += c.len_utf16();
            }
            Err(e) => {
                return Err(Error::malformed_text(
                    encode(&units[..consumed]).len(),
                    format!("unpaired surrogate {:#06x}", e.unpaired_surrogate()),
                ))
            }
        }
    }
    Ok(out)
}

/// Encode UTF-16 code units in modified UTF-8.
pub fn encode(units: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(units.len());
    for &unit in units {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Encode a Rust string in modified UTF-8.
pub fn encode_str(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    encode(&units)
}
