// Toccata
// Copyright (c) 2022-2024 The Project Toccata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! EBML primitive readers: variable-length element IDs and sizes per RFC 8794, and the decoding
//! of typed element data from byte ranges of known length.

use toccata_core::errors::{decode_error, Result};
use toccata_core::io::ReadBytes;

/// Sign extends an arbitrary, sized, value to a signed 64-bit integer.
#[inline(always)]
pub(crate) fn sign_extend_to_i64(value: u64, width: u32) -> i64 {
    debug_assert!(width > 0 && width <= 64);
    let shift = 64 - width;
    (value << shift) as i64 >> shift
}

/// Reads an element ID: 1 to 4 bytes, length encoded by the position of the first one bit, raw
/// including the length marker.
///
/// Stray `0x00` and `0xff` bytes are skipped to resynchronize on lightly damaged streams.
pub(crate) fn read_tag<R: ReadBytes>(mut reader: R) -> Result<u32> {
    loop {
        let byte = reader.read_byte()?;
        if byte == 0x00 || byte == 0xff {
            continue;
        }

        let extra = byte.leading_zeros();
        if extra > 3 {
            return decode_error("mkv: invalid element id");
        }

        let mut tag = u32::from(byte);
        for _ in 0..extra {
            tag = (tag << 8) | u32::from(reader.read_byte()?);
        }
        return Ok(tag);
    }
}

/// Reads an element size: 1 to 8 bytes, VINT decoded with the length marker stripped. A size
/// whose value bits are all ones denotes an element of unknown size and yields `None`.
pub(crate) fn read_size<R: ReadBytes>(mut reader: R) -> Result<Option<u64>> {
    let byte = reader.read_byte()?;
    if byte == 0x00 {
        return decode_error("mkv: invalid element size");
    }

    let extra = byte.leading_zeros();
    // Clear the VINT_MARKER bit.
    let mut size = u64::from(byte) ^ (1 << (7 - extra));
    for _ in 0..extra {
        size = (size << 8) | u64::from(reader.read_byte()?);
    }

    // All value bits set is the reserved "unknown size" encoding.
    if size == (1 << (7 * (extra + 1))) - 1 {
        return Ok(None);
    }
    Ok(Some(size))
}

/// Reads an unsigned VINT with the length marker stripped. Used for the track number prefix of
/// block payloads and for the first laced frame size.
pub(crate) fn read_unsigned_vint<R: ReadBytes>(mut reader: R) -> Result<u64> {
    let byte = reader.read_byte()?;
    if byte == 0x00 {
        return decode_error("mkv: invalid vint");
    }

    let extra = byte.leading_zeros();
    let mut value = u64::from(byte) ^ (1 << (7 - extra));
    for _ in 0..extra {
        value = (value << 8) | u64::from(reader.read_byte()?);
    }
    Ok(value)
}

/// Reads a VINT and converts it to a signed integer by shifting the range, as used by EBML lacing
/// size deltas.
pub(crate) fn read_signed_vint<R: ReadBytes>(mut reader: R) -> Result<i64> {
    let start = reader.pos();
    let value = read_unsigned_vint(&mut reader)?;
    let len = reader.pos() - start;
    // A n-octet VINT stores 7n value bits; the signed range is centered on zero.
    Ok(value as i64 - (i64::pow(2, (len * 7) as u32 - 1) - 1))
}

/// Decodes an unsigned integer of 0 to 8 bytes.
pub(crate) fn read_unsigned<R: ReadBytes>(reader: &mut R, len: u64) -> Result<u64> {
    if len > 8 {
        return decode_error("mkv: invalid unsigned integer length");
    }
    let mut value = 0u64;
    for _ in 0..len {
        value = (value << 8) | u64::from(reader.read_byte()?);
    }
    Ok(value)
}

/// Decodes a signed integer of 0 to 8 bytes.
pub(crate) fn read_signed<R: ReadBytes>(reader: &mut R, len: u64) -> Result<i64> {
    if len > 8 {
        return decode_error("mkv: invalid signed integer length");
    }
    if len == 0 {
        return Ok(0);
    }
    let value = read_unsigned(reader, len)?;
    Ok(sign_extend_to_i64(value, (len as u32) * 8))
}

/// Decodes a date: a signed integer of nanoseconds since 2001-01-01T00:00:00 UTC.
pub(crate) fn read_date<R: ReadBytes>(reader: &mut R, len: u64) -> Result<i64> {
    read_signed(reader, len)
}

/// Decodes a floating point value of 0, 4, or 8 bytes.
pub(crate) fn read_float<R: ReadBytes>(reader: &mut R, len: u64) -> Result<f64> {
    match len {
        0 => Ok(0.0),
        4 => Ok(f64::from(reader.read_be_f32()?)),
        8 => reader.read_be_f64().map_err(Into::into),
        _ => decode_error("mkv: invalid float length"),
    }
}

/// Decodes a UTF-8 string. The payload is terminated at the first NUL, and invalid sequences are
/// replaced.
pub(crate) fn read_string<R: ReadBytes>(reader: &mut R, len: u64) -> Result<String> {
    let data = reader.read_boxed_slice_exact(len as usize)?;
    let bytes = data.split(|&b| b == 0).next().unwrap_or(&data);
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Reads a binary blob.
pub(crate) fn read_binary<R: ReadBytes>(reader: &mut R, len: u64) -> Result<Box<[u8]>> {
    reader.read_boxed_slice_exact(len as usize).map_err(Into::into)
}
