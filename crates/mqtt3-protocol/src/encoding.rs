//! Byte-level primitives shared by every packet codec: network-order
//! integers, length-prefixed strings and binary blobs, and the Remaining
//! Length varint from the fixed header.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Largest value representable by the four-byte Remaining Length encoding.
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

pub fn read_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(MqttError::ShortBuffer);
    }
    Ok(buf.get_u8())
}

pub fn read_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(MqttError::ShortBuffer);
    }
    Ok(buf.get_u16())
}

pub fn read_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(MqttError::ShortBuffer);
    }
    Ok(buf.get_u32())
}

pub fn read_bytes<B: Buf>(buf: &mut B, len: usize) -> Result<Vec<u8>> {
    if buf.remaining() < len {
        return Err(MqttError::ShortBuffer);
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Reads a two-byte big-endian length followed by that many raw bytes.
pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    let len = read_u16(buf)? as usize;
    read_bytes(buf, len)
}

/// Reads a length-prefixed UTF-8 string.
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let raw = decode_binary(buf)?;
    String::from_utf8(raw)
        .map_err(|_| MqttError::ProtocolViolation("string is not valid UTF-8".to_string()))
}

pub fn encode_binary<B: BufMut>(buf: &mut B, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| {
        MqttError::ProtocolViolation(format!("field of {} bytes exceeds 65535", data.len()))
    })?;
    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

pub fn encode_string<B: BufMut>(buf: &mut B, s: &str) -> Result<()> {
    encode_binary(buf, s.as_bytes())
}

/// Encodes a Remaining Length as a 1-4 byte varint, returning the number of
/// bytes written.
pub fn encode_remaining_length<B: BufMut>(buf: &mut B, len: u32) -> Result<usize> {
    if len > MAX_REMAINING_LENGTH {
        return Err(MqttError::LengthTooLarge);
    }
    let mut remaining = len;
    let mut written = 0;
    loop {
        let mut digit = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            digit |= 0x80;
        }
        buf.put_u8(digit);
        written += 1;
        if remaining == 0 {
            return Ok(written);
        }
    }
}

/// Decodes a Remaining Length varint. Fails with `MalformedVarint` when the
/// fourth consumed byte still has its continuation bit set.
pub fn decode_remaining_length<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value: u32 = 0;
    let mut multiplier: u32 = 1;
    let mut consumed = 0;
    loop {
        let byte = read_u8(buf)?;
        consumed += 1;
        value += u32::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        if consumed == 4 {
            return Err(MqttError::MalformedVarint);
        }
        multiplier *= 128;
    }
}

/// Number of bytes the varint encoding of `len` occupies.
pub fn remaining_length_width(len: u32) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}
