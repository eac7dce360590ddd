//! Compact-form ("nBits") difficulty target encoding.
//!
//! The 4-byte compact form packs a 256-bit target as 1 exponent byte plus a
//! 3-byte mantissa, with a sign bit at 0x00800000. Decoding classifies the
//! negative and overflow cases explicitly instead of silently wrapping;
//! consensus requires defined behavior for every input.

use primitive_types::U256;

use crate::error::CompactError;

/// Decode a compact-form target into a 256-bit unsigned integer.
///
/// A zero mantissa decodes to zero regardless of the exponent or sign bit.
/// A set sign bit with a non-zero mantissa is [`CompactError::Negative`];
/// a mantissa shifted past 256 bits is [`CompactError::Overflow`].
pub fn decode_compact(bits: u32) -> Result<U256, CompactError> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;

    if mantissa != 0 && (bits & 0x0080_0000) != 0 {
        return Err(CompactError::Negative);
    }
    if mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32))
    {
        return Err(CompactError::Overflow);
    }

    let target = if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        U256::from(mantissa) << (8 * (exponent - 3))
    };
    Ok(target)
}

/// Encode a 256-bit target in compact form.
///
/// The mantissa keeps the three most significant bytes; lower bytes are
/// truncated, so `encode_compact` is lossy for targets with more than 24
/// significant bits. Round-trips exactly for every value `decode_compact`
/// produces.
pub fn encode_compact(target: &U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*target >> (8 * (size - 3))).low_u32()
    };

    // A mantissa with the sign bit set shifts right one byte and bumps the
    // exponent; the compact form is a signed representation.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | ((size as u32) << 24)
}
