//! IEEE 754 binary16 conversion.
//!
//! Encoding rounds to nearest on the magnitude, produces subnormals for
//! tiny values, saturates finite overflow to infinity, and keeps NaN a NaN.

/// Encode `value` as half-float bits.
pub fn encode(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = (bits >> 16) & 0x8000;
    let abs = bits & 0x7fff_ffff;
    // Adding half of the discarded mantissa range rounds to nearest.
    let rounded = abs + 0x1000;

    let half = if rounded >= 0x4780_0000 {
        if abs >= 0x4780_0000 {
            if abs < 0x7f80_0000 {
                0x7c00
            } else {
                let mantissa = (abs & 0x007f_ffff) >> 13;
                // Low-order NaN payloads would otherwise collapse to infinity.
                if abs > 0x7f80_0000 && mantissa == 0 {
                    0x7e00
                } else {
                    0x7c00 | mantissa
                }
            }
        } else {
            // Rounds up past the largest finite half; clamp to it.
            0x7bff
        }
    } else if rounded >= 0x3880_0000 {
        // Normal: rebias the exponent from 127 to 15.
        (rounded - 0x3800_0000) >> 13
    } else if rounded < 0x3300_0000 {
        0
    } else {
        let exp = abs >> 23;
        let mantissa = (abs & 0x007f_ffff) | 0x0080_0000;
        let round = 0x0080_0000u32.wrapping_shr(exp.wrapping_sub(102));
        (mantissa + round) >> (126 - exp)
    };
    (sign | half) as u16
}

/// Decode half-float bits.
pub fn decode(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits & 0x7c00) >> 10);
    let fraction = f32::from(bits & 0x03ff) / 1024.0;
    let magnitude = match exponent {
        0 => 2f32.powi(-14) * fraction,
        0x1f if fraction != 0.0 => f32::NAN,
        0x1f => f32::INFINITY,
        e => 2f32.powi(e - 15) * (1.0 + fraction),
    };
    sign * magnitude
}
