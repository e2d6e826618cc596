//! Parameter value and raster sample encoding.
//!
//! Values are clamped to roughly ±134217.728 mm and quantized to three
//! decimals: `n = round((v + 134217.728) * 1000)` is a 28-bit unsigned
//! integer, split little-endian into four 7-bit groups, each biased by
//! +128 so data bytes never collide with command bytes.

/// Offset that maps the representable range onto a 28-bit unsigned integer.
const PARAM_BIAS: f64 = 134_217.728;

/// Smallest encodable value.
pub const PARAM_MIN: f64 = -134_217.728;
/// Largest encodable value (2^28 - 1 quantization steps above the minimum).
pub const PARAM_MAX: f64 = 134_217.727;

/// Encode a parameter value into its four wire data bytes.
///
/// Out-of-range values are clamped; resolution is 0.001.
pub fn encode_value(value: f64) -> [u8; 4] {
    let v = value.clamp(PARAM_MIN, PARAM_MAX);
    let n = ((v + PARAM_BIAS) * 1000.0).round() as u32;
    [
        ((n & 127) + 128) as u8,
        (((n >> 7) & 127) + 128) as u8,
        (((n >> 14) & 127) + 128) as u8,
        (((n >> 21) & 127) + 128) as u8,
    ]
}

/// Decode four wire data bytes back into the parameter value.
pub fn decode_value(data: [u8; 4]) -> f64 {
    let n = (data[0] as i64 - 128)
        + (data[1] as i64 - 128) * 128
        + (data[2] as i64 - 128) * 16_384
        + (data[3] as i64 - 128) * 2_097_152;
    (n - 134_217_728) as f64 / 1000.0
}

/// Neutral data-byte state; decodes to 0.0.
pub const DATA_IDLE: [u8; 4] = [128, 128, 128, 192];

/// Encode one grayscale raster sample for the raster data stream.
///
/// 0 (black, full power) maps to 255 and 255 (white, no power) to 128.
/// Raster bytes must stay >= 128 to be distinguishable from command
/// bytes, which costs one bit of resolution.
pub fn encode_raster_sample(pixel: u8) -> u8 {
    128 + (255 - pixel) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: f64) -> f64 {
        decode_value(encode_value(v))
    }

    #[test]
    fn exact_round_trip_boundaries() {
        assert_eq!(round_trip(PARAM_MIN), PARAM_MIN);
        assert_eq!(round_trip(PARAM_MAX), PARAM_MAX);
        assert_eq!(round_trip(0.0), 0.0);
        assert_eq!(round_trip(-0.001), -0.001);
        assert_eq!(round_trip(0.001), 0.001);
    }

    #[test]
    fn round_trip_interior_values() {
        for &v in &[
            1.0, -1.0, 12.345, -12.345, 610.0, 1220.0, 6000.0, 99_999.999, -99_999.999,
        ] {
            assert!(
                (round_trip(v) - v).abs() < 0.0005,
                "value {v} round-tripped to {}",
                round_trip(v)
            );
        }
    }

    #[test]
    fn sweep_at_wire_resolution() {
        // Dense sweep around zero and the boundaries at 0.001 steps.
        let mut v = -2.0;
        while v <= 2.0 {
            assert!((round_trip(v) - v).abs() < 0.0005);
            v += 0.001;
        }
        let mut v = PARAM_MAX - 0.05;
        while v <= PARAM_MAX {
            assert!((round_trip(v) - v).abs() < 0.0005);
            v += 0.001;
        }
    }

    #[test]
    fn out_of_range_clamps() {
        assert_eq!(round_trip(1e9), PARAM_MAX);
        assert_eq!(round_trip(-1e9), PARAM_MIN);
        assert_eq!(round_trip(f64::INFINITY), PARAM_MAX);
        assert_eq!(round_trip(f64::NEG_INFINITY), PARAM_MIN);
    }

    #[test]
    fn data_bytes_stay_above_commands() {
        for &v in &[PARAM_MIN, -1.0, 0.0, 1.0, PARAM_MAX] {
            for b in encode_value(v) {
                assert!(b >= 128);
            }
        }
    }

    #[test]
    fn idle_data_decodes_to_zero() {
        assert_eq!(decode_value(DATA_IDLE), 0.0);
    }

    #[test]
    fn raster_sample_mapping() {
        assert_eq!(encode_raster_sample(0), 255); // black, full power
        assert_eq!(encode_raster_sample(255), 128); // white, no power
        assert_eq!(encode_raster_sample(128), 128 + 63);
        for px in 0u16..=255 {
            let b = encode_raster_sample(px as u8);
            assert!(b >= 128);
        }
    }
}
