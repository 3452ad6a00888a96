//! Integer natural log compression.
//!
//! log2 is split into an integer part (the most significant bit) and a
//! fraction corrected with a 128-segment piecewise-linear table, then scaled
//! to ln in Q16.

use crate::config::LogScaleConfig;

use super::most_significant_bit32;

const LOG_SEGMENTS_LOG2: u32 = 7;
const LOG_SCALE_LOG2: u32 = 16;
const LOG_SCALE: u32 = 1 << LOG_SCALE_LOG2;
/// ln(2) in Q16.
const LOG_COEFF: u64 = 45426;

/// `round((log2(1 + i/128) - i/128) * 2^16)`, plus one padding entry.
const LOG_LUT: [u16; 130] = [
    0, 224, 442, 654, 861, 1063, 1259, 1450, 1636, 1817, 1992, 2163, 2329, 2490, 2646, 2797,
    2944, 3087, 3224, 3358, 3487, 3611, 3732, 3848, 3960, 4068, 4172, 4272, 4368, 4460, 4549,
    4633, 4714, 4791, 4864, 4934, 5001, 5063, 5123, 5178, 5231, 5280, 5326, 5368, 5408, 5444,
    5477, 5507, 5533, 5557, 5578, 5595, 5610, 5622, 5631, 5637, 5640, 5641, 5638, 5633, 5626,
    5615, 5602, 5586, 5568, 5547, 5524, 5498, 5470, 5439, 5406, 5370, 5332, 5291, 5249, 5203,
    5156, 5106, 5054, 5000, 4944, 4885, 4825, 4762, 4697, 4630, 4561, 4490, 4416, 4341, 4264,
    4184, 4103, 4020, 3935, 3848, 3759, 3668, 3575, 3481, 3384, 3286, 3186, 3084, 2981, 2875,
    2768, 2659, 2549, 2437, 2323, 2207, 2090, 1971, 1851, 1729, 1605, 1480, 1353, 1224, 1094,
    963, 830, 695, 559, 421, 282, 142, 0, 0,
];

fn log2_fraction_part(x: u32, log2x: u32) -> u32 {
    let mut frac = (x as i64 - (1i64 << log2x)) as i32;
    if log2x < LOG_SCALE_LOG2 {
        frac <<= LOG_SCALE_LOG2 - log2x;
    } else {
        frac >>= log2x - LOG_SCALE_LOG2;
    }

    let base_seg = (frac >> (LOG_SCALE_LOG2 - LOG_SEGMENTS_LOG2)) as usize;
    let seg_unit = (1u32 << LOG_SCALE_LOG2) >> LOG_SEGMENTS_LOG2;

    let c0 = LOG_LUT[base_seg] as i32;
    let c1 = LOG_LUT[base_seg + 1] as i32;
    let seg_base = (seg_unit as usize * base_seg) as i32;
    let rel_pos = ((c1 - c0) * (frac - seg_base)) >> LOG_SCALE_LOG2;
    (frac + c0 + rel_pos) as u32
}

/// `ln(x) * 2^scale_shift`, for `x > 1`.
fn log(x: u32, scale_shift: u32) -> u32 {
    let integer = most_significant_bit32(x) - 1;
    let fraction = log2_fraction_part(x, integer);
    let log2 = (integer << LOG_SCALE_LOG2) + fraction;
    let round = LOG_SCALE / 2;
    let loge = ((LOG_COEFF * log2 as u64 + round as u64) >> LOG_SCALE_LOG2) as u32;
    (loge << scale_shift).wrapping_add(round) >> LOG_SCALE_LOG2
}

pub struct LogScale {
    enable_log: bool,
    scale_shift: u32,
    output: Vec<u16>,
}

impl LogScale {
    pub fn new(config: &LogScaleConfig, num_channels: usize) -> Self {
        Self {
            enable_log: config.enable_log,
            scale_shift: config.scale_shift.min(LOG_SCALE_LOG2),
            output: vec![0; num_channels],
        }
    }

    /// Compresses `signal` after undoing `correction_bits` of filterbank
    /// precision, saturating at `u16::MAX`.
    pub fn apply(&mut self, signal: &[u32], correction_bits: i32) -> &[u16] {
        for (out, &s) in self.output.iter_mut().zip(signal) {
            let mut value = s;
            if self.enable_log {
                if correction_bits < 0 {
                    value >>= -correction_bits;
                } else {
                    value <<= correction_bits;
                }
                value = if value > 1 {
                    log(value, self.scale_shift)
                } else {
                    0
                };
            }
            *out = value.min(u16::MAX as u32) as u16;
        }
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_matches_closed_form() {
        for (i, &v) in LOG_LUT[..129].iter().enumerate() {
            let t = i as f64 / 128.0;
            let expected = (((1.0 + t).log2() - t) * 65536.0).round() as i64;
            assert!((v as i64 - expected).abs() <= 1, "entry {i}: {v} vs {expected}");
        }
    }

    #[test]
    fn log_tracks_ln() {
        for x in [2u32, 3, 10, 100, 1000, 65_535, 1 << 20, 123_456_789, u32::MAX] {
            let got = log(x, 6) as f64 / 64.0;
            let expected = (x as f64).ln();
            assert!((got - expected).abs() < 0.05, "x = {x}: {got} vs {expected}");
        }
    }

    #[test]
    fn small_values_map_to_zero() {
        let mut ls = LogScale::new(
            &LogScaleConfig {
                enable_log: true,
                scale_shift: 6,
            },
            3,
        );
        // With 3 correction bits 0 stays 0, everything else is > 1.
        assert_eq!(ls.apply(&[0, 1, 2], 3), &[0, 133, 177]);
        assert_eq!(ls.apply(&[0, 1, 2], -1), &[0, 0, 0]);
    }

    #[test]
    fn compresses_pcan_output() {
        let mut ls = LogScale::new(
            &LogScaleConfig {
                enable_log: true,
                scale_shift: 6,
            },
            2,
        );
        assert_eq!(ls.apply(&[3578, 1533], -1), &[479, 425]);
        assert_eq!(ls.apply(&[1823, 731], -1), &[436, 378]);
    }

    #[test]
    fn disabled_log_saturates() {
        let mut ls = LogScale::new(
            &LogScaleConfig {
                enable_log: false,
                scale_shift: 6,
            },
            2,
        );
        assert_eq!(ls.apply(&[12, 1 << 20], 3), &[12, u16::MAX]);
    }
}
