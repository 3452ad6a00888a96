//! Per-channel amplitude normalization (PCAN).
//!
//! Each channel is divided by a power of its own noise estimate,
//! `(noise + offset)^-strength`, then squashed by a piecewise shrink
//! function. The gain curve is tabulated as a quadratic per octave of the
//! noise estimate (the "wide dynamic function").

use crate::config::PcanGainControlConfig;
use crate::error::FrontendError;

use super::most_significant_bit32;

const PCAN_SNR_BITS: u32 = 12;
const PCAN_OUTPUT_BITS: u32 = 6;
const WIDE_DYNAMIC_FUNCTION_BITS: u32 = 32;
const WIDE_DYNAMIC_FUNCTION_LUT_SIZE: usize = 4 * WIDE_DYNAMIC_FUNCTION_BITS as usize - 3;

pub struct PcanGainControl {
    snr_shift: u32,
    gain_lut: Vec<i16>,
}

/// Gain for a noise estimate `x` expressed with `input_bits` fraction bits.
fn gain_lookup(config: &PcanGainControlConfig, input_bits: u32, x: u32) -> i16 {
    let x_as_float = x as f32 / (1u32 << input_bits) as f32;
    let gain = (1u32 << config.gain_bits) as f32 * (x_as_float + config.offset).powf(-config.strength);
    if gain > i16::MAX as f32 {
        return i16::MAX;
    }
    (gain + 0.5) as i16
}

impl PcanGainControl {
    /// Builds the gain table.
    ///
    /// `smoothing_bits` is the noise estimate's extra precision and
    /// `input_correction_bits` the filterbank's fixed-point correction.
    pub fn new(
        config: &PcanGainControlConfig,
        smoothing_bits: u32,
        input_correction_bits: i32,
    ) -> Result<Self, FrontendError> {
        if config.gain_bits >= 32 {
            return Err(FrontendError::InvalidConfig(format!(
                "gain_bits {} is too large",
                config.gain_bits
            )));
        }
        let snr_shift = config.gain_bits as i32 - input_correction_bits - PCAN_SNR_BITS as i32;
        let input_bits = smoothing_bits as i32 - input_correction_bits;
        let (Ok(snr_shift), Ok(input_bits)) = (u32::try_from(snr_shift), u32::try_from(input_bits))
        else {
            return Err(FrontendError::InvalidConfig(format!(
                "gain_bits {} and smoothing_bits {smoothing_bits} do not fit correction {input_correction_bits}",
                config.gain_bits
            )));
        };
        if input_bits >= 32 || snr_shift >= 64 {
            return Err(FrontendError::InvalidConfig(format!(
                "pcan shifts out of range (input {input_bits}, snr {snr_shift})"
            )));
        }

        let mut gain_lut = vec![0i16; WIDE_DYNAMIC_FUNCTION_LUT_SIZE];
        gain_lut[0] = gain_lookup(config, input_bits, 0);
        gain_lut[1] = gain_lookup(config, input_bits, 1);
        for interval in 2..=WIDE_DYNAMIC_FUNCTION_BITS {
            let x0 = 1u32 << (interval - 1);
            let x1 = x0 + (x0 >> 1);
            let x2 = if interval == WIDE_DYNAMIC_FUNCTION_BITS {
                x0 + (x0 - 1)
            } else {
                2 * x0
            };

            let y0 = gain_lookup(config, input_bits, x0);
            let y1 = gain_lookup(config, input_bits, x1);
            let y2 = gain_lookup(config, input_bits, x2);

            let diff1 = y1 as i32 - y0 as i32;
            let diff2 = y2 as i32 - y0 as i32;
            let a1 = 4 * diff1 - diff2;
            let a2 = diff2 - a1;

            let base = 4 * interval as usize - 6;
            gain_lut[base] = y0;
            gain_lut[base + 1] = a1 as i16;
            gain_lut[base + 2] = a2 as i16;
        }

        Ok(Self {
            snr_shift,
            gain_lut,
        })
    }

    /// Normalizes `signal` by the gain for each channel's noise estimate.
    pub fn apply(&self, signal: &mut [u32], noise_estimate: &[u32]) {
        for (s, &noise) in signal.iter_mut().zip(noise_estimate) {
            let gain = wide_dynamic_function(noise, &self.gain_lut) as i32 as u32;
            let snr = ((*s as u64 * gain as u64) >> self.snr_shift) as u32;
            *s = shrink(snr);
        }
    }
}

/// Interpolates the gain table at `x`.
fn wide_dynamic_function(x: u32, lut: &[i16]) -> i16 {
    if x <= 2 {
        return lut[x as usize];
    }

    let interval = most_significant_bit32(x);
    let base = 4 * interval as usize - 6;

    let frac = (if interval < 11 {
        x << (11 - interval)
    } else {
        x >> (interval - 11)
    } & 0x3FF) as i32;

    let mut result = (lut[base + 2] as i32 * frac) >> 5;
    result = result.wrapping_add(((lut[base + 1] as u32) << 5) as i32);
    result = result.wrapping_mul(frac);
    result = result.wrapping_add(1 << 14) >> 15;
    result += lut[base] as i32;
    result as i16
}

fn shrink(x: u32) -> u32 {
    if x < (2 << PCAN_SNR_BITS) {
        (x * x) >> (2 + 2 * PCAN_SNR_BITS - PCAN_OUTPUT_BITS)
    } else {
        (x >> (PCAN_SNR_BITS - PCAN_OUTPUT_BITS)) - (1 << PCAN_OUTPUT_BITS)
    }
}
