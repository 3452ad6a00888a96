//! Triangular mel filterbank over FFT energies.
//!
//! Adjacent channels share their slopes: every FFT bin contributes a
//! `weight` to the channel whose center lies above it and the complementary
//! `unweight` to the next one. Accumulating `num_channels + 1` bands and
//! dropping the first yields `num_channels` overlapping triangles.

use crate::config::FilterbankConfig;
use crate::error::FrontendError;

use super::fft::Complex16;

/// Fixed-point precision of the channel weights.
pub(crate) const FILTERBANK_BITS: u32 = 12;

/// Converts frequency in Hz to mel scale.
fn freq_to_mel(freq: f32) -> f32 {
    (1127.0 * (freq as f64 / 700.0).ln_1p()) as f32
}

/// Mel-spaced upper edges for `num_bands` bands between the limits.
fn center_frequencies(num_bands: usize, lower: f32, upper: f32) -> Vec<f32> {
    let mel_low = freq_to_mel(lower);
    let mel_hi = freq_to_mel(upper);
    let mel_spacing = (mel_hi - mel_low) / num_bands as f32;
    (0..num_bands)
        .map(|i| mel_low + mel_spacing * (i + 1) as f32)
        .collect()
}

fn quantize_weight(weight: f32) -> (i16, i16) {
    let scale = (1 << FILTERBANK_BITS) as f32;
    let w = ((weight * scale) as f64 + 0.5).floor() as i16;
    let uw = ((1.0 - weight as f64) * scale as f64 + 0.5).floor() as i16;
    (w, uw)
}

/// FFT bins that feed one band, with their Q12 weights.
struct Band {
    start: usize,
    weights: Vec<i16>,
    unweights: Vec<i16>,
}

pub struct Filterbank {
    num_channels: usize,
    start_index: usize,
    end_index: usize,
    bands: Vec<Band>,
    energy: Vec<i32>,
    work: Vec<u64>,
    output: Vec<u32>,
}

impl Filterbank {
    /// Lays out the bands for a spectrum of `spectrum_size` bins.
    pub fn new(
        config: &FilterbankConfig,
        sample_rate: u32,
        spectrum_size: usize,
    ) -> Result<Self, FrontendError> {
        let lower = config.lower_band_limit;
        let upper = config.upper_band_limit;
        if config.num_channels == 0 {
            return Err(FrontendError::InvalidConfig(
                "filterbank needs at least one channel".into(),
            ));
        }
        if !(lower >= 0.0 && upper > lower) {
            return Err(FrontendError::InvalidConfig(format!(
                "bad filterbank band limits [{lower}, {upper}]"
            )));
        }
        if spectrum_size < 2 {
            return Err(FrontendError::InvalidConfig(format!(
                "spectrum of {spectrum_size} bins is too small"
            )));
        }

        let num_bands = config.num_channels + 1;
        let centers = center_frequencies(num_bands, lower, upper);

        // Always exclude DC.
        let hz_per_sbin = (0.5 * sample_rate as f64 / (spectrum_size as f32 - 1.0) as f64) as f32;
        let start_index = (1.5 + (lower / hz_per_sbin) as f64) as usize;

        let mel_low = freq_to_mel(lower);
        let mut bands = Vec::with_capacity(num_bands);
        let mut end_index = 0;
        let mut band_start = start_index;

        for (chan, &center) in centers.iter().enumerate() {
            let mut freq_index = band_start;
            while freq_index <= spectrum_size
                && freq_to_mel(freq_index as f32 * hz_per_sbin) <= center
            {
                freq_index += 1;
            }

            let lower_edge = if chan == 0 { mel_low } else { centers[chan - 1] };
            let (weights, unweights) = (band_start..freq_index)
                .map(|f| {
                    let mel = freq_to_mel(f as f32 * hz_per_sbin);
                    quantize_weight((center - mel) / (center - lower_edge))
                })
                .unzip();

            bands.push(Band {
                start: band_start,
                weights,
                unweights,
            });
            end_index = end_index.max(freq_index);
            band_start = freq_index;
        }

        if end_index >= spectrum_size {
            return Err(FrontendError::InvalidConfig(format!(
                "filterbank upper limit {upper} Hz is beyond Nyquist for {sample_rate} Hz"
            )));
        }

        Ok(Self {
            num_channels: config.num_channels,
            start_index,
            end_index,
            bands,
            energy: vec![0; spectrum_size],
            work: vec![0; num_bands],
            output: vec![0; config.num_channels],
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// First FFT bin that contributes to any channel.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// One past the last FFT bin that contributes to any channel.
    pub fn end_index(&self) -> usize {
        self.end_index
    }

    /// Converts `fft_output` into channel magnitudes, undoing the FFT input
    /// shift. The returned slice is reused by later stages.
    pub fn compute(&mut self, fft_output: &[Complex16], scale_down_shift: u32) -> &mut [u32] {
        self.convert_to_energy(fft_output);
        self.accumulate_channels();
        for (out, &acc) in self.output.iter_mut().zip(&self.work[1..]) {
            *out = sqrt64(acc) >> scale_down_shift;
        }
        &mut self.output
    }

    fn convert_to_energy(&mut self, fft_output: &[Complex16]) {
        for i in self.start_index..self.end_index {
            let bin = fft_output[i];
            let (re, im) = (bin.re as i32, bin.im as i32);
            self.energy[i] = (re * re).wrapping_add(im * im);
        }
    }

    fn accumulate_channels(&mut self) {
        let mut weight_acc: u64 = 0;
        let mut unweight_acc: u64 = 0;
        for (band, work) in self.bands.iter().zip(self.work.iter_mut()) {
            let energy = &self.energy[band.start..band.start + band.weights.len()];
            for ((&e, &w), &uw) in energy.iter().zip(&band.weights).zip(&band.unweights) {
                let magnitude = e as u32 as u64;
                weight_acc = weight_acc.wrapping_add((w as u64).wrapping_mul(magnitude));
                unweight_acc = unweight_acc.wrapping_add((uw as u64).wrapping_mul(magnitude));
            }
            *work = weight_acc;
            weight_acc = unweight_acc;
            unweight_acc = 0;
        }
    }

    pub fn reset(&mut self) {
        self.energy.fill(0);
        self.work.fill(0);
        self.output.fill(0);
    }
}

/// Rounded integer square root; the result saturates at `u16::MAX`.
pub(crate) fn sqrt32(mut num: u32) -> u16 {
    if num == 0 {
        return 0;
    }
    let mut res: u32 = 0;
    let max_bit_number = (32 - super::most_significant_bit32(num)) | 1;
    let mut bit: u32 = 1 << (31 - max_bit_number);
    let iterations = (31 - max_bit_number) / 2 + 1;
    for _ in 0..iterations {
        if num >= res + bit {
            num -= res + bit;
            res = (res >> 1) + bit;
        } else {
            res >>= 1;
        }
        bit >>= 2;
    }
    if num > res && res != 0xFFFF {
        res += 1;
    }
    res as u16
}

/// Rounded integer square root of a 64-bit value.
///
/// Values below 2^32 go through [`sqrt32`], which can be off by one near
/// 2^32.
pub(crate) fn sqrt64(mut num: u64) -> u32 {
    if num >> 32 == 0 {
        return sqrt32(num as u32) as u32;
    }
    let mut res: u64 = 0;
    let max_bit_number = (64 - super::most_significant_bit64(num)) | 1;
    let mut bit: u64 = 1 << (63 - max_bit_number);
    let iterations = (63 - max_bit_number) / 2 + 1;
    for _ in 0..iterations {
        if num >= res + bit {
            num -= res + bit;
            res = (res >> 1) + bit;
        } else {
            res >>= 1;
        }
        bit >>= 2;
    }
    if num > res && res != 0xFFFF_FFFF {
        res += 1;
    }
    res as u32
}
