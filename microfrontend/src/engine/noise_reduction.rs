//! Per-channel noise floor estimation and subtraction.

use crate::config::NoiseReductionConfig;
use crate::error::FrontendError;

pub(crate) const NOISE_REDUCTION_BITS: u32 = 14;

pub struct NoiseReduction {
    smoothing_bits: u32,
    even_smoothing: u32,
    odd_smoothing: u32,
    min_signal_remaining: u32,
    estimate: Vec<u32>,
}

fn to_q14(name: &str, value: f32) -> Result<u32, FrontendError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(FrontendError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok((value * (1u32 << NOISE_REDUCTION_BITS) as f32) as u32)
}

impl NoiseReduction {
    pub fn new(config: &NoiseReductionConfig, num_channels: usize) -> Result<Self, FrontendError> {
        if config.smoothing_bits >= 32 {
            return Err(FrontendError::InvalidConfig(format!(
                "smoothing_bits {} is too large",
                config.smoothing_bits
            )));
        }
        Ok(Self {
            smoothing_bits: config.smoothing_bits,
            even_smoothing: to_q14("even_smoothing", config.even_smoothing)?,
            odd_smoothing: to_q14("odd_smoothing", config.odd_smoothing)?,
            min_signal_remaining: to_q14("min_signal_remaining", config.min_signal_remaining)?,
            estimate: vec![0; num_channels],
        })
    }

    pub fn smoothing_bits(&self) -> u32 {
        self.smoothing_bits
    }

    /// Current noise estimate per channel, scaled up by `smoothing_bits`.
    pub fn estimate(&self) -> &[u32] {
        &self.estimate
    }

    /// Updates the estimate with `signal` and subtracts it in place.
    pub fn apply(&mut self, signal: &mut [u32]) {
        let one = 1u64 << NOISE_REDUCTION_BITS;
        for (i, (s, est)) in signal.iter_mut().zip(self.estimate.iter_mut()).enumerate() {
            let smoothing = if i & 1 == 0 {
                self.even_smoothing
            } else {
                self.odd_smoothing
            } as u64;

            let scaled_up = *s << self.smoothing_bits;
            let mut estimate = ((scaled_up as u64 * smoothing + *est as u64 * (one - smoothing))
                >> NOISE_REDUCTION_BITS) as u32;
            *est = estimate;

            // signal - estimate must not go negative.
            if estimate > scaled_up {
                estimate = scaled_up;
            }

            let floor = ((*s as u64 * self.min_signal_remaining as u64) >> NOISE_REDUCTION_BITS) as u32;
            let subtracted = (scaled_up - estimate) >> self.smoothing_bits;
            *s = subtracted.max(floor);
        }
    }

    pub fn reset(&mut self) {
        self.estimate.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micro() -> NoiseReduction {
        NoiseReduction::new(
            &NoiseReductionConfig {
                smoothing_bits: 10,
                even_smoothing: 0.025,
                odd_smoothing: 0.06,
                min_signal_remaining: 0.05,
            },
            4,
        )
        .unwrap()
    }

    #[test]
    fn coefficients_truncate_to_q14() {
        let nr = micro();
        assert_eq!(nr.even_smoothing, 409);
        assert_eq!(nr.odd_smoothing, 983);
        assert_eq!(nr.min_signal_remaining, 819);
    }

    #[test]
    fn first_frame_of_alternating_input() {
        let mut nr = micro();
        let mut signal: [u32; 4] = [247311, 508620, 0, 0];
        nr.apply(&mut signal);
        assert_eq!(&signal[..2], &[241137, 478104]);
        assert_eq!(&nr.estimate()[..2], &[6321887, 31248341]);

        let mut signal: [u32; 4] = [247303, 508625, 0, 0];
        nr.apply(&mut signal);
        assert_eq!(&signal[..2], &[235109, 449423]);
        assert_eq!(&nr.estimate()[..2], &[12485754, 60622165]);
    }

    #[test]
    fn steady_signal_decays_to_floor() {
        let mut nr = micro();
        let mut last = vec![0u32; 4];
        for _ in 0..2000 {
            let mut signal = vec![1000u32; 4];
            nr.apply(&mut signal);
            last = signal;
        }
        // 5% of 1000 survives once the estimate has converged.
        for v in last {
            assert!(v <= 60, "v = {v}");
            assert!(v >= 49, "v = {v}");
        }
    }

    #[test]
    fn odd_channels_adapt_faster() {
        let mut nr = micro();
        for _ in 0..10 {
            let mut signal = vec![1000u32; 4];
            nr.apply(&mut signal);
        }
        assert!(nr.estimate()[1] > nr.estimate()[0]);
    }

    #[test]
    fn reset_clears_estimate() {
        let mut nr = micro();
        let mut signal = vec![500u32; 4];
        nr.apply(&mut signal);
        assert!(nr.estimate().iter().any(|&e| e > 0));
        nr.reset();
        assert!(nr.estimate().iter().all(|&e| e == 0));
    }

    #[test]
    fn rejects_out_of_range_smoothing() {
        let cfg = NoiseReductionConfig {
            smoothing_bits: 10,
            even_smoothing: 1.5,
            odd_smoothing: 0.06,
            min_signal_remaining: 0.05,
        };
        assert!(NoiseReduction::new(&cfg, 4).is_err());
    }
}
