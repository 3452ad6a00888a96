//! Hann analysis window with sample buffering across calls.

use std::f64::consts::PI;

use crate::config::WindowConfig;
use crate::error::FrontendError;

/// Fixed-point precision of the window coefficients.
pub(crate) const WINDOW_BITS: u32 = 12;

/// Buffers incoming samples until a full window is available, then applies
/// the window and slides the buffer forward by one step.
pub struct Window {
    size: usize,
    step: usize,
    coefficients: Vec<i16>,
    input: Vec<i16>,
    output: Vec<i16>,
    input_used: usize,
    max_abs_output_value: i16,
}

impl Window {
    pub fn new(config: &WindowConfig, sample_rate: u32) -> Result<Self, FrontendError> {
        let size = (config.size_ms as u64 * sample_rate as u64 / 1000) as usize;
        let step = (config.step_size_ms as u64 * sample_rate as u64 / 1000) as usize;
        if size == 0 {
            return Err(FrontendError::InvalidConfig(format!(
                "window of {}ms holds no samples",
                config.size_ms
            )));
        }
        if step == 0 {
            return Err(FrontendError::InvalidConfig(format!(
                "step of {}ms holds no samples",
                config.step_size_ms
            )));
        }
        if step > size {
            return Err(FrontendError::InvalidConfig(format!(
                "step ({step} samples) exceeds window ({size} samples)"
            )));
        }

        Ok(Self {
            size,
            step,
            coefficients: hann_coefficients(size),
            input: vec![0; size],
            output: vec![0; size],
            input_used: 0,
            max_abs_output_value: 0,
        })
    }

    /// Window length in samples.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Hop length in samples.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Windowed samples of the most recently completed window.
    pub fn output(&self) -> &[i16] {
        &self.output
    }

    /// Largest magnitude in [`Window::output`].
    pub fn max_abs_output_value(&self) -> i16 {
        self.max_abs_output_value
    }

    /// Copies as many samples as fit into the pending window.
    ///
    /// Returns the number of samples read and whether a window was completed.
    pub fn process_samples(&mut self, samples: &[i16]) -> (usize, bool) {
        let to_copy = (self.size - self.input_used).min(samples.len());
        self.input[self.input_used..self.input_used + to_copy]
            .copy_from_slice(&samples[..to_copy]);
        self.input_used += to_copy;

        if self.input_used < self.size {
            return (to_copy, false);
        }

        let mut max_abs: i16 = 0;
        for ((out, &x), &c) in self
            .output
            .iter_mut()
            .zip(&self.input)
            .zip(&self.coefficients)
        {
            let v = ((x as i32 * c as i32) >> WINDOW_BITS) as i16;
            *out = v;
            let abs = v.wrapping_abs();
            if abs > max_abs {
                max_abs = abs;
            }
        }

        self.input.copy_within(self.step.., 0);
        self.input_used -= self.step;
        self.max_abs_output_value = max_abs;

        (to_copy, true)
    }

    pub fn reset(&mut self) {
        self.input.fill(0);
        self.output.fill(0);
        self.input_used = 0;
        self.max_abs_output_value = 0;
    }
}

/// Periodic Hann window sampled at bin centers, quantized to Q12.
fn hann_coefficients(size: usize) -> Vec<i16> {
    let arg = (PI * 2.0 / size as f64) as f32;
    (0..size)
        .map(|i| {
            let value = (0.5 - 0.5 * (arg as f64 * (i as f64 + 0.5)).cos()) as f32;
            ((value * (1 << WINDOW_BITS) as f32) as f64 + 0.5).floor() as i16
        })
        .collect()
}
