//! Fixed-point micro frontend.
//!
//! Each completed analysis window flows through:
//!
//! ```text
//! window -> fft -> filterbank -> noise_reduction -> pcan -> log_scale
//! ```
//!
//! All stages work in integer arithmetic, so a given input stream always
//! produces bit-identical output regardless of how it is chunked.

mod fft;
mod filterbank;
mod log_scale;
mod noise_reduction;
mod pcan;
mod window;

use tracing::debug;

use crate::config::FrontendConfig;
use crate::error::FrontendError;

use fft::Fft;
use filterbank::Filterbank;
use log_scale::LogScale;
use noise_reduction::NoiseReduction;
use pcan::PcanGainControl;
use window::Window;

pub(crate) fn most_significant_bit32(n: u32) -> u32 {
    u32::BITS - n.leading_zeros()
}

pub(crate) fn most_significant_bit64(n: u64) -> u32 {
    u64::BITS - n.leading_zeros()
}

/// Result of one [`Engine::consume`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOutput<'a> {
    /// Channel values for the window completed by this step, if any.
    pub values: Option<&'a [u16]>,
    /// Number of input samples read.
    pub consumed: usize,
}

/// A streaming feature engine.
///
/// Construction plays the role of init and `Drop` the role of release.
pub trait Engine {
    /// Reads samples until one window completes or the input runs out.
    fn consume(&mut self, samples: &[i16]) -> EngineOutput<'_>;

    /// Drops buffered audio and adaptive state.
    fn reset(&mut self);
}

/// The micro frontend engine.
pub struct MicroFrontend {
    config: FrontendConfig,
    window: Window,
    fft: Fft,
    filterbank: Filterbank,
    noise_reduction: NoiseReduction,
    pcan: Option<PcanGainControl>,
    log_scale: LogScale,
    correction_bits: i32,
}

impl MicroFrontend {
    /// Builds every stage for `config` at `sample_rate` Hz.
    pub fn new(config: &FrontendConfig, sample_rate: u32) -> Result<Self, FrontendError> {
        let rate = sample_rate as i64;
        if sample_rate == 0 {
            return Err(FrontendError::InitializationFailed {
                sample_rate: rate,
                reason: "sample rate must be positive".into(),
            });
        }

        let window = Window::new(&config.window, sample_rate).map_err(|e| e.at_sample_rate(rate))?;
        let fft = Fft::new(window.size()).map_err(|e| e.at_sample_rate(rate))?;
        let spectrum_size = fft.fft_size() / 2 + 1;
        let filterbank = Filterbank::new(&config.filterbank, sample_rate, spectrum_size)
            .map_err(|e| e.at_sample_rate(rate))?;
        let num_channels = filterbank.num_channels();
        let noise_reduction = NoiseReduction::new(&config.noise_reduction, num_channels)
            .map_err(|e| e.at_sample_rate(rate))?;

        let correction_bits =
            most_significant_bit32(fft.fft_size() as u32) as i32 - 1 - (filterbank::FILTERBANK_BITS / 2) as i32;
        let pcan = if config.pcan_gain_control.enable_pcan {
            Some(
                PcanGainControl::new(
                    &config.pcan_gain_control,
                    noise_reduction.smoothing_bits(),
                    correction_bits,
                )
                .map_err(|e| e.at_sample_rate(rate))?,
            )
        } else {
            None
        };
        let log_scale = LogScale::new(&config.log_scale, num_channels);

        debug!(
            sample_rate,
            window = window.size(),
            step = window.step(),
            fft = fft.fft_size(),
            start_bin = filterbank.start_index(),
            end_bin = filterbank.end_index(),
            "microfrontend: engine initialized"
        );

        Ok(Self {
            config: *config,
            window,
            fft,
            filterbank,
            noise_reduction,
            pcan,
            log_scale,
            correction_bits,
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// Analysis window length in samples.
    pub fn window_size(&self) -> usize {
        self.window.size()
    }

    /// Hop between windows in samples.
    pub fn step_size(&self) -> usize {
        self.window.step()
    }

    pub fn fft_size(&self) -> usize {
        self.fft.fft_size()
    }

    pub fn num_channels(&self) -> usize {
        self.filterbank.num_channels()
    }

    fn process_window(&mut self) -> &[u16] {
        let input_shift = 15 - most_significant_bit32(self.window.max_abs_output_value() as u32);
        self.fft.compute(self.window.output(), input_shift);

        let signal = self.filterbank.compute(self.fft.output(), input_shift);
        self.noise_reduction.apply(signal);
        if let Some(pcan) = &self.pcan {
            pcan.apply(signal, self.noise_reduction.estimate());
        }
        self.log_scale.apply(signal, self.correction_bits)
    }
}

impl Engine for MicroFrontend {
    fn consume(&mut self, samples: &[i16]) -> EngineOutput<'_> {
        let (consumed, ready) = self.window.process_samples(samples);
        let values = if ready {
            Some(self.process_window())
        } else {
            None
        };
        EngineOutput { values, consumed }
    }

    fn reset(&mut self) {
        self.window.reset();
        self.fft.reset();
        self.filterbank.reset();
        self.noise_reduction.reset();
    }
}
