//! Engine configuration.
//!
//! The values in [`FrontendConfig::micro_wake_word`] are a compatibility
//! contract with the downstream classifier: it was trained on features from
//! exactly this parameterization, and any drift degrades accuracy silently
//! instead of failing. Alternate models get their own constructor.

use serde::{Deserialize, Serialize};

/// Number of filterbank channels in every feature frame.
pub const FEATURE_SIZE: usize = 40;

/// Converts the engine's `u16` log-magnitude units to model input units.
pub const OUTPUT_SCALE: f32 = 0.0390625;

/// Analysis window length in milliseconds.
pub const WINDOW_SIZE_MS: u32 = 30;

/// Analysis window timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in milliseconds.
    pub size_ms: u32,
    /// Hop between successive windows in milliseconds.
    pub step_size_ms: u32,
}

/// Mel filterbank layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterbankConfig {
    /// Number of output channels.
    pub num_channels: usize,
    /// Lower band edge in Hz.
    pub lower_band_limit: f32,
    /// Upper band edge in Hz. Must stay below Nyquist.
    pub upper_band_limit: f32,
}

/// Per-channel noise floor tracking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseReductionConfig {
    /// Extra fixed-point precision kept in the noise estimate.
    pub smoothing_bits: u32,
    /// Smoothing coefficient for even channels.
    pub even_smoothing: f32,
    /// Smoothing coefficient for odd channels.
    pub odd_smoothing: f32,
    /// Fraction of the signal that always survives subtraction.
    pub min_signal_remaining: f32,
}

/// Per-channel amplitude normalization (PCAN) driven by the noise estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcanGainControlConfig {
    pub enable_pcan: bool,
    pub strength: f32,
    pub offset: f32,
    pub gain_bits: u32,
}

/// Log compression of the final channel energies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogScaleConfig {
    pub enable_log: bool,
    pub scale_shift: u32,
}

/// Complete engine configuration, consumed once at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub window: WindowConfig,
    pub filterbank: FilterbankConfig,
    pub noise_reduction: NoiseReductionConfig,
    pub pcan_gain_control: PcanGainControlConfig,
    pub log_scale: LogScaleConfig,
}

impl FrontendConfig {
    /// Returns the microWakeWord feature configuration for the given hop.
    ///
    /// Only the step size varies; every other field is fixed.
    pub fn micro_wake_word(step_size_ms: u32) -> Self {
        Self {
            window: WindowConfig {
                size_ms: WINDOW_SIZE_MS,
                step_size_ms,
            },
            filterbank: FilterbankConfig {
                num_channels: FEATURE_SIZE,
                lower_band_limit: 125.0,
                upper_band_limit: 7500.0,
            },
            noise_reduction: NoiseReductionConfig {
                smoothing_bits: 10,
                even_smoothing: 0.025,
                odd_smoothing: 0.06,
                min_signal_remaining: 0.05,
            },
            pcan_gain_control: PcanGainControlConfig {
                enable_pcan: true,
                strength: 0.95,
                offset: 80.0,
                gain_bits: 21,
            },
            log_scale: LogScaleConfig {
                enable_log: true,
                scale_shift: 6,
            },
        }
    }
}
