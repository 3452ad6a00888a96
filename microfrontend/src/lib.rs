//! Streaming spectrogram features for microWakeWord-style keyword spotting.
//!
//! The crate drives a fixed-point "micro frontend" (window, FFT, mel
//! filterbank, noise reduction, PCAN gain control, log compression) over a
//! continuous 16-bit PCM stream and emits one 40-channel feature frame per
//! analysis window.
//!
//! # Layers
//!
//! - [`config`]: the fixed engine parameter set the downstream model was
//!   trained with ([`FrontendConfig::micro_wake_word`]).
//! - [`engine`]: the [`Engine`] contract and its [`MicroFrontend`]
//!   implementation.
//! - [`session`]: [`FeatureSession`], which owns one engine, buffers partial
//!   windows across calls and scales the output to `f32`.
//! - [`handle`] / [`ffi`]: opaque-handle boundary for host runtimes. Invalid
//!   handles degrade to empty results instead of faulting.
//!
//! # Example
//!
//! ```rust
//! use giztoy_microfrontend::{FeatureSession, FEATURE_SIZE};
//!
//! // 16kHz audio, 20ms hop: 480-sample window, 320-sample step.
//! let mut session = FeatureSession::new(16000, 20).unwrap();
//!
//! // Not enough for a window yet: the samples stay buffered.
//! assert!(session.process_samples(&[0i16; 319]).is_empty());
//!
//! // Completing the window emits one frame.
//! let frames = session.process_samples(&[0i16; 161]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].len(), FEATURE_SIZE);
//! ```

pub mod config;
pub mod engine;
mod error;
pub mod ffi;
pub mod handle;
pub mod session;

pub use config::{FEATURE_SIZE, FrontendConfig, OUTPUT_SCALE};
pub use engine::{Engine, EngineOutput, MicroFrontend};
pub use error::FrontendError;
pub use handle::Handle;
pub use session::{FeatureExtractor, FeatureFrame, FeatureSession};
