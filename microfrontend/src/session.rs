//! Streaming feature session.

use tracing::{debug, trace, warn};

use crate::config::{FEATURE_SIZE, FrontendConfig, OUTPUT_SCALE};
use crate::engine::{Engine, MicroFrontend};
use crate::error::FrontendError;

/// One frame of scaled filterbank features.
pub type FeatureFrame = [f32; FEATURE_SIZE];

/// Turns a PCM16 stream into feature frames.
///
/// This is the seam wake word detectors consume, so they can be driven by a
/// scripted extractor in tests.
pub trait FeatureExtractor {
    /// Feeds `samples` and returns every frame completed by them, in order.
    fn process_samples(&mut self, samples: &[i16]) -> Vec<FeatureFrame>;

    /// Forgets all buffered audio and adaptive state.
    fn reset(&mut self);
}

/// A streaming session over one engine instance.
///
/// Samples that do not complete a window stay buffered inside the engine
/// and are used by the next call, so feeding a stream in one call or in many
/// produces the same frames. The engine is released when the session is
/// dropped.
pub struct FeatureSession<E: Engine = MicroFrontend> {
    sample_rate: u32,
    step_size_ms: u32,
    engine: E,
}

impl FeatureSession<MicroFrontend> {
    /// Creates a session for mono PCM16 at `sample_rate` Hz, emitting one
    /// frame every `step_size_ms`.
    pub fn new(sample_rate: i32, step_size_ms: i32) -> Result<Self, FrontendError> {
        let (Ok(rate), Ok(step)) = (u32::try_from(sample_rate), u32::try_from(step_size_ms)) else {
            warn!(sample_rate, step_size_ms, "microfrontend: negative session parameters");
            return Err(FrontendError::InitializationFailed {
                sample_rate: sample_rate as i64,
                reason: format!("invalid step size {step_size_ms}ms or sample rate"),
            });
        };
        if rate == 0 || step == 0 {
            warn!(sample_rate, step_size_ms, "microfrontend: zero session parameters");
            return Err(FrontendError::InitializationFailed {
                sample_rate: sample_rate as i64,
                reason: "sample rate and step size must be positive".into(),
            });
        }

        let config = FrontendConfig::micro_wake_word(step);
        let engine = MicroFrontend::new(&config, rate).inspect_err(|e| {
            warn!(error = %e, "microfrontend: engine init failed");
        })?;
        debug!(sample_rate, step_size_ms, "microfrontend: session created");
        Ok(Self::with_engine(engine, rate, step))
    }

    /// Engine configuration this session was built with.
    pub fn config(&self) -> &FrontendConfig {
        self.engine.config()
    }
}

impl<E: Engine> FeatureSession<E> {
    /// Wraps an already initialized engine. The caller vouches that
    /// `sample_rate` and `step_size_ms` describe how `engine` was built.
    pub(crate) fn with_engine(engine: E, sample_rate: u32, step_size_ms: u32) -> Self {
        Self {
            sample_rate,
            step_size_ms,
            engine,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn step_size_ms(&self) -> u32 {
        self.step_size_ms
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Feeds `samples` and returns every frame they complete.
    ///
    /// Empty input returns no frames without touching the engine.
    pub fn process_samples(&mut self, samples: &[i16]) -> Vec<FeatureFrame> {
        let mut frames = Vec::new();
        let mut remaining = samples;
        while !remaining.is_empty() {
            let output = self.engine.consume(remaining);
            if let Some(values) = output.values.filter(|v| !v.is_empty()) {
                frames.push(scale_frame(values));
            }
            if output.consumed == 0 {
                break;
            }
            remaining = &remaining[output.consumed.min(remaining.len())..];
        }
        frames
    }

    pub fn reset(&mut self) {
        self.engine.reset();
    }
}

impl<E: Engine> FeatureExtractor for FeatureSession<E> {
    fn process_samples(&mut self, samples: &[i16]) -> Vec<FeatureFrame> {
        FeatureSession::process_samples(self, samples)
    }

    fn reset(&mut self) {
        FeatureSession::reset(self)
    }
}

impl<E: Engine> Drop for FeatureSession<E> {
    fn drop(&mut self) {
        debug!(
            sample_rate = self.sample_rate,
            step_size_ms = self.step_size_ms,
            "microfrontend: session released"
        );
    }
}

/// Converts raw engine units to model units. Missing channels stay zero and
/// extra channels are dropped.
fn scale_frame(values: &[u16]) -> FeatureFrame {
    if values.len() < FEATURE_SIZE {
        debug!(channels = values.len(), "microfrontend: partial frame");
    } else if values.len() > FEATURE_SIZE {
        trace!(channels = values.len(), "microfrontend: truncating frame");
    }

    let mut frame = [0.0f32; FEATURE_SIZE];
    for (out, &v) in frame.iter_mut().zip(values) {
        *out = v as f32 * OUTPUT_SCALE;
    }
    frame
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::engine::EngineOutput;

    /// Replays a fixed list of `(consumed, values)` steps.
    struct ScriptedEngine {
        steps: VecDeque<(usize, Option<Vec<u16>>)>,
        current: Vec<u16>,
        calls: usize,
        resets: usize,
    }

    impl ScriptedEngine {
        fn new(steps: Vec<(usize, Option<Vec<u16>>)>) -> Self {
            Self {
                steps: steps.into(),
                current: Vec::new(),
                calls: 0,
                resets: 0,
            }
        }
    }

    impl Engine for ScriptedEngine {
        fn consume(&mut self, samples: &[i16]) -> EngineOutput<'_> {
            self.calls += 1;
            let Some((consumed, values)) = self.steps.pop_front() else {
                return EngineOutput {
                    values: None,
                    consumed: 0,
                };
            };
            let consumed = consumed.min(samples.len());
            match values {
                Some(v) => {
                    self.current = v;
                    EngineOutput {
                        values: Some(&self.current),
                        consumed,
                    }
                }
                None => EngineOutput {
                    values: None,
                    consumed,
                },
            }
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn scripted(steps: Vec<(usize, Option<Vec<u16>>)>) -> FeatureSession<ScriptedEngine> {
        FeatureSession::with_engine(ScriptedEngine::new(steps), 16000, 20)
    }

    #[test]
    fn empty_input_skips_engine() {
        let mut s = scripted(vec![(10, Some(vec![1; 40]))]);
        assert!(s.process_samples(&[]).is_empty());
        assert_eq!(s.engine().calls, 0);
    }

    #[test]
    fn scales_each_channel() {
        let values: Vec<u16> = (0..40).collect();
        let mut s = scripted(vec![(100, Some(values))]);
        let frames = s.process_samples(&[0; 100]);
        assert_eq!(frames.len(), 1);
        for (i, &v) in frames[0].iter().enumerate() {
            assert_eq!(v, i as f32 * 0.0390625);
        }
        assert_eq!(frames[0][0], 0.0);
        assert_eq!(frames[0][1], 0.0390625);
    }

    #[test]
    fn partial_frame_is_zero_filled() {
        let mut s = scripted(vec![(10, Some(vec![256; 3]))]);
        let frames = s.process_samples(&[0; 10]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..3], &[10.0, 10.0, 10.0]);
        assert!(frames[0][3..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn extra_channels_are_truncated() {
        let mut s = scripted(vec![(10, Some(vec![512; 64]))]);
        let frames = s.process_samples(&[0; 10]);
        assert_eq!(frames[0].len(), FEATURE_SIZE);
        assert!(frames[0].iter().all(|&v| v == 20.0));
    }

    #[test]
    fn empty_values_emit_nothing() {
        let mut s = scripted(vec![(5, Some(vec![])), (5, None)]);
        assert!(s.process_samples(&[0; 10]).is_empty());
        assert_eq!(s.engine().calls, 2);
    }

    #[test]
    fn stops_when_engine_consumes_nothing() {
        let mut s = scripted(vec![
            (4, None),
            (4, Some(vec![1; 40])),
            (0, Some(vec![2; 40])),
            (2, Some(vec![3; 40])),
        ]);
        let frames = s.process_samples(&[0; 10]);
        // The zero-consumption step still reports its frame, then the loop ends.
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][0], 2.0 * 0.0390625);
        assert_eq!(s.engine().calls, 3);
    }

    #[test]
    fn loops_until_input_is_drained() {
        let steps = (0..5).map(|i| (2, Some(vec![i; 40]))).collect();
        let mut s = scripted(steps);
        let frames = s.process_samples(&[0; 10]);
        assert_eq!(frames.len(), 5);
        assert_eq!(s.engine().calls, 5);
        assert_eq!(frames[4][39], 4.0 * 0.0390625);
    }

    #[test]
    fn reset_reaches_engine() {
        let mut s = scripted(vec![]);
        FeatureExtractor::reset(&mut s);
        s.reset();
        assert_eq!(s.engine().resets, 2);
    }

    #[test]
    fn new_rejects_non_positive_parameters() {
        for (rate, step) in [(0, 20), (-16000, 20), (16000, 0), (16000, -10)] {
            let err = FeatureSession::new(rate, step).err().unwrap();
            assert!(
                matches!(err, FrontendError::InitializationFailed { sample_rate, .. } if sample_rate == rate as i64),
                "{rate}/{step}: {err}"
            );
        }
    }

    #[test]
    fn reported_parameters_match_engine_geometry() {
        for (rate, step) in [(16000, 10), (16000, 20), (22050, 15), (48000, 30)] {
            let s = FeatureSession::new(rate, step).unwrap();
            let expected_step = s.sample_rate() as usize * s.step_size_ms() as usize / 1000;
            let expected_window = s.sample_rate() as usize * 30 / 1000;
            assert_eq!(s.engine().step_size(), expected_step, "{rate}/{step}");
            assert_eq!(s.engine().window_size(), expected_window, "{rate}/{step}");
        }
    }

    #[test]
    fn new_uses_micro_wake_word_config() {
        let s = FeatureSession::new(16000, 20).unwrap();
        assert_eq!(s.sample_rate(), 16000);
        assert_eq!(s.step_size_ms(), 20);
        assert_eq!(*s.config(), FrontendConfig::micro_wake_word(20));
        assert_eq!(s.engine().window_size(), 480);
        assert_eq!(s.engine().step_size(), 320);
    }
}
