use thiserror::Error;

/// Errors returned by frontend setup.
///
/// Processing and reset never fail; the only fallible step is building the
/// engine state for a session.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("microfrontend: initialization failed at {sample_rate} Hz: {reason}")]
    InitializationFailed { sample_rate: i64, reason: String },

    #[error("microfrontend: invalid config: {0}")]
    InvalidConfig(String),
}

impl FrontendError {
    /// Wraps a stage error as an initialization failure for `sample_rate`.
    pub(crate) fn at_sample_rate(self, sample_rate: i64) -> Self {
        match self {
            Self::InvalidConfig(reason) => Self::InitializationFailed {
                sample_rate,
                reason,
            },
            other => other,
        }
    }
}
