use thiserror::Error;

pub type Result<T> = std::result::Result<T, WaveformError>;

#[derive(Debug, Error)]
pub enum WaveformError {
    /// Empty buffer or a declared media type that is not audio.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("failed to decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<symphonia::core::errors::Error>,
    },

    #[error("insufficient samples: {samples} samples cannot fill {resolution} blocks")]
    InsufficientSamples { samples: usize, resolution: usize },

    #[error("invalid render spec: {0}")]
    InvalidRenderSpec(String),

    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),
}

impl WaveformError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn decode_with(reason: impl Into<String>, source: symphonia::core::errors::Error) -> Self {
        Self::Decode {
            reason: reason.into(),
            source: Some(source),
        }
    }
}
