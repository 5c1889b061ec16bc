use super::envelope::Envelope;

/// Envelope rescaled so its loudest block is exactly 1.0.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEnvelope {
    values: Vec<f32>,
}

impl NormalizedEnvelope {
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Divide every block by the peak. Silence stays all-zero.
pub fn normalize(envelope: &Envelope) -> NormalizedEnvelope {
    let peak = envelope.values().iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return NormalizedEnvelope {
            values: vec![0.0; envelope.len()],
        };
    }
    NormalizedEnvelope {
        values: envelope.values().iter().map(|v| v / peak).collect(),
    }
}
