use rayon::prelude::*;

use crate::error::{Result, WaveformError};

pub const DEFAULT_RESOLUTION: usize = 200;

/// Block-averaged absolute amplitude of one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    values: Vec<f32>,
    block_size: usize,
}

impl Envelope {
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Samples averaged into each value.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Reduce `channel` to `resolution` mean-magnitude blocks.
///
/// Blocks are `channel.len() / resolution` samples wide. The trailing
/// `channel.len() % resolution` samples do not fit a whole block and are
/// dropped.
pub fn reduce(channel: &[f32], resolution: usize) -> Result<Envelope> {
    if resolution == 0 {
        return Err(WaveformError::InsufficientSamples {
            samples: channel.len(),
            resolution,
        });
    }
    let block_size = channel.len() / resolution;
    if block_size == 0 {
        return Err(WaveformError::InsufficientSamples {
            samples: channel.len(),
            resolution,
        });
    }

    // Each block is summed sequentially by one task, so the result does not
    // depend on how rayon schedules blocks.
    let values: Vec<f32> = channel[..block_size * resolution]
        .par_chunks(block_size)
        .map(|block| {
            let sum: f64 = block.iter().map(|&s| s.abs() as f64).sum();
            (sum / block_size as f64) as f32
        })
        .collect();

    log::debug!(
        "Reduced {} samples to {} blocks of {} ({} trailing samples dropped)",
        channel.len(),
        resolution,
        block_size,
        channel.len() - block_size * resolution
    );

    Ok(Envelope { values, block_size })
}
