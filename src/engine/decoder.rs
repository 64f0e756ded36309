// Latent decoder. Maps one latent frame to a displayable image through the decoder network.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::LOG_EVERY_FRAMES;
use crate::error::EngineError;
use crate::inference::{InferenceSession, TensorRef, TensorScope};
use crate::model::{DecoderConfig, FrameDims, LatentRange};

pub const LATENT: &str = "latent";
pub const RGB: &str = "rgb";

/// Map a normalized `[-1, 1]` latent value into `range`.
pub fn rescale_latent(x: f32, range: LatentRange) -> f32 {
    (x + 1.0) / 2.0 * (range.max - range.min) + range.min
}

/// Inverse of [`rescale_latent`].
pub fn normalize_latent(x: f32, range: LatentRange) -> f32 {
    (x - range.min) / (range.max - range.min) * 2.0 - 1.0
}

pub struct LatentDecoder {
    latent_dims: FrameDims,
    output_dims: FrameDims,
    latent_range: Option<LatentRange>,
    rescaled: Vec<f32>,
    output: Vec<f32>,
    decodes: u64,
}

impl LatentDecoder {
    pub fn new(config: &DecoderConfig, latent_dims: FrameDims) -> Self {
        let output_dims = config.output_dims();
        Self {
            latent_dims,
            output_dims,
            latent_range: config.latent_range,
            rescaled: Vec::new(),
            output: vec![0.0; output_dims.len()],
            decodes: 0,
        }
    }

    /// Fixed `(C, H, W)` of decoded images.
    pub fn output_dims(&self) -> FrameDims {
        self.output_dims
    }

    pub fn decodes(&self) -> u64 {
        self.decodes
    }

    /// Decode `latent` into the decoder's owned output buffer.
    ///
    /// The output is copied out of the device tensor before that tensor is released.
    pub async fn decode(
        &mut self,
        session: &dyn InferenceSession,
        latent: &[f32],
    ) -> Result<&[f32]> {
        let t0 = Instant::now();
        if latent.len() != self.latent_dims.len() {
            return Err(EngineError::ShapeMismatch {
                expected: self.latent_dims.len(),
                actual: latent.len(),
            }
            .into());
        }

        let input = match self.latent_range {
            Some(range) => {
                if self.rescaled.len() != latent.len() {
                    self.rescaled = vec![0.0; latent.len()];
                }
                for (dst, x) in self.rescaled.iter_mut().zip(latent) {
                    *dst = rescale_latent(*x, range);
                }
                &self.rescaled[..]
            }
            None => latent,
        };

        let d = self.latent_dims;
        let shape = [1, d.c, d.h, d.w];
        {
            let mut scope = TensorScope::new(session);
            scope.input(LATENT, TensorRef::f32(input, &shape))?;
            scope.run().await.context("decoder run")?;
            scope.read_f32(RGB, &mut self.output)?;
        }

        if self.decodes % LOG_EVERY_FRAMES == 0 {
            debug!(
                "decoder frame {}: {:.1}ms",
                self.decodes,
                t0.elapsed().as_secs_f64() * 1000.0
            );
        }
        self.decodes += 1;

        Ok(&self.output)
    }
}
