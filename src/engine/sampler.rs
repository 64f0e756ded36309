// Diffusion rollout sampler: Euler integration over a fixed Karras noise schedule.

use std::time::Instant;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use super::context::WindowView;
use crate::config::{LOG_EVERY_FRAMES, MULTI_STEP_INIT_NOISE, RHO};
use crate::error::EngineError;
use crate::inference::{InferenceSession, TensorRef, TensorScope};
use crate::model::{DenoiserConfig, InputNames};

pub const NOISY_NEXT_OBS: &str = "noisy_next_obs";
pub const SIGMA: &str = "sigma";
pub const SIGMA_COND: &str = "sigma_cond";
pub const DENOISED: &str = "denoised";

/// `num_steps + 1` decreasing noise levels ending in exactly 0.
///
/// One step gives `[sigma_max, 0]`. More steps interpolate linearly between
/// `sigma_max^(1/rho)` and `sigma_min^(1/rho)` and raise the result back to `rho`.
pub fn noise_schedule(num_steps: usize, sigma_min: f32, sigma_max: f32, rho: f64) -> Vec<f32> {
    if num_steps <= 1 {
        return vec![sigma_max, 0.0];
    }
    let min_inv = (sigma_min as f64).powf(1.0 / rho);
    let max_inv = (sigma_max as f64).powf(1.0 / rho);
    let mut sigmas = Vec::with_capacity(num_steps + 1);
    for i in 0..num_steps {
        let l = i as f64 / (num_steps - 1) as f64;
        sigmas.push((max_inv + l * (min_inv - max_inv)).powf(rho) as f32);
    }
    sigmas.push(0.0);
    sigmas
}

pub struct DiffusionSampler {
    sigma_min: f32,
    inputs: InputNames,
    sigmas: Vec<f32>,
    rng: StdRng,
    // Scratch reused across calls; resized only when the frame or window shape changes.
    state: Vec<f32>,
    denoised: Vec<f32>,
    result: Vec<f32>,
    actions: Vec<i64>,
    samples: u64,
}

impl DiffusionSampler {
    pub fn new(config: &DenoiserConfig, seed: Option<u64>) -> Result<Self> {
        if config.num_steps == 0 {
            return Err(EngineError::InvalidConfig("num_steps must be > 0".to_string()).into());
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            sigma_min: config.sigma_min,
            inputs: config.inputs.clone(),
            sigmas: noise_schedule(config.num_steps, config.sigma_min, config.sigma_max, RHO),
            rng,
            state: Vec::new(),
            denoised: Vec::new(),
            result: Vec::new(),
            actions: Vec::new(),
            samples: 0,
        })
    }

    pub fn sigmas(&self) -> &[f32] {
        &self.sigmas
    }

    pub fn num_steps(&self) -> usize {
        self.sigmas.len() - 1
    }

    /// Magnitude of the Gaussian perturbation applied to the current frame before integrating.
    pub fn init_noise_scale(&self) -> f32 {
        if self.num_steps() == 1 {
            self.sigmas[0]
        } else {
            MULTI_STEP_INIT_NOISE
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Produce the next observation from `window`, calling the rollout network once per step.
    ///
    /// The returned slice is a stable copy owned by the sampler and stays valid until the
    /// next call. Nothing outside the sampler is mutated, so a failure leaves the caller's
    /// context exactly as it was.
    pub async fn sample(
        &mut self,
        session: &dyn InferenceSession,
        window: WindowView<'_>,
    ) -> Result<&[f32]> {
        let t0 = Instant::now();
        let frame = window.dims.len();
        if self.state.len() != frame {
            self.state = vec![0.0; frame];
            self.denoised = vec![0.0; frame];
            self.result = vec![0.0; frame];
        }
        if self.actions.len() != window.t {
            self.actions = vec![0; window.t];
        }
        for (dst, a) in self.actions.iter_mut().zip(window.actions) {
            *dst = *a as i64;
        }
        self.actions[window.t - 1] = window.pending_action as i64;

        let scale = self.init_noise_scale();
        for (x, last) in self.state.iter_mut().zip(window.current()) {
            let noise: f32 = self.rng.sample(StandardNormal);
            *x = last + noise * scale;
        }

        let sigma_cond = self.inputs.sigma_cond.then_some(self.sigma_min);
        for (step, pair) in self.sigmas.windows(2).enumerate() {
            let (sigma, next_sigma) = (pair[0], pair[1]);
            denoise(
                session,
                &self.inputs,
                &self.state,
                sigma,
                sigma_cond,
                &window,
                &self.actions,
                &mut self.denoised,
            )
            .await
            .with_context(|| format!("denoise step {} (sigma={})", step, sigma))?;

            let dt = next_sigma - sigma;
            for (x, den) in self.state.iter_mut().zip(&self.denoised) {
                let d = (*x - den) / sigma;
                *x += d * dt;
            }
        }

        self.result.copy_from_slice(&self.state);

        if self.samples % LOG_EVERY_FRAMES == 0 {
            debug!(
                "sampler frame {} steps={} elapsed_ms={:.1}",
                self.samples,
                self.num_steps(),
                t0.elapsed().as_secs_f64() * 1000.0
            );
        }
        self.samples += 1;

        Ok(&self.result)
    }
}

/// One rollout-network call. All tensors created here are released before returning.
#[allow(clippy::too_many_arguments)]
async fn denoise(
    session: &dyn InferenceSession,
    inputs: &InputNames,
    noisy: &[f32],
    sigma: f32,
    sigma_cond: Option<f32>,
    window: &WindowView<'_>,
    actions: &[i64],
    out: &mut [f32],
) -> Result<()> {
    let dims = window.dims;
    let frame_shape = [1, dims.c, dims.h, dims.w];
    let obs_shape = [1, window.t * dims.c, dims.h, dims.w];
    let act_shape = [1, window.t];
    let scalar_shape = [1];

    let mut scope = TensorScope::new(session);
    scope.input(NOISY_NEXT_OBS, TensorRef::f32(noisy, &frame_shape))?;
    scope.input(SIGMA, TensorRef::f32(&[sigma], &scalar_shape))?;
    scope.input(&inputs.obs, TensorRef::f32(window.observations, &obs_shape))?;
    scope.input(&inputs.act, TensorRef::i64(actions, &act_shape))?;
    if let Some(cond) = sigma_cond {
        scope.input(SIGMA_COND, TensorRef::f32(&[cond], &scalar_shape))?;
    }
    scope.run().await?;
    scope.read_f32(DENOISED, out)
}
