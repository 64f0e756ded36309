use std::time::Duration;

use serde::Deserialize;

/// Exponent of the Karras power interpolation used for the noise schedule.
pub const RHO: f64 = 7.0;

/// Perturbation magnitude applied to the current frame when the schedule has more than one step.
/// Single-step (distilled) schedules use `sigmas[0]` instead.
pub const MULTI_STEP_INIT_NOISE: f32 = 0.05;

/// Emit a periodic debug log from the sampler and decoder every this many frames.
pub const LOG_EVERY_FRAMES: u64 = 60;

/// Default number of denoising steps when a model does not specify one.
pub const DEFAULT_NUM_STEPS: usize = 2;

/// Default lower end of the noise range.
pub const DEFAULT_SIGMA_MIN: f32 = 2e-3;

/// Default upper end of the noise range.
pub const DEFAULT_SIGMA_MAX: f32 = 5.0;

/// Default decoder output geometry (channels, height, width).
pub const DEFAULT_DECODER_OUTPUT: (usize, usize, usize) = (3, 256, 256);

/// Thread count used when the host cannot report its parallelism.
pub const FALLBACK_THREADS: usize = 4;

/// How the orchestrator is allowed to pick an execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Prefer the accelerated backend, fall back to the portable one.
    #[default]
    Auto,
    /// Forced portable execution ("safe mode").
    Safe,
}

/// Per-session settings handed to the orchestrator at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend_mode: BackendMode,
    /// Intra-op threads for the portable backend. `None` uses the host parallelism.
    pub num_threads: Option<usize>,
    /// Per-tick time budget in milliseconds; ticks above it are counted and logged.
    pub frame_budget_ms: Option<u64>,
    /// Fixed seed for the sampler noise. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_mode: BackendMode::Auto,
            num_threads: None,
            frame_budget_ms: None,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn safe_mode() -> Self {
        Self {
            backend_mode: BackendMode::Safe,
            ..Self::default()
        }
    }

    pub fn threads(&self) -> usize {
        self.num_threads.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_THREADS)
        })
    }

    pub fn frame_budget(&self) -> Option<Duration> {
        self.frame_budget_ms.map(Duration::from_millis)
    }
}
